//! SQLite-backed document store.
//!
//! # Responsibility
//! - Persist schemaless JSON documents keyed by `(collection, id)`.
//! - Give every store call single-statement-like atomicity by running it in
//!   an immediate transaction.
//! - Join calls into a caller-owned session when one is supplied.
//!
//! # Invariants
//! - Standalone calls and sessions serialize on one connection lock, so the
//!   match and the mutation of `find_one_and_update` are never interleaved
//!   with another writer.
//! - An unfinished session rolls back when dropped.
//! - A standalone call (or a second `start_session`) on the thread that owns
//!   the open session fails with `SessionActive` instead of waiting.
//! - Other threads wait at most `BUSY_TIMEOUT` for the connection lock, then
//!   fail with `LockTimeout`.

use super::document::{apply_update, matches, project};
use super::migrations::{apply_migrations, latest_version};
use super::{
    DocumentStore, Filter, FindQuery, ReturnDocument, SortKey, StoreError, StoreResult,
    StoreSession, Update,
};
use crate::model::object_id::ObjectId;
use crate::model::todo_list::Document;
use log::{error, info, warn};
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, MutexGuard, RawMutex};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, TransactionBehavior};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a SQLite store file and applies all pending migrations.
///
/// # Side effects
/// - Emits `store_open` logging events with duration and status.
pub fn open_store(path: impl AsRef<Path>) -> StoreResult<SqliteDocumentStore> {
    open_with("file", || Connection::open(path))
}

/// Opens a private in-memory store with all migrations applied.
pub fn open_store_in_memory() -> StoreResult<SqliteDocumentStore> {
    open_with("memory", Connection::open_in_memory)
}

fn open_with(
    mode: &str,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
) -> StoreResult<SqliteDocumentStore> {
    let started_at = Instant::now();
    info!("event=store_open module=store status=start mode={mode}");

    let result = connect()
        .map_err(StoreError::from)
        .and_then(|mut conn| {
            bootstrap_connection(&mut conn)?;
            SqliteDocumentStore::try_new(conn)
        });

    match &result {
        Ok(_) => info!(
            "event=store_open module=store status=ok mode={mode} duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=store_open module=store status=error mode={mode} duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

fn bootstrap_connection(conn: &mut Connection) -> StoreResult<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    apply_migrations(conn)
}

/// Document store over one SQLite connection.
///
/// Cloning is cheap and shares the connection.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
    /// Thread holding the open session, if any.
    session_owner: Arc<Mutex<Option<ThreadId>>>,
}

impl SqliteDocumentStore {
    /// Wraps an already-migrated connection.
    ///
    /// # Errors
    /// - `Uninitialized` when the schema version is not the current one.
    pub fn try_new(conn: Connection) -> StoreResult<Self> {
        let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        let expected_version = latest_version();
        if actual_version != expected_version {
            return Err(StoreError::Uninitialized {
                expected_version,
                actual_version,
            });
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            session_owner: Arc::new(Mutex::new(None)),
        })
    }

    fn ensure_no_local_session(&self) -> StoreResult<()> {
        if *self.session_owner.lock() == Some(thread::current().id()) {
            return Err(StoreError::SessionActive);
        }
        Ok(())
    }

    fn lock_conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.ensure_no_local_session()?;
        self.conn
            .try_lock_for(BUSY_TIMEOUT)
            .ok_or(StoreError::LockTimeout(BUSY_TIMEOUT))
    }

    fn run<T>(
        &self,
        session: Option<&SqliteSession>,
        op: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        match session {
            Some(session) => {
                if !Arc::ptr_eq(ArcMutexGuard::mutex(&session.conn), &self.conn) {
                    return Err(StoreError::ForeignSession);
                }
                op(&session.conn)
            }
            None => {
                let mut conn = self.lock_conn()?;
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let value = op(&tx)?;
                tx.commit()?;
                Ok(value)
            }
        }
    }
}

/// Open transaction holding the store's connection until finished.
pub struct SqliteSession {
    conn: ArcMutexGuard<RawMutex, Connection>,
    owner: Arc<Mutex<Option<ThreadId>>>,
    finished: bool,
}

impl SqliteSession {
    fn finish(mut self, statement: &str) -> StoreResult<()> {
        // On failure `self` drops unfinished and the transaction rolls back.
        self.conn.execute_batch(statement)?;
        self.finished = true;
        Ok(())
    }
}

impl StoreSession for SqliteSession {
    fn commit(self) -> StoreResult<()> {
        self.finish("COMMIT;")
    }

    fn abort(self) -> StoreResult<()> {
        self.finish("ROLLBACK;")
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        // Cleared while the connection lock is still held.
        *self.owner.lock() = None;
        if self.finished || self.conn.is_autocommit() {
            return;
        }
        if let Err(err) = self.conn.execute_batch("ROLLBACK;") {
            warn!("event=session_rollback module=store status=error error={err}");
        }
    }
}

impl DocumentStore for SqliteDocumentStore {
    type Session = SqliteSession;

    fn start_session(&self) -> StoreResult<SqliteSession> {
        self.ensure_no_local_session()?;
        let conn = self
            .conn
            .try_lock_arc_for(BUSY_TIMEOUT)
            .ok_or(StoreError::LockTimeout(BUSY_TIMEOUT))?;
        conn.execute_batch("BEGIN IMMEDIATE;")?;
        *self.session_owner.lock() = Some(thread::current().id());
        Ok(SqliteSession {
            conn,
            owner: Arc::clone(&self.session_owner),
            finished: false,
        })
    }

    fn insert_one(
        &self,
        collection: &str,
        document: Document,
        session: Option<&SqliteSession>,
    ) -> StoreResult<ObjectId> {
        if document.contains_key("_id") {
            return Err(StoreError::Constraint(
                "`_id` is assigned by the store".to_string(),
            ));
        }
        let body = serde_json::to_string(&document)?;
        let id = ObjectId::new();

        self.run(session, |conn| {
            conn.execute(
                "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3);",
                params![collection, id.encode(), body],
            )?;
            Ok(id)
        })
    }

    fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&SqliteSession>,
    ) -> StoreResult<Option<Document>> {
        self.run(session, |conn| {
            Ok(find_first(conn, collection, filter)?.map(|(id, doc)| with_id(&id, doc)))
        })
    }

    fn find_page(
        &self,
        collection: &str,
        query: &FindQuery,
        session: Option<&SqliteSession>,
    ) -> StoreResult<Vec<Document>> {
        let sort_expr = sort_expression(&query.sort_by)?;
        let mut sql = String::from("SELECT id, body FROM documents WHERE collection = ?");
        let mut binds = vec![SqlValue::Text(collection.to_string())];

        if let Some(id) = query.filter.id() {
            sql.push_str(" AND id = ?");
            binds.push(SqlValue::Text(id.encode()));
        }

        match &query.start_after {
            Some(SortKey {
                value: Value::Null,
                id,
            }) => {
                sql.push_str(&format!(
                    " AND (({sort_expr} IS NULL AND id > ?) OR {sort_expr} IS NOT NULL)"
                ));
                binds.push(SqlValue::Text(id.clone()));
            }
            Some(SortKey { value, id }) => {
                sql.push_str(&format!(
                    " AND ({sort_expr} > ? OR ({sort_expr} = ? AND id > ?))"
                ));
                let key = sql_value(value);
                binds.push(key.clone());
                binds.push(key);
                binds.push(SqlValue::Text(id.clone()));
            }
            None => {}
        }

        sql.push_str(&format!(" ORDER BY {sort_expr} ASC, id ASC;"));

        self.run(session, |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(binds))?;
            let mut page = Vec::new();

            while page.len() < query.limit as usize {
                let Some(row) = rows.next()? else {
                    break;
                };
                let id: String = row.get("id")?;
                let doc = parse_body(&id, &row.get::<_, String>("body")?)?;
                if !matches(&doc, &query.filter) {
                    continue;
                }
                page.push(match &query.projection {
                    Some(projection) => project(&id, &doc, projection)?,
                    None => with_id(&id, doc),
                });
            }

            Ok(page)
        })
    }

    fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        return_document: ReturnDocument,
        session: Option<&SqliteSession>,
    ) -> StoreResult<Option<Document>> {
        self.run(session, |conn| {
            let Some((id, before)) = find_first(conn, collection, filter)? else {
                return Ok(None);
            };

            let mut after = before.clone();
            apply_update(&mut after, update)?;
            conn.execute(
                "UPDATE documents SET body = ?3 WHERE collection = ?1 AND id = ?2;",
                params![collection, id, serde_json::to_string(&after)?],
            )?;

            Ok(Some(match return_document {
                ReturnDocument::Before => with_id(&id, before),
                ReturnDocument::After => with_id(&id, after),
            }))
        })
    }

    fn delete_one(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&SqliteSession>,
    ) -> StoreResult<u64> {
        self.run(session, |conn| {
            let Some((id, _)) = find_first(conn, collection, filter)? else {
                return Ok(0);
            };
            let deleted = conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2;",
                params![collection, id],
            )?;
            Ok(deleted as u64)
        })
    }
}

fn find_first(
    conn: &Connection,
    collection: &str,
    filter: &Filter,
) -> StoreResult<Option<(String, Document)>> {
    let (sql, binds) = match filter.id() {
        Some(id) => (
            "SELECT id, body FROM documents WHERE collection = ?1 AND id = ?2;",
            vec![collection.to_string(), id.encode()],
        ),
        None => (
            "SELECT id, body FROM documents WHERE collection = ?1 ORDER BY id ASC;",
            vec![collection.to_string()],
        ),
    };

    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(binds))?;
    while let Some(row) = rows.next()? {
        let id: String = row.get("id")?;
        let doc = parse_body(&id, &row.get::<_, String>("body")?)?;
        if matches(&doc, filter) {
            return Ok(Some((id, doc)));
        }
    }
    Ok(None)
}

fn parse_body(id: &str, body: &str) -> StoreResult<Document> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(doc) => Ok(doc),
        _ => Err(StoreError::InvalidDocument {
            id: id.to_string(),
            reason: "stored body is not a JSON object".to_string(),
        }),
    }
}

fn with_id(id: &str, mut doc: Document) -> Document {
    doc.insert("_id".to_string(), Value::String(id.to_string()));
    doc
}

fn sort_expression(field: &str) -> StoreResult<String> {
    let addressable = !field.is_empty()
        && field
            .split('.')
            .all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_')
            });
    if !addressable {
        return Err(StoreError::InvalidQuery(format!(
            "cannot sort by field `{field}`"
        )));
    }
    Ok(format!("json_extract(body, '$.{field}')"))
}

fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => SqlValue::Real(number.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{sort_expression, sql_value};
    use rusqlite::types::Value as SqlValue;
    use serde_json::json;

    #[test]
    fn sort_expression_accepts_plain_and_dotted_fields() {
        assert_eq!(
            sort_expression("name").unwrap(),
            "json_extract(body, '$.name')"
        );
        assert_eq!(
            sort_expression("meta.rank").unwrap(),
            "json_extract(body, '$.meta.rank')"
        );
    }

    #[test]
    fn sort_expression_rejects_injection() {
        for field in ["", "name'); DROP TABLE documents; --", "a..b", "na me"] {
            assert!(sort_expression(field).is_err(), "{field} should be rejected");
        }
    }

    #[test]
    fn sql_value_maps_json_scalars() {
        assert_eq!(sql_value(&json!("x")), SqlValue::Text("x".into()));
        assert_eq!(sql_value(&json!(true)), SqlValue::Integer(1));
        assert_eq!(sql_value(&json!(7)), SqlValue::Integer(7));
        assert_eq!(sql_value(&json!(null)), SqlValue::Null);
    }
}
