//! Document store abstraction consumed by the access layer.
//!
//! # Responsibility
//! - Define the generic store call surface: insert, find, find-and-update,
//!   delete, each with an optional session.
//! - Define the filter, update operator and projection vocabulary shared by
//!   every store implementation.
//!
//! # Invariants
//! - Every single store call is atomic on its own.
//! - `find_one_and_update` matches, mutates and returns in one step; no other
//!   caller can observe the document between match and mutation.
//! - A session groups calls into one all-or-nothing unit; stores never
//!   commit a session implicitly.

use crate::model::object_id::ObjectId;
use crate::model::todo_list::Document;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub mod document;
pub mod migrations;
pub mod sqlite;

pub use sqlite::{open_store, open_store_in_memory, SqliteDocumentStore, SqliteSession};

pub type StoreResult<T> = Result<T, StoreError>;

/// Store-level failure: transport, storage engine or operator misuse.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Serialization(serde_json::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// The connection has not been migrated to the current schema.
    Uninitialized {
        expected_version: u32,
        actual_version: u32,
    },
    /// A write was refused, e.g. a caller-supplied `_id`.
    Constraint(String),
    /// A query names a field the store cannot address.
    InvalidQuery(String),
    /// A session opened on another store was passed in.
    ForeignSession,
    /// The calling thread has an open session and must pass it to the call.
    SessionActive,
    /// The connection stayed locked by another caller for the whole wait.
    LockTimeout(Duration),
    /// An update operator does not fit the stored document shape.
    InvalidUpdate(String),
    /// A stored body cannot be treated as a document at all.
    InvalidDocument { id: String, reason: String },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "document serialization failed: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "store schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::Uninitialized {
                expected_version,
                actual_version,
            } => write!(
                f,
                "store schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::Constraint(message) => write!(f, "write rejected: {message}"),
            Self::InvalidQuery(message) => write!(f, "invalid query: {message}"),
            Self::ForeignSession => write!(f, "session belongs to a different store"),
            Self::SessionActive => write!(
                f,
                "this thread holds an open session; pass it to the call"
            ),
            Self::LockTimeout(waited) => write!(
                f,
                "store connection still busy after {}ms",
                waited.as_millis()
            ),
            Self::InvalidUpdate(message) => write!(f, "invalid update: {message}"),
            Self::InvalidDocument { id, reason } => {
                write!(f, "invalid stored document `{id}`: {reason}")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Conjunction of equality predicates.
///
/// Dotted paths descend into embedded documents; a path segment that lands on
/// an array matches when any element matches the remainder (`items.id`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    id: Option<ObjectId>,
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// Matches every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches the document with this `_id`.
    pub fn by_id(id: ObjectId) -> Self {
        Self {
            id: Some(id),
            conditions: Vec::new(),
        }
    }

    /// Adds an equality predicate on a dotted path.
    pub fn and_eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((path.into(), value.into()));
        self
    }

    pub fn id(&self) -> Option<ObjectId> {
        self.id
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }
}

/// Atomic update operators.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Appends `value` to the array at `array`, creating it when absent.
    Push { array: String, value: Value },
    /// Sets `field` on the first element of `array` whose `key` equals
    /// `key_value`.
    SetMatched {
        array: String,
        key: String,
        key_value: Value,
        field: String,
        value: Value,
    },
    /// Removes every element of `array` whose `key` equals `key_value`.
    Pull {
        array: String,
        key: String,
        key_value: Value,
    },
}

/// Which state `find_one_and_update` hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnDocument {
    Before,
    #[default]
    After,
}

/// Output shape of enumeration queries. `_id` is always included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    include: Vec<String>,
    sizes: Vec<(String, String)>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies a top-level field when present.
    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.include.push(field.into());
        self
    }

    /// Emits `output` as the length of the array at `array`.
    pub fn size_of(mut self, output: impl Into<String>, array: impl Into<String>) -> Self {
        self.sizes.push((output.into(), array.into()));
        self
    }

    pub fn included(&self) -> &[String] {
        &self.include
    }

    pub fn sizes(&self) -> &[(String, String)] {
        &self.sizes
    }
}

/// Exclusive keyset position in a sorted enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub value: Value,
    pub id: String,
}

impl SortKey {
    /// Reads the key of a document returned by `find_page`.
    ///
    /// Returns `None` when the document carries no string `_id`.
    pub fn of(doc: &Document, sort_by: &str) -> Option<Self> {
        let id = doc.get("_id")?.as_str()?.to_string();
        let value = doc.get(sort_by).cloned().unwrap_or(Value::Null);
        Some(Self { value, id })
    }
}

/// One page of a sorted, projected enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct FindQuery {
    pub filter: Filter,
    pub projection: Option<Projection>,
    /// Ascending sort field; ties fall back to `_id` order.
    pub sort_by: String,
    pub start_after: Option<SortKey>,
    pub limit: u32,
}

/// Caller-owned transaction handle.
pub trait StoreSession {
    /// Makes every call issued under this session durable.
    fn commit(self) -> StoreResult<()>;
    /// Discards every call issued under this session.
    fn abort(self) -> StoreResult<()>;
}

/// Generic document store call surface.
///
/// Documents returned by every method carry `_id` as its 24-hex string.
pub trait DocumentStore {
    type Session: StoreSession;

    fn start_session(&self) -> StoreResult<Self::Session>;

    /// Inserts `document` and returns the store-assigned `_id`.
    fn insert_one(
        &self,
        collection: &str,
        document: Document,
        session: Option<&Self::Session>,
    ) -> StoreResult<ObjectId>;

    fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&Self::Session>,
    ) -> StoreResult<Option<Document>>;

    /// Runs one round trip of a keyset-paginated enumeration.
    fn find_page(
        &self,
        collection: &str,
        query: &FindQuery,
        session: Option<&Self::Session>,
    ) -> StoreResult<Vec<Document>>;

    /// Atomically applies `update` to the first document matching `filter`.
    ///
    /// Returns `None` when nothing matches.
    fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        return_document: ReturnDocument,
        session: Option<&Self::Session>,
    ) -> StoreResult<Option<Document>>;

    /// Deletes the first document matching `filter`; returns the count removed.
    fn delete_one(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&Self::Session>,
    ) -> StoreResult<u64>;
}

/// Runs `f` inside a fresh session: commits on `Ok`, rolls back on `Err`.
pub fn with_transaction<S, T, E, F>(store: &S, f: F) -> Result<T, E>
where
    S: DocumentStore,
    E: From<StoreError>,
    F: FnOnce(&S::Session) -> Result<T, E>,
{
    let session = store.start_session()?;
    match f(&session) {
        Ok(value) => {
            session.commit()?;
            Ok(value)
        }
        Err(err) => {
            // Dropping an unfinished session rolls it back.
            drop(session);
            Err(err)
        }
    }
}
