use checklist_core::store::migrations::latest_version;
use checklist_core::{open_store, open_store_in_memory, SqliteDocumentStore, StoreError};
use rusqlite::Connection;

#[test]
fn opening_file_store_applies_all_migrations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checklist.db");

    let store = open_store(&path).unwrap();
    drop(store);

    let conn = Connection::open(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "documents");
}

#[test]
fn documents_table_holds_only_keys_and_body() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checklist.db");
    drop(open_store(&path).unwrap());

    let conn = Connection::open(&path).unwrap();
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info('documents') ORDER BY cid;")
        .unwrap();
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(columns, ["collection", "id", "body"]);
}

#[test]
fn opening_same_store_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checklist.db");

    drop(open_store(&path).unwrap());
    drop(open_store(&path).unwrap());

    let conn = Connection::open(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
}

#[test]
fn in_memory_store_opens() {
    assert!(open_store_in_memory().is_ok());
}

#[test]
fn opening_store_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_store(&path) {
        Err(StoreError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        }) => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected unsupported schema version"),
    }
}

#[test]
fn wrapping_unmigrated_connection_is_rejected() {
    let conn = Connection::open_in_memory().unwrap();

    match SqliteDocumentStore::try_new(conn) {
        Err(StoreError::Uninitialized {
            expected_version,
            actual_version: 0,
        }) => assert_eq!(expected_version, latest_version()),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected uninitialized store error"),
    }
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "missing table {table_name}");
}
