use folio_core::db::migrations::latest_version;
use folio_core::db::{is_busy_error, open_db, open_db_in_memory, DbError};
use rusqlite::Connection;
use std::time::Duration;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "bucket_counters");
}

#[test]
fn reopening_keeps_schema_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("folios.sqlite3");

    let first = open_db(&path).unwrap();
    first
        .execute(
            "INSERT INTO bucket_counters (bucket_key, value) VALUES ('CF-2025-10', 4);",
            [],
        )
        .unwrap();
    drop(first);

    let second = open_db(&path).unwrap();
    assert_eq!(schema_version(&second), latest_version());
    let value: i64 = second
        .query_row(
            "SELECT value FROM bucket_counters WHERE bucket_key = 'CF-2025-10';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(value, 4);
}

#[test]
fn counter_values_below_one_are_rejected_by_schema() {
    let conn = open_db_in_memory().unwrap();
    let result = conn.execute(
        "INSERT INTO bucket_counters (bucket_key, value) VALUES ('CF-2025-10', 0);",
        [],
    );
    assert!(result.is_err());
}

#[test]
fn concurrent_first_opens_migrate_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("folios.sqlite3");

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4).map(|_| scope.spawn(|| open_db(&path))).collect();
        for handle in handles {
            let conn = handle.join().unwrap().unwrap();
            assert_eq!(schema_version(&conn), latest_version());
        }
    });
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn write_lock_conflicts_classify_as_busy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("folios.sqlite3");
    let holder = open_db(&path).unwrap();
    let conn = open_db(&path).unwrap();
    conn.busy_timeout(Duration::ZERO).unwrap();

    holder.execute_batch("BEGIN IMMEDIATE;").unwrap();
    let err = conn.execute_batch("BEGIN IMMEDIATE;").unwrap_err();
    assert!(is_busy_error(&err));
    holder.execute_batch("ROLLBACK;").unwrap();

    let err = conn.execute_batch("SELEC 1;").unwrap_err();
    assert!(!is_busy_error(&err));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
