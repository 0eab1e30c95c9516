//! Database migrations.
//!
//! Migrations run in order and are tracked in the `migrations` table. The
//! producer and receiver share one schema; each only touches its own tables.

use crate::DatabaseResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    debug!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_record_tables(conn)?;
    }
    if current_version < 2 {
        migrate_v2_raw_acknowledgments(conn)?;
    }

    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: record tables. The primary store, the delivery backlog, and the
/// receiver mirror all carry the same record columns keyed by id.
fn migrate_v1_record_tables(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v1: record tables");

    for table in ["machine_status_records", "delivery_backlog", "received_records"] {
        conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                machine_id INTEGER NOT NULL,
                machine_status INTEGER NOT NULL,
                shot_count INTEGER NOT NULL,
                shot_status INTEGER NOT NULL,
                status TEXT NOT NULL,
                updated_on TEXT NOT NULL,
                stored_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_{table}_updated_on
                ON {table}(updated_on);
            "
        ))?;
    }

    record_migration(conn, 1, "record_tables")
}

/// V2: raw acknowledgment log, one row per acknowledged id.
fn migrate_v2_raw_acknowledgments(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v2: raw acknowledgments");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS raw_acknowledgments (
            id TEXT PRIMARY KEY,
            message TEXT NOT NULL,
            received_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    record_migration(conn, 2, "raw_acknowledgments")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn test_migrations_create_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        for table in [
            "machine_status_records",
            "delivery_backlog",
            "received_records",
            "raw_acknowledgments",
        ] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let applied: i32 = conn
            .query_row("SELECT COUNT(*) FROM migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, CURRENT_VERSION);
    }
}
