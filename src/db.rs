//! Local SQLite database layer for Sama Wi-Fi POS.
//!
//! Uses rusqlite with WAL mode. The legacy web client kept every collection
//! as a JSON document in browser localStorage; this layer keeps the same
//! named-document contract, backed by a `local_settings` category/key/value
//! table, with schema migrations and managed state shared across the app.

use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Managed state holding the database connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Initialize the database at `{data_dir}/sama-pos.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure,
/// deletes the file and retries once.
pub fn init(data_dir: &Path) -> Result<DbState, String> {
    fs::create_dir_all(data_dir).map_err(|e| format!("Failed to create data dir: {e}"))?;

    let db_path = data_dir.join("sama-pos.db");
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                // Also remove WAL/SHM files if present
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            open_and_configure(&db_path)
                .map_err(|e| format!("Database open failed after retry: {e}"))?
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open an in-memory database with migrations applied. The process keeps no
/// durable state in this mode; useful for ephemeral/demo runs and tests.
pub fn init_in_memory() -> Result<DbState, String> {
    let conn = Connection::open_in_memory().map_err(|e| format!("sqlite open: {e}"))?;
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| format!("pragma setup: {e}"))?;
    run_migrations(&conn)?;
    Ok(DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, String> {
    let conn = Connection::open(path).map_err(|e| format!("sqlite open: {e}"))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| format!("pragma setup: {e}"))?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), String> {
    // Ensure schema_version table exists first
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("create schema_version: {e}"))?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Migration v1: the named-document store.
fn migrate_v1(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        -- local_settings (category/key/value store; state documents live
        -- under category 'state', scalar settings under their own category)
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );

        CREATE INDEX IF NOT EXISTS idx_local_settings_cat_key
            ON local_settings(setting_category, setting_key);

        -- Record migration
        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        format!("migration v1: {e}")
    })?;

    info!("Applied migration v1");
    Ok(())
}

/// Migration v2: track the last successful cloud push per document so the
/// mirror loop can report how stale the remote copy is.
fn migrate_v2(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        ALTER TABLE local_settings ADD COLUMN last_sync TEXT DEFAULT '';

        -- Record migration
        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        format!("migration v2: {e}")
    })?;

    info!("Applied migration v2 (last_sync column)");
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Read a setting. Returns `None` when absent.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Insert or update a setting.
pub fn set_setting(
    conn: &Connection,
    category: &str,
    key: &str,
    value: &str,
) -> Result<(), String> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )
    .map_err(|e| format!("set_setting: {e}"))?;
    Ok(())
}

/// Delete a setting. Succeeds silently when the key does not exist.
pub fn delete_setting(conn: &Connection, category: &str, key: &str) -> Result<(), String> {
    conn.execute(
        "DELETE FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
    )
    .map_err(|e| format!("delete_setting: {e}"))?;
    Ok(())
}

/// Record the instant a document was last pushed to the cloud mirror.
pub fn mark_synced(conn: &Connection, category: &str, key: &str, instant: &str) {
    let _ = conn.execute(
        "UPDATE local_settings SET last_sync = ?3
         WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key, instant],
    );
}

// ---------------------------------------------------------------------------
// Named JSON documents (the Persistent Store contract)
// ---------------------------------------------------------------------------

/// Read a named JSON document from the `state` category. Absent documents
/// read as `None`; a corrupt document is logged and skipped rather than
/// wedging startup.
pub fn read_document(conn: &Connection, key: &str) -> Option<serde_json::Value> {
    let raw = get_setting(conn, "state", key)?;
    match serde_json::from_str(&raw) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(key, error = %e, "ignoring corrupt state document");
            None
        }
    }
}

/// Write a named JSON document into the `state` category.
pub fn write_document(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> Result<(), String> {
    set_setting(conn, "state", key, &value.to_string())
}

#[cfg(test)]
pub fn run_migrations_for_test(conn: &Connection) {
    run_migrations(conn).expect("run_migrations should succeed in test");
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    /// Open an in-memory database and apply pragmas (mirrors open_and_configure).
    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )
        .expect("pragma setup");
        conn
    }

    /// Helper: list table names in the database.
    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        stmt.query_map([], |row| row.get(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_migrations_v1_to_latest() {
        let conn = test_db();
        run_migrations(&conn).expect("run_migrations should succeed");

        let tables = table_names(&conn);
        assert!(
            tables.contains(&"local_settings".to_string()),
            "missing local_settings"
        );
        assert!(
            tables.contains(&"schema_version".to_string()),
            "missing schema_version"
        );

        // v2: last_sync column exists (prepare would fail otherwise)
        conn.prepare("SELECT last_sync FROM local_settings LIMIT 0")
            .expect("last_sync column should exist after v2");
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = test_db();
        run_migrations(&conn).expect("first run");
        run_migrations(&conn).expect("second run");

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .expect("read version");
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_settings_roundtrip_and_overwrite() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        assert_eq!(get_setting(&conn, "system", "employee_name"), None);

        set_setting(&conn, "system", "employee_name", "Admin").expect("set");
        assert_eq!(
            get_setting(&conn, "system", "employee_name").as_deref(),
            Some("Admin")
        );

        set_setting(&conn, "system", "employee_name", "Ayen").expect("overwrite");
        assert_eq!(
            get_setting(&conn, "system", "employee_name").as_deref(),
            Some("Ayen")
        );

        delete_setting(&conn, "system", "employee_name").expect("delete");
        assert_eq!(get_setting(&conn, "system", "employee_name"), None);
        // deleting again is not an error
        delete_setting(&conn, "system", "employee_name").expect("delete absent");
    }

    #[test]
    fn test_documents_roundtrip() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        assert!(read_document(&conn, "clients").is_none());

        let doc = serde_json::json!([{ "id": "1", "name": "Deng" }]);
        write_document(&conn, "clients", &doc).expect("write");
        assert_eq!(read_document(&conn, "clients"), Some(doc));
    }

    #[test]
    fn test_corrupt_document_reads_as_absent() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        set_setting(&conn, "state", "clients", "{not json").expect("set raw");
        assert!(read_document(&conn, "clients").is_none());
    }
}
