//! Local SQLite database.
//!
//! Holds only what the hosted backend does not: a journal of confirmed
//! order status transitions, draft inventory count sessions, and a small
//! category/key/value settings table. Uses rusqlite with WAL mode and
//! versioned migrations.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::order_status::OrderStatus;

pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

impl DbState {
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::Database(format!("connection lock poisoned: {e}")))
    }
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 3;

/// Open (or create) `{data_dir}/backoffice.db` and run pending migrations.
///
/// On open failure the file is deleted (with its WAL/SHM companions) and
/// opening is retried once.
pub fn init(data_dir: &Path) -> Result<DbState> {
    fs::create_dir_all(data_dir)
        .map_err(|e| Error::Database(format!("Failed to create data dir: {e}")))?;

    let db_path = data_dir.join("backoffice.db");
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
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            open_and_configure(&db_path)?
        }
    };

    run_migrations(&conn)?;
    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Fresh in-memory database with the full schema.
pub fn init_in_memory() -> Result<DbState> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    run_migrations(&conn)?;
    Ok(DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    })
}

fn open_and_configure(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        return Ok(());
    }
    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }
    if current < 3 {
        migrate_v3(conn)?;
    }
    Ok(())
}

/// v1: settings and the order transition journal.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS local_settings (
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            updated_at TEXT DEFAULT (datetime('now')),
            PRIMARY KEY (setting_category, setting_key)
        );

        CREATE TABLE IF NOT EXISTS status_transitions (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL,
            from_status TEXT NOT NULL,
            to_status TEXT NOT NULL,
            note TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_status_transitions_order
            ON status_transitions(order_id, created_at);

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )?;
    Ok(())
}

/// v2: inventory count sessions.
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS inventory_sessions (
            id TEXT PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'open',
            note TEXT,
            approved_by TEXT,
            started_at TEXT NOT NULL,
            closed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS inventory_count_lines (
            session_id TEXT NOT NULL REFERENCES inventory_sessions(id) ON DELETE CASCADE,
            product_id TEXT NOT NULL,
            product_name TEXT NOT NULL,
            expected_qty INTEGER NOT NULL,
            actual_qty INTEGER,
            unit_cost REAL,
            counted_at TEXT,
            PRIMARY KEY (session_id, product_id)
        );

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )?;
    Ok(())
}

/// Per-line approval progress, so a retried approval skips products whose
/// stock write and adjustment row already landed.
fn migrate_v3(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        ALTER TABLE inventory_count_lines ADD COLUMN adjusted_at TEXT;

        INSERT INTO schema_version (version) VALUES (3);
        ",
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

pub fn set_setting(conn: &Connection, category: &str, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Transition journal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JournalEntry {
    pub order_id: String,
    pub from_status: String,
    pub to_status: String,
    pub note: Option<String>,
    pub created_at: String,
}

pub fn record_transition(
    conn: &Connection,
    order_id: &str,
    from: OrderStatus,
    to: OrderStatus,
    note: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO status_transitions (id, order_id, from_status, to_status, note, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            Uuid::new_v4().to_string(),
            order_id,
            from.as_str(),
            to.as_str(),
            note,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Journal entries for one order, oldest first.
pub fn transitions_for_order(conn: &Connection, order_id: &str) -> Result<Vec<JournalEntry>> {
    let mut stmt = conn.prepare(
        "SELECT order_id, from_status, to_status, note, created_at
         FROM status_transitions
         WHERE order_id = ?1
         ORDER BY created_at ASC, rowid ASC",
    )?;
    let rows = stmt.query_map(params![order_id], |row| {
        Ok(JournalEntry {
            order_id: row.get(0)?,
            from_status: row.get(1)?,
            to_status: row.get(2)?,
            note: row.get(3)?,
            created_at: row.get(4)?,
        })
    })?;
    let entries = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

pub fn schema_version(conn: &Connection) -> Result<i32> {
    let version = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0)
        })
        .optional()?
        .flatten()
        .unwrap_or(0);
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_migrations_create_all_tables() {
        let db = init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let tables = table_names(&conn);
        for expected in [
            "inventory_count_lines",
            "inventory_sessions",
            "local_settings",
            "schema_version",
            "status_transitions",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {expected}");
        }
        assert_eq!(schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let db = init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        run_migrations(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, CURRENT_SCHEMA_VERSION as i64);
    }

    #[test]
    fn test_v2_database_gains_adjusted_at() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT DEFAULT (datetime('now'))
            );",
        )
        .unwrap();
        migrate_v1(&conn).unwrap();
        migrate_v2(&conn).unwrap();
        conn.execute(
            "INSERT INTO inventory_sessions (id, status, started_at) VALUES ('s-1', 'open', 'now')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO inventory_count_lines (session_id, product_id, product_name, expected_qty)
             VALUES ('s-1', 'p-1', 'Tea', 4)",
            [],
        )
        .unwrap();

        run_migrations(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
        let adjusted: Option<String> = conn
            .query_row(
                "SELECT adjusted_at FROM inventory_count_lines WHERE product_id = 'p-1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(adjusted, None);
    }

    #[test]
    fn test_settings_upsert() {
        let db = init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        assert_eq!(get_setting(&conn, "ui", "currency"), None);
        set_setting(&conn, "ui", "currency", "EGP").unwrap();
        set_setting(&conn, "ui", "currency", "SAR").unwrap();
        assert_eq!(get_setting(&conn, "ui", "currency").as_deref(), Some("SAR"));
    }

    #[test]
    fn test_journal_round_trip() {
        let db = init_in_memory().unwrap();
        let conn = db.lock().unwrap();
        record_transition(&conn, "o-1", OrderStatus::Pending, OrderStatus::Confirmed, None)
            .unwrap();
        record_transition(
            &conn,
            "o-1",
            OrderStatus::Confirmed,
            OrderStatus::Cancelled,
            Some("customer called"),
        )
        .unwrap();
        record_transition(&conn, "o-2", OrderStatus::Pending, OrderStatus::Confirmed, None)
            .unwrap();

        let entries = transitions_for_order(&conn, "o-1").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].to_status, "confirmed");
        assert_eq!(entries[1].to_status, "cancelled");
        assert_eq!(entries[1].note.as_deref(), Some("customer called"));
    }

    #[test]
    fn test_init_on_disk_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = init(dir.path()).unwrap();
        assert!(db.db_path.exists());
        drop(db);
        // Reopening an existing database skips migrations.
        let again = init(dir.path()).unwrap();
        assert_eq!(schema_version(&again.lock().unwrap()).unwrap(), CURRENT_SCHEMA_VERSION);
    }
}
