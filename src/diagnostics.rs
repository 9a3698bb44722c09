//! Diagnostics for the back-office tools.
//!
//! Provides:
//! - **Logging setup**: console plus daily rolling file under `{data_dir}/logs`
//! - **About info**: version, build timestamp, git SHA, platform
//! - **Local health**: database path, schema version, journal size, last backend

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::db::{self, DbState};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 10;

/// Prefix of the rolling log files (`backoffice.2026-10-18`, ...).
pub const LOG_FILE_PREFIX: &str = "backoffice";

pub const DEFAULT_LOG_FILTER: &str = "info,storefront_backoffice=debug";

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

pub fn log_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

/// Install the global subscriber. `RUST_LOG` wins over `filter`.
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// until the process exits.
pub fn init_logging(data_dir: &Path, filter: Option<&str>) -> Result<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter.unwrap_or(DEFAULT_LOG_FILTER)))
        .map_err(|e| Error::Config(format!("invalid log filter: {e}")))?;

    let dir = log_dir(data_dir);
    fs::create_dir_all(&dir)
        .map_err(|e| Error::Config(format!("Failed to create log dir {}: {e}", dir.display())))?;
    prune_old_logs(&dir);

    let file_appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    // stdout carries command output
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialised: {e}")))?;
    Ok(guard)
}

/// Prune old log files in `dir`, keeping only the most recent `MAX_LOG_FILES`.
pub fn prune_old_logs(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|name| name.starts_with(&format!("{LOG_FILE_PREFIX}.")))
            .unwrap_or(false);
        if is_log {
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(std::time::UNIX_EPOCH);
            log_files.push((path, modified));
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}

// ---------------------------------------------------------------------------
// About / health
// ---------------------------------------------------------------------------

/// Returns version, build timestamp, git SHA, and platform info.
pub fn about() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "buildTimestamp": env!("BACKOFFICE_BUILT_AT"),
        "gitSha": env!("BACKOFFICE_GIT_SHA"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
    })
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap_or(0)
}

/// Local state summary for the `health` command.
pub fn health(state: &DbState) -> Result<Value> {
    let conn = state.lock()?;
    Ok(json!({
        "databasePath": state.db_path.display().to_string(),
        "schemaVersion": db::schema_version(&conn)?,
        "lastBackendUrl": db::get_setting(&conn, "backend", "last_url"),
        "journalEntries": count(&conn, "SELECT COUNT(*) FROM status_transitions"),
        "openInventorySessions": count(
            &conn,
            "SELECT COUNT(*) FROM inventory_sessions WHERE status = 'open'",
        ),
        "about": about(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_about_info_has_required_fields() {
        let info = about();
        assert!(info.get("version").is_some());
        assert!(info.get("buildTimestamp").is_some());
        assert!(info.get("gitSha").is_some());
        assert!(info.get("platform").is_some());
    }

    #[test]
    fn test_health_with_empty_db() {
        let state = db::init_in_memory().unwrap();
        let health = health(&state).unwrap();
        assert_eq!(health["journalEntries"], 0);
        assert_eq!(health["openInventorySessions"], 0);
        assert!(health["lastBackendUrl"].is_null());
        assert!(health["schemaVersion"].as_i64().unwrap() >= 1);
    }

    #[test]
    fn test_health_reports_last_backend_url() {
        let state = db::init_in_memory().unwrap();
        db::set_setting(
            &state.lock().unwrap(),
            "backend",
            "last_url",
            "https://shop.example.supabase.co",
        )
        .unwrap();
        let health = health(&state).unwrap();
        assert_eq!(health["lastBackendUrl"], "https://shop.example.supabase.co");
        assert!(health.get("anonKey").is_none());
    }

    #[test]
    fn test_prune_keeps_newest_log_files() {
        let dir = tempfile::tempdir().unwrap();
        for day in 1..=13 {
            let name = format!("{LOG_FILE_PREFIX}.2026-10-{day:02}");
            fs::write(dir.path().join(name), "log").unwrap();
            // mtime resolution on some filesystems is coarse
            std::thread::sleep(std::time::Duration::from_millis(15));
        }
        fs::write(dir.path().join("unrelated.txt"), "keep").unwrap();

        prune_old_logs(dir.path());

        let mut remaining: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        remaining.sort();
        assert_eq!(remaining.len(), MAX_LOG_FILES + 1);
        assert!(remaining.contains(&"unrelated.txt".to_string()));
        assert!(!remaining.contains(&format!("{LOG_FILE_PREFIX}.2026-10-01")));
        assert!(remaining.contains(&format!("{LOG_FILE_PREFIX}.2026-10-13")));
    }

    #[test]
    fn test_prune_missing_dir_is_noop() {
        prune_old_logs(Path::new("/nonexistent/backoffice/logs"));
    }
}
