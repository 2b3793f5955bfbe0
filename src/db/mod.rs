//! SQLite storage for the dedup ledger.
//!
//! The database lives at `~/.dailyos/alerts.db` unless the config names another
//! path. It only holds durable alert bookkeeping; notifications and in-flight
//! jobs are process state.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

/// Resolve the default database path: `~/.dailyos/alerts.db`.
pub fn default_db_path() -> Result<PathBuf, DbError> {
    let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
    Ok(home.join(".dailyos").join("alerts.db"))
}

/// Open (or create) the database at `path` and apply the schema.
pub fn open_at(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
        }
    }

    let conn = Connection::open(path)?;

    // WAL so readers never block the sweep's writes
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;

    crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

    Ok(conn)
}

/// Open a private in-memory database with the schema applied.
pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory()?;
    crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;
    Ok(conn)
}
