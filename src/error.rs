//! Error types for job tracking and proactive checks
//!
//! Errors are classified by blast radius:
//! - Transient: a single status poll failed, the poll loop keeps going
//! - Per-subject: one subject has bad data, the sweep skips it
//! - Sweep-wide: the subject source is unreachable, the sweep fails

use thiserror::Error;

use crate::db::DbError;

/// Failure returned by a `JobStatusProvider` while fetching a status snapshot.
///
/// Every variant is transient from the tracker's point of view: the poll loop
/// logs it and tries again on the next tick.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Status provider unreachable: {0}")]
    Transient(String),

    #[error("Job not found by status provider: {0}")]
    NotFound(String),
}

/// Bad data on a single subject. Isolated per subject during a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubjectError {
    #[error("Subject {subject_id} is missing field `{field}`")]
    MissingField {
        subject_id: String,
        field: &'static str,
    },

    #[error("Subject {subject_id} has malformed expiry for {attribute_kind}: {value}")]
    MalformedExpiry {
        subject_id: String,
        attribute_kind: String,
        value: String,
    },

    #[error("Subject {subject_id} tracks {attribute_kind} more than once")]
    DuplicateAttribute {
        subject_id: String,
        attribute_kind: String,
    },
}

/// The subject source could not be read at all.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Subject repository unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to read subjects: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse subjects: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Dedup ledger read/write failure.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger database error: {0}")]
    Db(#[from] DbError),

    #[error("Ledger SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Ledger holds unknown tier `{0}`")]
    UnknownTier(String),

    #[error("Ledger holds malformed notified_at `{0}`")]
    BadTimestamp(String),
}

/// Notification snapshot could not be written or read back.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure of a whole proactive sweep.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("A proactive sweep is already running")]
    SweepInProgress,
}

/// Configuration loading or validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Failure wiring up the service.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to open dedup ledger: {0}")]
    Ledger(#[from] LedgerError),
}

impl CheckError {
    /// Returns true if retrying the sweep later can succeed without intervention
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CheckError::SweepInProgress | CheckError::Repository(RepositoryError::Unavailable(_))
        )
    }
}
