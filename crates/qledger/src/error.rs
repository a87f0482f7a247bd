//! Error handling for the calibration ledger.

use thiserror::Error;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur during ledger operations.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// A public-boundary field failed validation. Nothing was written.
    #[error("validation failed for {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Device not found in the registry (missing or archived).
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Device id already taken, possibly by an archived device.
    #[error("device already exists: {0}")]
    DeviceExists(String),

    /// No current (non-archived) version exists for the key.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write referenced a parent entity that does not currently exist.
    #[error("missing reference: {0}")]
    MissingReference(String),

    /// Two versions collided on the same timestamp. The clock's strict
    /// monotonicity invariant was violated; this is a defect, not a
    /// retryable condition.
    #[error("timestamp conflict at {0}us: clock monotonicity violated")]
    TimestampConflict(i64),

    /// SQLite database error.
    #[error("database error: {0}")]
    Database(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        LedgerError::Database(e.to_string())
    }
}
