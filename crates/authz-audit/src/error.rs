// error.rs — Error types for the audit subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by audit sinks. They are logged and never affect a decision.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to open or create the decision log file.
    #[error("failed to open decision log at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write a record to the log.
    #[error("failed to append decision record: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// Failed to serialize a record.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
