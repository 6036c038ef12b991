// error.rs — Error types for policy evaluation.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or evaluating policy.
///
/// Every variant denies the request except [`PolicyError::PolicyFileMissing`];
/// see [`PolicyError::is_fail_open`].
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The embedded policy file does not exist.
    #[error("policy file {} does not exist", path.display())]
    PolicyFileMissing { path: PathBuf },

    /// A policy or data file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The policy source failed to parse or compile.
    #[error("policy compilation failed: {0}")]
    Compile(String),

    /// The engine failed while evaluating the query.
    #[error("policy evaluation failed: {0}")]
    Evaluation(String),

    /// The query produced a value that is not a boolean.
    #[error("administrative policy decision invalid: expected boolean, got {0}")]
    InvalidDecision(String),

    /// The remote policy service could not be reached or sent a bad body.
    #[error("remote policy request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote policy service answered with an unexpected status.
    #[error("remote policy service returned HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The caller's deadline passed before a decision was reached.
    #[error("policy evaluation exceeded its deadline")]
    DeadlineExceeded,

    /// The managed engine is not running or dropped the call.
    #[error("policy engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Engine configuration is malformed.
    #[error("invalid policy configuration: {0}")]
    Config(String),
}

impl PolicyError {
    /// Whether this error should allow the request rather than deny it.
    ///
    /// Only a missing embedded policy file fails open.
    pub fn is_fail_open(&self) -> bool {
        matches!(self, PolicyError::PolicyFileMissing { .. })
    }
}
