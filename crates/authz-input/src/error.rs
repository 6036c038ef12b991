// error.rs — Error types for input document construction.

use thiserror::Error;

/// Errors that prevent an input document from being built.
///
/// Every variant results in a deny-with-error decision for the request.
#[derive(Debug, Error)]
pub enum InputError {
    /// The request URI could not be parsed.
    #[error("invalid request URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// The body was declared `application/json` but is not valid JSON.
    #[error("request body is not valid JSON: {0}")]
    InvalidBody(#[from] serde_json::Error),
}
