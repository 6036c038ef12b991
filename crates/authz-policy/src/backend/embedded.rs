// embedded.rs — Policy read from a local Rego file on every request.
//
// Each evaluation is self-contained: one file read, one compile, one query.
// There is no cache, so editing the file changes the next decision without a
// restart, and two concurrent requests may see different versions of it.
//
// A missing file is reported as `PolicyFileMissing` so the caller can fail
// open; every other failure (unreadable file, parse error, non-boolean
// result) denies.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::engine;
use crate::error::PolicyError;
use crate::evaluator::{Evaluation, Verdict};
use crate::sources::PolicySource;

/// Evaluates a single Rego file, re-read on every call.
#[derive(Debug, Clone)]
pub struct EmbeddedFile {
    path: PathBuf,
    query_path: String,
}

impl EmbeddedFile {
    /// `query_path` must be in dotted form (e.g. `data.docker.authz.allow`).
    pub fn new(path: impl AsRef<Path>, query_path: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            query_path: query_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn query_path(&self) -> &str {
        &self.query_path
    }

    pub(crate) async fn evaluate(&self, input: &Value) -> Evaluation {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(
                    path = %self.path.display(),
                    "policy file does not exist, failing open and allowing request"
                );
                return Evaluation::failed(PolicyError::PolicyFileMissing {
                    path: self.path.clone(),
                });
            }
            Err(source) => {
                return Evaluation::failed(PolicyError::ReadFailed {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let policy_bytes: Arc<[u8]> = Arc::from(bytes);
        let outcome = self
            .compile_and_query(Arc::clone(&policy_bytes), input.clone())
            .await;
        Evaluation::new(outcome, Some(policy_bytes))
    }

    /// Compile and query on a blocking worker so the interpreter never stalls
    /// the async request path.
    async fn compile_and_query(
        &self,
        bytes: Arc<[u8]>,
        input: Value,
    ) -> Result<Verdict, PolicyError> {
        let name = self.path.display().to_string();
        let query = self.query_path.clone();

        tokio::task::spawn_blocking(move || {
            let text = std::str::from_utf8(&bytes)
                .map_err(|e| PolicyError::Compile(format!("{name} is not valid UTF-8: {e}")))?;
            let source = PolicySource {
                name,
                text: text.to_string(),
            };
            let mut engine = engine::compile(std::slice::from_ref(&source))?;
            Verdict::from_strict(engine::query_value(&mut engine, &query, &input)?)
        })
        .await
        .map_err(|e| PolicyError::Evaluation(format!("evaluation worker failed: {e}")))?
    }
}
