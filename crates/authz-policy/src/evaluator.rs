// evaluator.rs — The backend-agnostic evaluation entry point.
//
// `PolicyEvaluator` is a closed enum: the backend is chosen once from
// mutually exclusive configuration and never changes afterwards. Each call
// is bounded by the caller's deadline; running out of time is reported as
// `PolicyError::DeadlineExceeded`, which denies like any other backend error.

use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;

use crate::backend::embedded::EmbeddedFile;
use crate::backend::managed::ManagedDecision;
use crate::backend::remote::RemoteHttp;
use crate::error::PolicyError;

/// What a successful evaluation concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The query produced a boolean.
    Decided(bool),
    /// The query produced no value.
    Undefined,
}

impl Verdict {
    /// Only a literal `true` allows.
    pub fn is_allow(&self) -> bool {
        matches!(self, Verdict::Decided(true))
    }

    /// Strict interpretation used by the embedded and remote backends:
    /// absent or `null` is undefined, a boolean decides, anything else is an
    /// error.
    pub fn from_strict(value: Option<Value>) -> Result<Self, PolicyError> {
        match value {
            None | Some(Value::Null) => Ok(Verdict::Undefined),
            Some(Value::Bool(allowed)) => Ok(Verdict::Decided(allowed)),
            Some(other) => Err(PolicyError::InvalidDecision(other.to_string())),
        }
    }
}

/// The result of one evaluation plus the policy bytes it was made against.
#[derive(Debug)]
pub struct Evaluation {
    pub outcome: Result<Verdict, PolicyError>,
    /// Exact policy bytes behind the decision, when the backend knows them.
    pub policy_bytes: Option<Arc<[u8]>>,
}

impl Evaluation {
    pub fn new(outcome: Result<Verdict, PolicyError>, policy_bytes: Option<Arc<[u8]>>) -> Self {
        Self {
            outcome,
            policy_bytes,
        }
    }

    /// An evaluation that failed before any policy bytes were involved.
    pub fn failed(error: PolicyError) -> Self {
        Self::new(Err(error), None)
    }
}

/// The configured policy backend.
pub enum PolicyEvaluator {
    EmbeddedFile(EmbeddedFile),
    ManagedDecision(ManagedDecision),
    RemoteHttp(RemoteHttp),
}

impl PolicyEvaluator {
    /// Short backend name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PolicyEvaluator::EmbeddedFile(_) => "embedded-file",
            PolicyEvaluator::ManagedDecision(_) => "managed-decision",
            PolicyEvaluator::RemoteHttp(_) => "remote-http",
        }
    }

    /// The normalized query path this backend evaluates.
    pub fn query_path(&self) -> &str {
        match self {
            PolicyEvaluator::EmbeddedFile(backend) => backend.query_path(),
            PolicyEvaluator::ManagedDecision(backend) => backend.query_path(),
            PolicyEvaluator::RemoteHttp(backend) => backend.doc_path(),
        }
    }

    /// Evaluate `input` against the configured policy before `deadline`.
    ///
    /// Never retries; a transient backend failure is returned once.
    pub async fn evaluate(&self, deadline: Instant, input: &Value) -> Evaluation {
        if Instant::now() >= deadline {
            return Evaluation::failed(PolicyError::DeadlineExceeded);
        }

        let evaluation = async {
            match self {
                PolicyEvaluator::EmbeddedFile(backend) => backend.evaluate(input).await,
                PolicyEvaluator::ManagedDecision(backend) => backend.evaluate(input).await,
                PolicyEvaluator::RemoteHttp(backend) => backend.evaluate(input).await,
            }
        };

        match tokio::time::timeout_at(deadline, evaluation).await {
            Ok(evaluation) => evaluation,
            Err(_) => {
                tracing::warn!(backend = self.kind(), "policy evaluation deadline exceeded");
                Evaluation::failed(PolicyError::DeadlineExceeded)
            }
        }
    }
}
