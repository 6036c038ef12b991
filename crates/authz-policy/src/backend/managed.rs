// managed.rs — A long-lived policy engine configured once at startup.
//
// The engine owns its compiled modules and data, so it lives on one
// dedicated thread. Request handlers talk to it through a bounded channel:
//
//   handler ──DecisionCall{input, path, reply}──▶ engine thread
//   handler ◀──────────── oneshot reply ──────────┘
//
// Calls are answered in arrival order. When the last `ManagedDecision`
// handle is dropped the channel closes and the thread exits.
//
// Any result other than a literal `true` denies without an error; only a
// failed call (engine error, engine gone) is reported as one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::engine;
use crate::error::PolicyError;
use crate::evaluator::{Evaluation, Verdict};
use crate::sources::{self, PolicySource};

/// Managed engine configuration, loaded from YAML.
///
/// ```yaml
/// policies:
///   - /etc/docker/policies        # a directory of .rego files, or a file
/// data:
///   - /etc/docker/policies/data.json
/// queue_depth: 64
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ManagedConfig {
    /// Policy files or directories, loaded in order.
    pub policies: Vec<PathBuf>,

    /// JSON documents merged into `data`.
    #[serde(default)]
    pub data: Vec<PathBuf>,

    /// Maximum number of decision calls waiting for the engine.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_queue_depth() -> usize {
    64
}

impl ManagedConfig {
    /// Load the config from a YAML file.
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let content = std::fs::read_to_string(path).map_err(|source| PolicyError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content)
            .map_err(|e| PolicyError::Config(format!("{}: {}", path.display(), e)))
    }
}

/// One `{input, path}` request to the engine thread.
struct DecisionCall {
    input: Value,
    path: String,
    reply: oneshot::Sender<Result<Option<Value>, PolicyError>>,
}

/// Handle to the running managed engine.
pub struct ManagedDecision {
    calls: mpsc::Sender<DecisionCall>,
    query_path: String,
    policy_bytes: Arc<[u8]>,
}

impl ManagedDecision {
    /// Load every policy and data document, compile them and start the
    /// engine thread. Any failure here is a startup error.
    ///
    /// `query_path` is in slash form (e.g. `/docker/authz/allow`).
    pub async fn start(
        config: ManagedConfig,
        query_path: impl Into<String>,
    ) -> Result<Self, PolicyError> {
        let policies = sources::load_sources(&config.policies)?;
        let mut data = Vec::with_capacity(config.data.len());
        for path in &config.data {
            data.push(std::fs::read_to_string(path).map_err(|source| {
                PolicyError::ReadFailed {
                    path: path.clone(),
                    source,
                }
            })?);
        }

        let policy_bytes: Arc<[u8]> = policies
            .iter()
            .flat_map(|source| source.text.bytes())
            .collect::<Vec<u8>>()
            .into();

        let (calls, receiver) = mpsc::channel(config.queue_depth.max(1));
        let (ready_tx, ready_rx) = oneshot::channel();

        std::thread::Builder::new()
            .name("policy-engine".to_string())
            .spawn(move || run_engine(policies, data, receiver, ready_tx))
            .map_err(|e| PolicyError::EngineUnavailable(e.to_string()))?;

        ready_rx.await.map_err(|_| {
            PolicyError::EngineUnavailable("engine thread exited during startup".to_string())
        })??;

        tracing::info!(
            modules = config.policies.len(),
            data_documents = config.data.len(),
            "managed policy engine started"
        );

        Ok(Self {
            calls,
            query_path: query_path.into(),
            policy_bytes,
        })
    }

    pub fn query_path(&self) -> &str {
        &self.query_path
    }

    /// Ask the engine for the value at `path` given `input`.
    ///
    /// `Ok(None)` means the path is undefined.
    pub async fn decision(&self, input: Value, path: &str) -> Result<Option<Value>, PolicyError> {
        let (reply, response) = oneshot::channel();
        self.calls
            .send(DecisionCall {
                input,
                path: path.to_string(),
                reply,
            })
            .await
            .map_err(|_| PolicyError::EngineUnavailable("engine has stopped".to_string()))?;

        response.await.map_err(|_| {
            PolicyError::EngineUnavailable("engine dropped the decision call".to_string())
        })?
    }

    pub(crate) async fn evaluate(&self, input: &Value) -> Evaluation {
        let outcome = self
            .decision(input.clone(), &self.query_path)
            .await
            .map(|value| match value {
                Some(Value::Bool(true)) => Verdict::Decided(true),
                None | Some(Value::Null) => Verdict::Undefined,
                Some(_) => Verdict::Decided(false),
            });
        Evaluation::new(outcome, Some(Arc::clone(&self.policy_bytes)))
    }
}

/// Engine thread body: build the engine, report readiness, then serve calls
/// until every sender is gone.
fn run_engine(
    policies: Vec<PolicySource>,
    data: Vec<String>,
    mut calls: mpsc::Receiver<DecisionCall>,
    ready: oneshot::Sender<Result<(), PolicyError>>,
) {
    let built = engine::compile(&policies).and_then(|mut engine| {
        for document in &data {
            engine::add_data(&mut engine, document)?;
        }
        Ok(engine)
    });

    let mut engine = match built {
        Ok(engine) => {
            let _ = ready.send(Ok(()));
            engine
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while let Some(call) = calls.blocking_recv() {
        let result = engine::query_value(&mut engine, &data_query(&call.path), &call.input);
        // The caller may have given up (deadline); nothing to do then.
        let _ = call.reply.send(result);
    }

    tracing::debug!("managed policy engine stopped");
}

/// `/docker/authz/allow` → `data.docker.authz.allow`.
fn data_query(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "data".to_string()
    } else {
        format!("data.{}", trimmed.replace('/', "."))
    }
}
