// config.rs — Command-line configuration and backend selection.
//
// Exactly one policy backend may be configured:
//
//   --policy-file   → embedded file, re-read per request
//   --config-file   → managed engine, configured once from YAML
//   --remote-url    → remote policy service
//
// Giving none falls back to the embedded file at DEFAULT_POLICY_FILE.
// Giving more than one is a startup error.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use authz_policy::{
    normalize_query_path, EmbeddedFile, ManagedConfig, ManagedDecision, PolicyEvaluator,
    PolicySnapshot, RemoteHttp,
};

use crate::error::DaemonError;

/// Policy file used when no backend is configured.
pub const DEFAULT_POLICY_FILE: &str = "/etc/docker/policies/authz.rego";

/// `--version` output: daemon version plus the embedded policy engine.
/// Must name `authz_policy::ENGINE_VERSION`.
pub const LONG_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (policy engine regorus-0.2)");

/// Docker authorization plugin backed by Rego policy.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "authz-daemon",
    version,
    long_version = LONG_VERSION,
    about = "Docker authorization plugin backed by Rego policy"
)]
pub struct Cli {
    /// Plugin name; the socket is `{socket-dir}/{plugin-name}.sock`.
    #[arg(long, default_value = "docker-authz")]
    pub plugin_name: String,

    /// Directory Docker scans for plugin sockets.
    #[arg(long, default_value = "/run/docker/plugins")]
    pub socket_dir: PathBuf,

    /// Rego policy file, read on every request.
    #[arg(long)]
    pub policy_file: Option<PathBuf>,

    /// Managed policy engine config (YAML).
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    /// Base URL of a remote policy service.
    #[arg(long)]
    pub remote_url: Option<String>,

    /// Policy file to watch and upload to the remote service.
    #[arg(long, requires = "remote_url")]
    pub remote_policy_file: Option<PathBuf>,

    /// Policy id used when uploading to the remote service.
    #[arg(long, default_value = "docker-authz")]
    pub remote_policy_id: String,

    /// Query evaluated for each request, dotted or slash form.
    #[arg(long, default_value = "data.docker.authz.allow")]
    pub allow_path: String,

    /// Allow `HEAD /_ping` without evaluating or auditing it.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub skip_ping: bool,

    /// Log only a one-line summary for successful decisions.
    #[arg(long)]
    pub quiet: bool,

    /// Check the policy file syntax and exit.
    #[arg(long)]
    pub check: bool,

    /// Append every decision record to this JSONL file.
    #[arg(long)]
    pub decision_log: Option<PathBuf>,

    /// Deadline for one policy evaluation, in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    pub eval_timeout_ms: u64,
}

/// The single backend selected from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendChoice {
    Embedded(PathBuf),
    Managed(PathBuf),
    Remote(String),
}

impl Cli {
    /// Resolve the mutually exclusive backend flags.
    pub fn backend(&self) -> Result<BackendChoice, DaemonError> {
        let mut given = Vec::new();
        if self.policy_file.is_some() {
            given.push("--policy-file");
        }
        if self.config_file.is_some() {
            given.push("--config-file");
        }
        if self.remote_url.is_some() {
            given.push("--remote-url");
        }
        if given.len() > 1 {
            return Err(DaemonError::ConflictingBackends(given));
        }

        if let Some(path) = &self.config_file {
            return Ok(BackendChoice::Managed(path.clone()));
        }
        if let Some(url) = &self.remote_url {
            return Ok(BackendChoice::Remote(url.clone()));
        }
        Ok(BackendChoice::Embedded(self.policy_file_or_default()))
    }

    /// The policy file `--check` and the embedded backend use.
    pub fn policy_file_or_default(&self) -> PathBuf {
        self.policy_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_POLICY_FILE))
    }

    pub fn socket_path(&self) -> PathBuf {
        self.socket_dir.join(format!("{}.sock", self.plugin_name))
    }

    pub fn eval_timeout(&self) -> Duration {
        Duration::from_millis(self.eval_timeout_ms)
    }
}

/// Build the evaluator for `choice`.
///
/// The embedded backend takes the dotted query form; the managed and remote
/// backends address documents by slash path. Managed engine failures are
/// fatal here.
pub async fn build_evaluator(
    choice: &BackendChoice,
    allow_path: &str,
    snapshot: PolicySnapshot,
) -> Result<PolicyEvaluator, DaemonError> {
    let evaluator = match choice {
        BackendChoice::Embedded(path) => PolicyEvaluator::EmbeddedFile(EmbeddedFile::new(
            path,
            normalize_query_path(allow_path, false),
        )),
        BackendChoice::Managed(config_file) => {
            let config = ManagedConfig::load(config_file)?;
            let engine =
                ManagedDecision::start(config, normalize_query_path(allow_path, true)).await?;
            PolicyEvaluator::ManagedDecision(engine)
        }
        BackendChoice::Remote(url) => PolicyEvaluator::RemoteHttp(RemoteHttp::new(
            url.as_str(),
            normalize_query_path(allow_path, true),
            snapshot,
        )?),
    };

    tracing::info!(
        backend = evaluator.kind(),
        query = evaluator.query_path(),
        "policy backend configured"
    );
    Ok(evaluator)
}

/// Short description of where decisions come from, for the startup log.
pub fn describe(choice: &BackendChoice) -> String {
    match choice {
        BackendChoice::Embedded(path) => format!("policy file {}", path.display()),
        BackendChoice::Managed(path) => format!("managed engine config {}", path.display()),
        BackendChoice::Remote(url) => format!("remote policy service {url}"),
    }
}
