//! # authz-daemon
//!
//! Docker authorization plugin.
//!
//! Docker discovers the plugin through its socket under
//! `/run/docker/plugins` and must be told to use it:
//!
//! ```text
//! dockerd --authorization-plugin=docker-authz
//! ```
//!
//! ## Usage
//!
//! ```text
//! authz-daemon --policy-file /etc/docker/policies/authz.rego
//! authz-daemon --config-file /etc/docker/policies/engine.yaml
//! authz-daemon --remote-url http://127.0.0.1:8181 --remote-policy-file /etc/docker/policies/authz.rego
//! authz-daemon --check --policy-file /etc/docker/policies/authz.rego
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use authz_audit::{DecisionAuditor, JsonlSink, Labels};
use authz_daemon::config::{build_evaluator, describe};
use authz_daemon::transport;
use authz_daemon::{Authorizer, Cli, PolicyReloader};
use authz_policy::{check_syntax, PolicyEvaluator, PolicySnapshot, ENGINE_VERSION};

const APP_NAME: &str = "docker-authz";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr, uncoloured, as the daemon's output is usually captured.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("authz_daemon=info".parse()?)
                .add_directive("authz_policy=info".parse()?)
                .add_directive("authz_audit=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    if cli.check {
        let errors = check_syntax(&cli.policy_file_or_default());
        for error in &errors {
            eprintln!("{error}");
        }
        std::process::exit(if errors.is_empty() { 0 } else { 1 });
    }

    let choice = cli.backend()?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        engine = ENGINE_VERSION,
        "Starting Docker authorization plugin using {}",
        describe(&choice)
    );

    let snapshot = PolicySnapshot::new();
    let evaluator = build_evaluator(&choice, &cli.allow_path, snapshot)
        .await
        .context("failed to initialise policy backend")?;

    // Held for the life of the process; dropping it stops the watcher.
    let _reloader = match (&evaluator, &cli.remote_policy_file) {
        (PolicyEvaluator::RemoteHttp(backend), Some(file)) => Some(
            PolicyReloader::new(file, cli.remote_policy_id.clone(), backend.clone()).spawn()?,
        ),
        _ => None,
    };

    let instance_id = Uuid::new_v4().to_string();
    tracing::info!(instance_id = %instance_id, "instance id generated");

    let labels = Labels::new(APP_NAME, instance_id, ENGINE_VERSION, env!("CARGO_PKG_VERSION"));
    let mut auditor = DecisionAuditor::new(labels, cli.quiet);
    if let Some(path) = &cli.decision_log {
        auditor.add_sink(Arc::new(JsonlSink::open(path)?));
        tracing::info!(path = %path.display(), "appending decision records to file");
    }

    let authorizer = Arc::new(Authorizer::new(evaluator, auditor, cli.skip_ping));
    let router = transport::router(authorizer, cli.eval_timeout());

    let socket_path = cli.socket_path();
    let listener = transport::bind(&socket_path)?;
    transport::serve(listener, socket_path, router, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutting down");
    })
    .await?;

    Ok(())
}
