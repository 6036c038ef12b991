// error.rs — Startup and serving errors for the daemon.
//
// Per-request problems never show up here; they become decisions. These are
// the failures that stop the process.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    /// More than one of policy file, managed config and remote URL was given.
    #[error("only one policy backend may be configured, got: {}", .0.join(", "))]
    ConflictingBackends(Vec<&'static str>),

    #[error(transparent)]
    Policy(#[from] authz_policy::PolicyError),

    #[error(transparent)]
    Audit(#[from] authz_audit::AuditError),

    /// The plugin socket could not be prepared or bound.
    #[error("plugin socket {}: {source}", path.display())]
    Socket {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The policy file watcher could not be started.
    #[error("failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        source: notify::Error,
    },

    /// The plugin server stopped with an error.
    #[error("plugin server failed: {0}")]
    Serve(#[source] std::io::Error),
}
