//! # authz-daemon
//!
//! Docker authorization plugin daemon.
//!
//! Docker forwards every API request to the plugin over a Unix socket. The
//! [`Authorizer`] turns each one into an input document, asks the configured
//! policy backend for a decision, audits it and answers allow or deny.
//!
//! ```text
//! Docker ──AuthZReq──▶ transport ──▶ Authorizer
//!                                      ├─ RequestNormalizer (+ MountResolver)
//!                                      ├─ PolicyEvaluator (embedded | managed | remote)
//!                                      └─ DecisionAuditor
//!
//! PolicyReloader (remote only): policy file ──watch──▶ PUT /policies/{id}
//! ```

pub mod authorizer;
pub mod config;
pub mod error;
pub mod reloader;
pub mod transport;

pub use authorizer::{Authorizer, Decision, DENY_MESSAGE, HEALTH_CHECK_PATH};
pub use config::{build_evaluator, BackendChoice, Cli, DEFAULT_POLICY_FILE};
pub use error::DaemonError;
pub use reloader::{PolicyReloader, ReloaderHandle};
pub use transport::{PluginRequest, PluginResponse};
