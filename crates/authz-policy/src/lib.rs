//! # authz-policy
//!
//! Evaluates an input document against an administrative policy.
//!
//! A [`PolicyEvaluator`] is selected once at startup and wraps exactly one
//! backend:
//!
//! - [`EmbeddedFile`] re-reads and compiles a Rego file on every call, so edits
//!   take effect on the next request.
//! - [`ManagedDecision`] keeps one long-lived engine loaded from a YAML config.
//! - [`RemoteHttp`] asks a remote policy service over its data API.
//!
//! ## Key invariants
//!
//! - **Only `true` allows**: any other value is a deny; a non-boolean from a
//!   strict backend is an error, never a silent allow.
//! - **Undefined is not an error**: a query with no value denies without one.
//! - **Fail-open is explicit**: a missing embedded policy file is reported as
//!   [`PolicyError::PolicyFileMissing`], the only error that callers allow on.
//! - **Deadlines**: every evaluation is bounded by a caller-supplied deadline.

pub mod backend;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod query;
pub mod snapshot;
pub mod sources;
pub mod syntax;

pub use backend::embedded::EmbeddedFile;
pub use backend::managed::{ManagedConfig, ManagedDecision};
pub use backend::remote::RemoteHttp;
pub use engine::ENGINE_VERSION;
pub use error::PolicyError;
pub use evaluator::{Evaluation, PolicyEvaluator, Verdict};
pub use query::normalize_query_path;
pub use snapshot::PolicySnapshot;
pub use syntax::check_syntax;
