//! # authz-audit
//!
//! Decision records for the Docker authorization plugin.
//!
//! Every evaluated request produces one [`DecisionRecord`]: a random decision
//! id, the SHA-256 of the exact policy bytes used, a fixed label set, a
//! nanosecond UTC timestamp, the input document and the outcome. The
//! [`DecisionAuditor`] decides how much of it to emit and hands the lines to
//! its [`AuditSink`]s.
//!
//! ## Quick Example
//!
//! ```rust
//! use authz_audit::{DecisionAuditor, Labels};
//!
//! let labels = Labels::new("docker-authz", "instance-1", "regorus-0.2", "0.1.0");
//! let auditor = DecisionAuditor::new(labels, false);
//! let record = auditor.record(serde_json::json!({"Method": "GET"}), true, Some(b"package x".as_slice()), None);
//! auditor.audit(&record);
//! ```

pub mod auditor;
pub mod error;
pub mod hasher;
pub mod record;
pub mod sink;

pub use auditor::DecisionAuditor;
pub use error::AuditError;
pub use record::{DecisionRecord, Labels};
pub use sink::{AuditLine, AuditSink, JsonlSink, TracingSink, DECISION_TARGET};
