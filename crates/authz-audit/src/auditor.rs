// auditor.rs — Turns decisions into audit lines.
//
// Emission rules:
//   record with an error  → one warning line with the full record (always)
//   clean record          → one summary line (always)
//                           + the full record unless quiet
//
// Sink failures are logged and swallowed: a broken decision log must never
// change the decision handed back to the daemon.

use std::sync::Arc;

use serde_json::Value;

use crate::record::{DecisionRecord, Labels};
use crate::sink::{AuditLine, AuditSink, TracingSink};

/// Builds and emits decision records.
pub struct DecisionAuditor {
    labels: Labels,
    quiet: bool,
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl DecisionAuditor {
    /// Create an auditor that writes through `tracing`.
    pub fn new(labels: Labels, quiet: bool) -> Self {
        Self {
            labels,
            quiet,
            sinks: vec![Arc::new(TracingSink)],
        }
    }

    /// Add another destination (e.g. a JSONL file).
    pub fn add_sink(&mut self, sink: Arc<dyn AuditSink>) {
        self.sinks.push(sink);
    }

    /// Same as [`add_sink`](Self::add_sink) but consuming.
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.add_sink(sink);
        self
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Build the record for one decision.
    ///
    /// `policy_bytes` are the exact bytes the decision was made against;
    /// their SHA-256 becomes `config_hash`.
    pub fn record(
        &self,
        input: Value,
        allowed: bool,
        policy_bytes: Option<&[u8]>,
        error: Option<String>,
    ) -> DecisionRecord {
        DecisionRecord::new(self.labels.clone(), input, allowed, policy_bytes, error)
    }

    /// Emit `record` according to the quiet setting.
    pub fn audit(&self, record: &DecisionRecord) {
        if record.error.is_some() {
            self.emit(AuditLine::Failure(record));
            return;
        }

        self.emit(AuditLine::Summary {
            decision_id: record.decision_id,
            allowed: record.result,
        });
        if !self.quiet {
            self.emit(AuditLine::Record(record));
        }
    }

    fn emit(&self, line: AuditLine<'_>) {
        for sink in &self.sinks {
            if let Err(e) = sink.emit(&line) {
                tracing::warn!(error = %e, "failed to write decision audit line");
            }
        }
    }
}
