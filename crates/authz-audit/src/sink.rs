// sink.rs — Where decision lines go.
//
// `TracingSink` is always installed and writes through the tracing
// subscriber under the `authz_audit::decision` target. `JsonlSink` is the
// optional `--decision-log` file: one JSON record per line, append only.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use uuid::Uuid;

use crate::error::AuditError;
use crate::record::DecisionRecord;

/// Log target every decision line is emitted under.
pub const DECISION_TARGET: &str = "authz_audit::decision";

/// One line the auditor wants written.
#[derive(Debug, Clone, Copy)]
pub enum AuditLine<'a> {
    /// Short informational line: which decision, which way.
    Summary { decision_id: Uuid, allowed: bool },
    /// The full record of a clean decision.
    Record(&'a DecisionRecord),
    /// The full record of a decision that carries an error.
    Failure(&'a DecisionRecord),
}

/// A destination for audit lines.
pub trait AuditSink: Send + Sync {
    fn emit(&self, line: &AuditLine<'_>) -> Result<(), AuditError>;
}

/// Emits through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn emit(&self, line: &AuditLine<'_>) -> Result<(), AuditError> {
        match line {
            AuditLine::Summary {
                decision_id,
                allowed,
            } => {
                tracing::info!(
                    target: DECISION_TARGET,
                    decision_id = %decision_id,
                    "Returning policy decision: {}",
                    allowed
                );
            }
            AuditLine::Record(record) => {
                let json = serde_json::to_string(record)?;
                tracing::info!(
                    target: DECISION_TARGET,
                    decision_id = %record.decision_id,
                    record = %json,
                    "policy decision"
                );
            }
            AuditLine::Failure(record) => {
                let input = serde_json::to_string(&record.input)?;
                tracing::warn!(
                    target: DECISION_TARGET,
                    decision_id = %record.decision_id,
                    config_hash = record.config_hash.as_deref().unwrap_or(""),
                    allowed = record.result,
                    error = record.error.as_deref().unwrap_or(""),
                    input = %input,
                    "policy decision failed"
                );
            }
        }
        Ok(())
    }
}

/// Append-only JSONL decision log.
///
/// Only full records are written; summary lines are for the process log.
pub struct JsonlSink {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JsonlSink {
    /// Open (or create) the log at `path` in append mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record from a decision log, oldest first.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<DecisionRecord>, AuditError> {
        let file = File::open(path.as_ref()).map_err(|source| AuditError::OpenFailed {
            path: path.as_ref().to_path_buf(),
            source,
        })?;

        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

impl AuditSink for JsonlSink {
    fn emit(&self, line: &AuditLine<'_>) -> Result<(), AuditError> {
        let record = match line {
            AuditLine::Summary { .. } => return Ok(()),
            AuditLine::Record(record) | AuditLine::Failure(record) => *record,
        };

        let json = serde_json::to_string(record)?;
        // A poisoned lock only means another writer panicked mid-line; keep going.
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        Ok(())
    }
}
