// record.rs — The audit record for one policy decision.
//
// A record is created once per evaluated request, emitted, and dropped. The
// JSON layout (`labels`, `decision_id`, `config_hash`, `input`, `result`,
// `timestamp`) is what log pipelines index on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hasher;

/// Fixed labels attached to every record from this process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Labels {
    /// Application name.
    pub app: String,
    /// Process instance id, generated once at startup.
    pub id: String,
    /// Policy engine version.
    pub engine_version: String,
    /// Plugin version.
    pub plugin_version: String,
}

impl Labels {
    pub fn new(
        app: impl Into<String>,
        id: impl Into<String>,
        engine_version: impl Into<String>,
        plugin_version: impl Into<String>,
    ) -> Self {
        Self {
            app: app.into(),
            id: id.into(),
            engine_version: engine_version.into(),
            plugin_version: plugin_version.into(),
        }
    }
}

/// One audited policy decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub labels: Labels,

    /// Random (v4) identifier, unique per decision.
    pub decision_id: Uuid,

    /// SHA-256 of the policy bytes the decision was made against. `None` when
    /// the backend never saw them (missing file, remote policy never pushed).
    pub config_hash: Option<String>,

    /// The serialized input document.
    pub input: serde_json::Value,

    /// Whether the request was allowed.
    pub result: bool,

    /// Why the decision is not a clean evaluation, if it isn't.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the decision was made, RFC 3339 with nanoseconds, UTC.
    #[serde(with = "rfc3339_nanos")]
    pub timestamp: DateTime<Utc>,
}

impl DecisionRecord {
    /// Build a record with a fresh decision id and the current time.
    pub fn new(
        labels: Labels,
        input: serde_json::Value,
        result: bool,
        policy_bytes: Option<&[u8]>,
        error: Option<String>,
    ) -> Self {
        Self {
            labels,
            decision_id: Uuid::new_v4(),
            config_hash: policy_bytes.map(hasher::hash_bytes),
            input,
            result,
            error,
            timestamp: Utc::now(),
        }
    }
}

mod rfc3339_nanos {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Nanos, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
