// document.rs — The canonical input document evaluated by policies.
//
// Field names are serialized in the PascalCase layout policies already
// address (`input.Method`, `input.PathArr[2]`, `input.Body.HostConfig`...).
// Renaming a field here silently breaks every deployed policy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A host path exposed inside a container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BindMount {
    /// The host path exactly as written in the request.
    #[serde(rename = "Source")]
    pub source: String,
    /// Whether the mount was requested read-only.
    #[serde(rename = "ReadOnly")]
    pub read_only: bool,
    /// Absolute, symlink-free, traversal-free form of `source`.
    #[serde(rename = "ResolvedSource")]
    pub resolved_source: String,
}

/// Everything a policy can see about one API request.
///
/// Built fresh for every decision by the `RequestNormalizer` and dropped once
/// the decision has been audited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputDocument {
    #[serde(rename = "Headers")]
    pub headers: BTreeMap<String, String>,

    /// The raw request URI, query string included.
    #[serde(rename = "Path")]
    pub path: String,

    /// The percent-decoded path component of the URI.
    #[serde(rename = "PathPlain")]
    pub path_plain: String,

    /// `path_plain` split on `/`. The leading empty segment is kept, so
    /// `/v1.47/containers/create` yields `["", "v1.47", "containers", "create"]`.
    #[serde(rename = "PathArr")]
    pub path_arr: Vec<String>,

    /// Decoded query parameters; repeated keys keep every value in order.
    #[serde(rename = "Query")]
    pub query: BTreeMap<String, Vec<String>>,

    #[serde(rename = "Method")]
    pub method: String,

    /// Parsed JSON body, or `null` when the body was absent or not JSON.
    #[serde(rename = "Body")]
    pub body: Option<serde_json::Value>,

    #[serde(rename = "User")]
    pub user: String,

    #[serde(rename = "AuthMethod")]
    pub auth_method: String,

    /// Host bind mounts requested by a container-create body, in request order.
    #[serde(rename = "BindMounts")]
    pub bind_mounts: Vec<BindMount>,
}

impl InputDocument {
    /// Serialize into the JSON value handed to the policy engine.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
