// normalize.rs — Builds the InputDocument for one API request.
//
// Steps:
//   1. Parse the body as JSON, but only when it is declared
//      `Content-Type: application/json` (exact case) and non-empty.
//   2. Split the URI into path and query; percent-decode the path.
//   3. Split the decoded path on `/` and parse the query into a multimap.
//   4. Resolve bind mounts when the body is a JSON object.
//
// Nothing here touches shared state, so concurrent requests can normalize
// in parallel.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::document::InputDocument;
use crate::error::InputError;
use crate::mounts::MountResolver;
use crate::request::AuthzRequest;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Converts raw requests into input documents.
pub struct RequestNormalizer;

impl RequestNormalizer {
    /// Build the input document for `request`.
    pub fn normalize(request: &AuthzRequest) -> Result<InputDocument, InputError> {
        let body = parse_body(request)?;
        let (raw_path, raw_query) = split_uri(&request.uri)?;

        let path_plain = urlencoding::decode(raw_path)
            .map_err(|e| InputError::InvalidUri {
                uri: request.uri.clone(),
                reason: e.to_string(),
            })?
            .into_owned();
        let path_arr = path_plain.split('/').map(str::to_string).collect();

        let mut query: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in url::form_urlencoded::parse(raw_query.as_bytes()) {
            query
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }

        let bind_mounts = match &body {
            Some(object @ Value::Object(_)) => MountResolver::resolve(object),
            _ => Vec::new(),
        };

        Ok(InputDocument {
            headers: request.headers.clone(),
            path: request.uri.clone(),
            path_plain,
            path_arr,
            query,
            method: request.method.clone(),
            body,
            user: request.user.clone(),
            auth_method: request.auth_method.clone(),
            bind_mounts,
        })
    }
}

fn parse_body(request: &AuthzRequest) -> Result<Option<Value>, InputError> {
    if request.header("Content-Type") != Some(JSON_CONTENT_TYPE) || request.body.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&request.body)?))
}

/// Split an origin-form URI into its (still encoded) path and query.
///
/// Rejects control characters and malformed percent escapes anywhere in the
/// URI. A fragment, if present, is discarded.
fn split_uri(uri: &str) -> Result<(&str, &str), InputError> {
    let invalid = |reason: &str| InputError::InvalidUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    };

    if uri.chars().any(|c| c.is_ascii_control()) {
        return Err(invalid("invalid control character in URI"));
    }
    if !has_valid_escapes(uri) {
        return Err(invalid("invalid percent escape"));
    }

    let without_fragment = uri.split('#').next().unwrap_or_default();
    Ok(match without_fragment.split_once('?') {
        Some((path, query)) => (path, query),
        None => (without_fragment, ""),
    })
}

fn has_valid_escapes(uri: &str) -> bool {
    let bytes = uri.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3);
            if !hex.is_some_and(|h| h.iter().all(u8::is_ascii_hexdigit)) {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}
