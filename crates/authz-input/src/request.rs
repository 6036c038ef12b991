// request.rs — The raw API request handed over by the plugin transport.

use std::collections::BTreeMap;

/// A Docker API request as delivered to the authorization plugin.
///
/// Immutable once received. The transport decodes the wire format (base64
/// body, header map) before building one of these.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthzRequest {
    /// HTTP method (e.g., "GET", "POST", "HEAD").
    pub method: String,
    /// Request URI in origin form (e.g., "/v1.47/containers/create?name=web").
    pub uri: String,
    /// Request headers exactly as Docker forwarded them.
    pub headers: BTreeMap<String, String>,
    /// Raw request body bytes (empty when there is no body).
    pub body: Vec<u8>,
    /// Authenticated user name, if the daemon uses TLS client auth.
    pub user: String,
    /// Authentication method used for `user`.
    pub auth_method: String,
}

impl AuthzRequest {
    /// Create a request with the given method and URI and nothing else.
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Add a header and return self (builder pattern).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the body and return self.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the authenticated user and auth method and return self.
    pub fn with_user(mut self, user: impl Into<String>, auth_method: impl Into<String>) -> Self {
        self.user = user.into();
        self.auth_method = auth_method.into();
        self
    }

    /// Look up a header with exact-case matching.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}
