// transport.rs — Docker authorization plugin protocol over a Unix socket.
//
// Routes (all POST, JSON in and out):
//   /Plugin.Activate        → {"Implements": ["authz"]}
//   /AuthZPlugin.AuthZReq   → decision for an incoming API request
//   /AuthZPlugin.AuthZRes   → always allow
//
// Docker sends `application/vnd.docker.plugins.v1.2+json`, and Activate may
// have no body at all, so payloads are read as bytes and parsed here.
//
// Docker refuses any response that carries `Err`, so an allow always goes
// out with an empty `Err`. The fail-open caveat is only in the audit log.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::UnixListener;
use tokio::time::Instant;

use authz_input::AuthzRequest;

use crate::authorizer::{Authorizer, Decision};
use crate::error::DaemonError;

/// The request payload Docker sends to `AuthZReq` and `AuthZRes`.
///
/// Response fields (`ResponseStatusCode`, ...) are accepted and ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginRequest {
    #[serde(rename = "User")]
    pub user: String,
    #[serde(rename = "UserAuthNMethod")]
    pub user_authn_method: String,
    #[serde(rename = "RequestMethod")]
    pub request_method: String,
    #[serde(rename = "RequestURI")]
    pub request_uri: String,
    /// Base64-encoded body; `null` when there is none.
    #[serde(rename = "RequestBody")]
    pub request_body: Option<String>,
    #[serde(rename = "RequestHeaders")]
    pub request_headers: Option<BTreeMap<String, String>>,
}

impl PluginRequest {
    /// Decode into the request the authorizer works on.
    pub fn into_authz_request(self) -> Result<AuthzRequest, base64::DecodeError> {
        let body = match self.request_body.as_deref() {
            Some(encoded) if !encoded.is_empty() => {
                base64::engine::general_purpose::STANDARD.decode(encoded)?
            }
            _ => Vec::new(),
        };

        Ok(AuthzRequest {
            method: self.request_method,
            uri: self.request_uri,
            headers: self.request_headers.unwrap_or_default(),
            body,
            user: self.user,
            auth_method: self.user_authn_method,
        })
    }
}

/// The `{Allow, Msg, Err}` reply Docker expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginResponse {
    #[serde(rename = "Allow")]
    pub allow: bool,
    #[serde(rename = "Msg", default, skip_serializing_if = "String::is_empty")]
    pub msg: String,
    #[serde(rename = "Err", default, skip_serializing_if = "String::is_empty")]
    pub err: String,
}

impl From<Decision> for PluginResponse {
    fn from(decision: Decision) -> Self {
        if decision.allow {
            return Self {
                allow: true,
                ..Self::default()
            };
        }
        Self {
            allow: false,
            msg: decision.message.unwrap_or_default(),
            err: decision.error.unwrap_or_default(),
        }
    }
}

#[derive(Clone)]
struct PluginState {
    authorizer: Arc<Authorizer>,
    eval_timeout: Duration,
}

/// Build the plugin router around `authorizer`.
pub fn router(authorizer: Arc<Authorizer>, eval_timeout: Duration) -> Router {
    Router::new()
        .route("/Plugin.Activate", post(activate))
        .route("/AuthZPlugin.AuthZReq", post(authz_request))
        .route("/AuthZPlugin.AuthZRes", post(authz_response))
        .with_state(PluginState {
            authorizer,
            eval_timeout,
        })
}

async fn activate() -> Json<Value> {
    tracing::info!("plugin activated");
    Json(json!({ "Implements": ["authz"] }))
}

async fn authz_request(State(state): State<PluginState>, body: Bytes) -> Json<PluginResponse> {
    let request = match decode(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "malformed AuthZReq payload");
            return Json(Decision::error(e).into());
        }
    };

    let deadline = Instant::now() + state.eval_timeout;
    let decision = state.authorizer.authorize(&request, deadline).await;
    Json(decision.into())
}

async fn authz_response(State(state): State<PluginState>, body: Bytes) -> Json<PluginResponse> {
    // The answer never depends on the payload; a bad one is only logged.
    let request = decode(&body).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "malformed AuthZRes payload");
        AuthzRequest::default()
    });
    Json(state.authorizer.authorize_response(&request).into())
}

fn decode(body: &[u8]) -> Result<AuthzRequest, String> {
    let payload: PluginRequest = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    payload.into_authz_request().map_err(|e| format!("invalid RequestBody: {e}"))
}

/// Bind the plugin socket at `path`, replacing a stale socket file.
pub fn bind(path: &Path) -> Result<UnixListener, DaemonError> {
    let socket_err = |source| DaemonError::Socket {
        path: path.to_path_buf(),
        source,
    };

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(socket_err)?;
    }
    remove_stale_socket(path).map_err(socket_err)?;
    UnixListener::bind(path).map_err(socket_err)
}

fn remove_stale_socket(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::FileTypeExt;

    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if !metadata.file_type().is_socket() {
        return Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            "path exists but is not a socket",
        ));
    }
    std::fs::remove_file(path)?;
    tracing::debug!(path = %path.display(), "removed stale plugin socket");
    Ok(())
}

/// Serve the plugin protocol on `listener` until `shutdown` resolves, then
/// remove the socket file.
pub async fn serve<F>(
    listener: UnixListener,
    socket_path: PathBuf,
    router: Router,
    shutdown: F,
) -> Result<(), DaemonError>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    tracing::info!(socket = %socket_path.display(), "serving authorization plugin");
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(DaemonError::Serve);

    if let Err(e) = std::fs::remove_file(&socket_path) {
        tracing::debug!(error = %e, "could not remove plugin socket");
    }
    served
}
