//! End-to-end decisions: plugin payload in, plugin response out, through
//! every backend.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path as UrlPath, State};
use axum::http::{Request, StatusCode};
use axum::routing::{post, put};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use tempfile::tempdir;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tower::ServiceExt;

use authz_audit::{AuditError, AuditLine, AuditSink, DecisionAuditor, DecisionRecord, Labels};
use authz_daemon::config::build_evaluator;
use authz_daemon::transport::router;
use authz_daemon::{Authorizer, BackendChoice, PluginResponse, PolicyReloader};
use authz_input::AuthzRequest;
use authz_policy::{PolicyEvaluator, PolicySnapshot};

const ALLOW_PATH: &str = "data.docker.authz.allow";

const USERS_POLICY: &str = r#"package docker.authz

import rego.v1

default allow := false

allow if {
    input.Headers["Authz-User"] == "alice"
}

allow if {
    input.Headers["Authz-User"] == "bob"
    input.Method == "GET"
}
"#;

#[derive(Default)]
struct Collecting {
    records: Mutex<Vec<DecisionRecord>>,
}

impl AuditSink for Collecting {
    fn emit(&self, line: &AuditLine<'_>) -> Result<(), AuditError> {
        if let AuditLine::Record(r) | AuditLine::Failure(r) = line {
            self.records.lock().unwrap().push((*r).clone());
        }
        Ok(())
    }
}

async fn authorizer_for(choice: BackendChoice, snapshot: PolicySnapshot) -> (Arc<Authorizer>, Arc<Collecting>) {
    let evaluator = build_evaluator(&choice, ALLOW_PATH, snapshot).await.unwrap();
    let sink = Arc::new(Collecting::default());
    let auditor = DecisionAuditor::new(
        Labels::new("docker-authz", "e2e", "regorus-0.2", env!("CARGO_PKG_VERSION")),
        false,
    )
    .with_sink(sink.clone());
    (Arc::new(Authorizer::new(evaluator, auditor, true)), sink)
}

fn write_policy(dir: &Path, text: &str) -> std::path::PathBuf {
    let path = dir.join("authz.rego");
    fs::write(&path, text).unwrap();
    path
}

fn create_request(user: &str) -> AuthzRequest {
    AuthzRequest::new("POST", "/v1.47/containers/create")
        .with_header("Content-Type", "application/json")
        .with_header("Authz-User", user)
        .with_body(br#"{"Image":"busybox"}"#.to_vec())
}

fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(10)
}

async fn call(app: Router, uri: &str, payload: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/vnd.docker.plugins.v1.2+json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn plugin_payload(method: &str, uri: &str, user: &str, body: &[u8]) -> Value {
    json!({
        "User": "",
        "UserAuthNMethod": "",
        "RequestMethod": method,
        "RequestURI": uri,
        "RequestBody": STANDARD.encode(body),
        "RequestHeaders": {"Content-Type": "application/json", "Authz-User": user}
    })
}

#[tokio::test]
async fn alice_may_create_containers() {
    let dir = tempdir().unwrap();
    let policy = write_policy(dir.path(), USERS_POLICY);
    let (authz, sink) = authorizer_for(BackendChoice::Embedded(policy), PolicySnapshot::new()).await;

    let decision = authz.authorize(&create_request("alice"), deadline()).await;
    assert!(decision.allow);
    assert!(decision.error.is_none());

    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].input["Body"]["Image"], "busybox");
    assert_eq!(records[0].input["PathArr"], json!(["", "v1.47", "containers", "create"]));
}

#[tokio::test]
async fn bob_is_read_only() {
    let dir = tempdir().unwrap();
    let policy = write_policy(dir.path(), USERS_POLICY);
    let (authz, _sink) = authorizer_for(BackendChoice::Embedded(policy), PolicySnapshot::new()).await;

    let decision = authz.authorize(&create_request("bob"), deadline()).await;
    assert!(!decision.allow);
    assert!(decision.error.is_none());
    assert_eq!(decision.message.as_deref(), Some(authz_daemon::DENY_MESSAGE));

    let read = AuthzRequest::new("GET", "/v1.47/containers/json").with_header("Authz-User", "bob");
    assert!(authz.authorize(&read, deadline()).await.allow);
}

#[tokio::test]
async fn plugin_protocol_round_trip() {
    let dir = tempdir().unwrap();
    let policy = write_policy(dir.path(), USERS_POLICY);
    let (authz, _sink) = authorizer_for(BackendChoice::Embedded(policy), PolicySnapshot::new()).await;
    let app = router(authz, Duration::from_secs(10));

    let (status, body) = call(app.clone(), "/Plugin.Activate", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"Implements": ["authz"]}));

    let (_, body) = call(
        app.clone(),
        "/AuthZPlugin.AuthZReq",
        plugin_payload("POST", "/v1.47/containers/create", "alice", br#"{"Image":"busybox"}"#),
    )
    .await;
    let response: PluginResponse = serde_json::from_value(body).unwrap();
    assert!(response.allow);

    let (_, body) = call(
        app.clone(),
        "/AuthZPlugin.AuthZReq",
        plugin_payload("POST", "/v1.47/containers/create", "bob", br#"{"Image":"busybox"}"#),
    )
    .await;
    assert_eq!(
        body,
        json!({"Allow": false, "Msg": "request rejected by administrative policy"})
    );

    let (_, body) = call(
        app,
        "/AuthZPlugin.AuthZRes",
        plugin_payload("DELETE", "/v1.47/containers/abc", "mallory", b""),
    )
    .await;
    assert_eq!(body, json!({"Allow": true}));
}

#[tokio::test]
async fn missing_policy_fails_open_on_the_wire() {
    let dir = tempdir().unwrap();
    let (authz, sink) = authorizer_for(
        BackendChoice::Embedded(dir.path().join("missing.rego")),
        PolicySnapshot::new(),
    )
    .await;

    let decision = authz.authorize(&create_request("mallory"), deadline()).await;
    assert!(decision.allow);
    assert!(decision.error.is_some());

    let app = router(authz, Duration::from_secs(10));
    let (_, body) = call(
        app,
        "/AuthZPlugin.AuthZReq",
        plugin_payload("GET", "/v1.47/info", "mallory", b""),
    )
    .await;
    assert_eq!(body, json!({"Allow": true}));

    // The caveat is in the audit trail instead.
    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.result && r.error.is_some()));
}

#[tokio::test]
async fn malformed_payload_is_an_error_response() {
    let dir = tempdir().unwrap();
    let policy = write_policy(dir.path(), USERS_POLICY);
    let (authz, _sink) = authorizer_for(BackendChoice::Embedded(policy), PolicySnapshot::new()).await;
    let app = router(authz, Duration::from_secs(10));

    let (_, body) = call(app, "/AuthZPlugin.AuthZReq", json!({"RequestBody": "not base64!"})).await;
    let response: PluginResponse = serde_json::from_value(body).unwrap();
    assert!(!response.allow);
    assert!(!response.err.is_empty());
}

#[tokio::test]
async fn symlinked_bind_mount_is_resolved_before_policy() {
    let dir = tempdir().unwrap();
    let secret = dir.path().join("secret");
    fs::create_dir(&secret).unwrap();
    std::os::unix::fs::symlink(&secret, dir.path().join("innocent")).unwrap();

    let policy = write_policy(
        dir.path(),
        r#"package docker.authz

import rego.v1

deny if {
    mount := input.BindMounts[_]
    endswith(mount.ResolvedSource, "/secret")
}

allow if {
    not deny
}
"#,
    );
    let (authz, _sink) = authorizer_for(BackendChoice::Embedded(policy), PolicySnapshot::new()).await;

    let body = json!({
        "Image": "busybox",
        "HostConfig": {"Binds": [format!("{}:/data:ro", dir.path().join("innocent").display())]}
    });
    let request = AuthzRequest::new("POST", "/v1.47/containers/create")
        .with_header("Content-Type", "application/json")
        .with_body(body.to_string().into_bytes());
    let decision = authz.authorize(&request, deadline()).await;
    assert!(!decision.allow);
    assert!(decision.error.is_none());

    let traversal = json!({
        "HostConfig": {"Binds": [format!("{}/other/../secret:/data", dir.path().display())]}
    });
    let request = AuthzRequest::new("POST", "/v1.47/containers/create")
        .with_header("Content-Type", "application/json")
        .with_body(traversal.to_string().into_bytes());
    assert!(!authz.authorize(&request, deadline()).await.allow);

    let plain = AuthzRequest::new("POST", "/v1.47/containers/create")
        .with_header("Content-Type", "application/json")
        .with_body(br#"{"Image":"busybox"}"#.to_vec());
    assert!(authz.authorize(&plain, deadline()).await.allow);
}

const OPERATORS_POLICY: &str = r#"package docker.authz

import rego.v1

allow if {
    input.Headers["Authz-User"] in data.operators
}
"#;

/// Write a managed engine config whose data makes alice an operator.
fn managed_config(dir: &Path, extra: &str) -> std::path::PathBuf {
    fs::write(dir.join("authz.rego"), OPERATORS_POLICY).unwrap();
    fs::write(dir.join("data.json"), r#"{"operators": ["alice"]}"#).unwrap();
    let config = dir.join("engine.yaml");
    fs::write(
        &config,
        format!(
            "policies:\n  - {}\ndata:\n  - {}\n{extra}",
            dir.join("authz.rego").display(),
            dir.join("data.json").display()
        ),
    )
    .unwrap();
    config
}

#[tokio::test]
async fn managed_engine_decides_with_data() {
    let dir = tempdir().unwrap();
    let config = managed_config(dir.path(), "");

    let (authz, sink) = authorizer_for(BackendChoice::Managed(config), PolicySnapshot::new()).await;
    assert!(matches!(authz.evaluator(), PolicyEvaluator::ManagedDecision(_)));
    assert_eq!(authz.evaluator().query_path(), "/docker/authz/allow");

    assert!(authz.authorize(&create_request("alice"), deadline()).await.allow);

    let denied = authz.authorize(&create_request("bob"), deadline()).await;
    assert!(!denied.allow);
    assert!(denied.error.is_none());

    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].config_hash, records[1].config_hash);
    assert!(records[0].config_hash.is_some());
}

// --- concurrency ------------------------------------------------------------

const CONCURRENT_CALLS: usize = 16;

/// Fire alternating alice/bob create requests at once; alice must be
/// allowed and bob denied every time, each with its own decision record.
async fn decide_concurrently(authz: Arc<Authorizer>, sink: &Collecting) {
    let mut calls = JoinSet::new();
    for i in 0..CONCURRENT_CALLS {
        let authz = Arc::clone(&authz);
        let user = if i % 2 == 0 { "alice" } else { "bob" };
        calls.spawn(async move {
            let decision = authz.authorize(&create_request(user), deadline()).await;
            (user, decision)
        });
    }

    let mut decided = 0;
    while let Some(joined) = calls.join_next().await {
        let (user, decision) = joined.unwrap();
        assert_eq!(decision.allow, user == "alice", "wrong decision for {user}");
        assert!(decision.error.is_none(), "{user}: {:?}", decision.error);
        decided += 1;
    }
    assert_eq!(decided, CONCURRENT_CALLS);

    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), CONCURRENT_CALLS);
    let ids: HashSet<_> = records.iter().map(|r| r.decision_id).collect();
    assert_eq!(ids.len(), CONCURRENT_CALLS);
    for record in records.iter() {
        let user = record.input["Headers"]["Authz-User"].as_str().unwrap();
        assert_eq!(record.result, user == "alice");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn embedded_backend_decides_concurrent_requests() {
    let dir = tempdir().unwrap();
    let policy = write_policy(dir.path(), USERS_POLICY);
    let (authz, sink) = authorizer_for(BackendChoice::Embedded(policy), PolicySnapshot::new()).await;

    decide_concurrently(authz, &sink).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn managed_backend_queues_more_calls_than_its_depth() {
    let dir = tempdir().unwrap();
    let config = managed_config(dir.path(), "queue_depth: 2\n");
    let (authz, sink) = authorizer_for(BackendChoice::Managed(config), PolicySnapshot::new()).await;

    decide_concurrently(authz, &sink).await;
}

#[tokio::test]
async fn malformed_response_payload_is_still_allowed() {
    let dir = tempdir().unwrap();
    let policy = write_policy(dir.path(), USERS_POLICY);
    let (authz, sink) = authorizer_for(BackendChoice::Embedded(policy), PolicySnapshot::new()).await;
    let app = router(authz, Duration::from_secs(10));

    let (_, body) = call(app, "/AuthZPlugin.AuthZRes", json!({"RequestBody": "not base64!"})).await;
    assert_eq!(body, json!({"Allow": true}));
    assert!(sink.records.lock().unwrap().is_empty());
}

// --- remote backend -------------------------------------------------------

#[derive(Clone, Default)]
struct PolicyService {
    uploads: Arc<Mutex<Vec<(String, String)>>>,
}

async fn store_policy(
    State(service): State<PolicyService>,
    UrlPath(id): UrlPath<String>,
    body: String,
) -> StatusCode {
    if id == "rejected" {
        return StatusCode::BAD_REQUEST;
    }
    service.uploads.lock().unwrap().push((id, body));
    StatusCode::OK
}

/// Allows once any policy has been uploaded; 404 before that.
async fn decide(State(service): State<PolicyService>, Json(_body): Json<Value>) -> (StatusCode, Json<Value>) {
    if service.uploads.lock().unwrap().is_empty() {
        (StatusCode::NOT_FOUND, Json(json!({})))
    } else {
        (StatusCode::OK, Json(json!({"result": true})))
    }
}

async fn spawn_policy_service() -> (String, PolicyService) {
    let service = PolicyService::default();
    let app = Router::new()
        .route("/policies/{id}", put(store_policy))
        .route("/data/docker/authz/allow", post(decide))
        .with_state(service.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), service)
}

async fn wait_for_uploads(service: &PolicyService, count: usize) {
    let give_up = Instant::now() + Duration::from_secs(10);
    while service.uploads.lock().unwrap().len() < count {
        assert!(Instant::now() < give_up, "timed out waiting for policy upload");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn remote_backend(evaluator: &PolicyEvaluator) -> authz_policy::RemoteHttp {
    match evaluator {
        PolicyEvaluator::RemoteHttp(backend) => backend.clone(),
        _ => panic!("expected remote backend"),
    }
}

#[tokio::test]
async fn remote_backend_is_undefined_until_policy_is_pushed() {
    let (base, service) = spawn_policy_service().await;
    let dir = tempdir().unwrap();
    let text = "package docker.authz\n\ndefault allow := true\n";
    let policy = write_policy(dir.path(), text);

    let snapshot = PolicySnapshot::new();
    let (authz, sink) = authorizer_for(BackendChoice::Remote(base), snapshot.clone()).await;

    let before = authz.authorize(&create_request("alice"), deadline()).await;
    assert!(!before.allow);
    assert!(before.error.is_none());

    let _handle = PolicyReloader::new(&policy, "docker-authz", remote_backend(authz.evaluator()))
        .spawn()
        .unwrap();
    wait_for_uploads(&service, 1).await;
    assert_eq!(
        service.uploads.lock().unwrap()[0],
        ("docker-authz".to_string(), text.to_string())
    );

    // The snapshot is published right after the upload returns.
    let give_up = Instant::now() + Duration::from_secs(5);
    while snapshot.current().is_none() {
        assert!(Instant::now() < give_up, "snapshot never published");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let after = authz.authorize(&create_request("alice"), deadline()).await;
    assert!(after.allow);

    let records = sink.records.lock().unwrap();
    assert!(records[0].config_hash.is_none());
    assert_eq!(
        records[1].config_hash.as_deref(),
        Some(authz_audit::hasher::hash_bytes(text.as_bytes()).as_str())
    );
}

#[tokio::test]
async fn reloader_pushes_file_edits() {
    let (base, service) = spawn_policy_service().await;
    let dir = tempdir().unwrap();
    let policy = write_policy(dir.path(), "package docker.authz\n\ndefault allow := false\n");

    let (authz, _sink) = authorizer_for(BackendChoice::Remote(base), PolicySnapshot::new()).await;
    let _handle = PolicyReloader::new(&policy, "docker-authz", remote_backend(authz.evaluator()))
        .spawn()
        .unwrap();
    wait_for_uploads(&service, 1).await;

    fs::write(&policy, "package docker.authz\n\ndefault allow := true\n").unwrap();
    let give_up = Instant::now() + Duration::from_secs(10);
    loop {
        let latest = service.uploads.lock().unwrap().last().cloned();
        if let Some((_, text)) = latest {
            if text.contains("allow := true") {
                break;
            }
        }
        assert!(Instant::now() < give_up, "edit was never uploaded");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn failed_upload_keeps_previous_snapshot() {
    let (base, service) = spawn_policy_service().await;
    let dir = tempdir().unwrap();
    let policy = write_policy(dir.path(), "package docker.authz\n");

    let snapshot = PolicySnapshot::new();
    let (authz, _sink) = authorizer_for(BackendChoice::Remote(base), snapshot.clone()).await;

    let reloader = PolicyReloader::new(&policy, "rejected", remote_backend(authz.evaluator()));
    assert!(reloader.reload().await.is_err());
    assert!(snapshot.current().is_none());
    assert!(service.uploads.lock().unwrap().is_empty());

    let reloader = PolicyReloader::new(dir.path().join("missing.rego"), "docker-authz", remote_backend(authz.evaluator()));
    assert!(reloader.reload().await.is_err());
}
