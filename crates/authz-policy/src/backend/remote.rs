// remote.rs — Decisions from a remote policy service over HTTP.
//
// Data API:
//   POST {base}/data{doc_path}   body {"input": <document>}
//     200 {"result": <bool>}     → decided
//     200 {} / {"result": null}  → undefined
//     404                        → undefined
//     anything else              → error
//
// Policy API (used by the reloader):
//   PUT {base}/policies/{id}     body: raw policy text
//
// No retries: a failure is reported once and the caller decides.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::PolicyError;
use crate::evaluator::{Evaluation, Verdict};
use crate::snapshot::PolicySnapshot;

#[derive(Debug, Deserialize)]
struct DataResponse {
    #[serde(default)]
    result: Option<Value>,
}

/// Client for a remote policy service.
#[derive(Debug, Clone)]
pub struct RemoteHttp {
    client: reqwest::Client,
    base_url: String,
    doc_path: String,
    snapshot: PolicySnapshot,
}

impl RemoteHttp {
    /// `doc_path` is in slash form (e.g. `/docker/authz/allow`). `snapshot`
    /// holds whatever policy the reloader last pushed.
    pub fn new(
        base_url: impl Into<String>,
        doc_path: impl Into<String>,
        snapshot: PolicySnapshot,
    ) -> Result<Self, PolicyError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            doc_path: doc_path.into(),
            snapshot,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn doc_path(&self) -> &str {
        &self.doc_path
    }

    pub fn snapshot(&self) -> &PolicySnapshot {
        &self.snapshot
    }

    fn data_url(&self) -> String {
        format!("{}/data{}", self.base_url, self.doc_path)
    }

    fn policy_url(&self, id: &str) -> String {
        format!("{}/policies/{}", self.base_url, id)
    }

    pub(crate) async fn evaluate(&self, input: &Value) -> Evaluation {
        let outcome = self.query(input).await;
        Evaluation::new(outcome, self.snapshot.current())
    }

    async fn query(&self, input: &Value) -> Result<Verdict, PolicyError> {
        let response = self
            .client
            .post(self.data_url())
            .json(&json!({ "input": input }))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body: DataResponse = response.json().await?;
                Verdict::from_strict(body.result)
            }
            StatusCode::NOT_FOUND => Ok(Verdict::Undefined),
            status => Err(PolicyError::UnexpectedStatus {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Replace the remote policy module `id` with `text`.
    pub async fn upload_policy(&self, id: &str, text: String) -> Result<(), PolicyError> {
        let response = self
            .client
            .put(self.policy_url(id))
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(text)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(PolicyError::UnexpectedStatus {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}
