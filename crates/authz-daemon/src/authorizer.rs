// authorizer.rs — One authorization decision, start to finish.
//
//   request ──▶ health-check bypass? ──yes──▶ allow (no evaluation, no audit)
//                    │ no
//                    ▼
//              RequestNormalizer ──error──▶ deny with error
//                    │
//                    ▼
//              PolicyEvaluator ──▶ DecisionAuditor ──▶ Decision
//
// Outcome table:
//   Decided(true)              allow
//   Decided(false) / Undefined deny, message
//   missing embedded file      allow, error (fail open)
//   any other error            deny, error

use tokio::time::Instant;

use authz_audit::DecisionAuditor;
use authz_input::{AuthzRequest, RequestNormalizer};
use authz_policy::PolicyEvaluator;

/// Message returned when the policy denies a request.
pub const DENY_MESSAGE: &str = "request rejected by administrative policy";

/// The only path the health-check bypass applies to.
pub const HEALTH_CHECK_PATH: &str = "/_ping";

/// The answer for one request.
///
/// A denial carries exactly one of `message` or `error`. An allow may carry
/// an `error` when it was granted by failing open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allow: bool,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            allow: true,
            message: None,
            error: None,
        }
    }

    pub fn deny() -> Self {
        Self {
            allow: false,
            message: Some(DENY_MESSAGE.to_string()),
            error: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            allow: false,
            message: None,
            error: Some(error.into()),
        }
    }

    /// Allow despite `error`.
    pub fn fail_open(error: impl Into<String>) -> Self {
        Self {
            allow: true,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// Decides API requests against the configured policy backend.
pub struct Authorizer {
    evaluator: PolicyEvaluator,
    auditor: DecisionAuditor,
    skip_health_check: bool,
}

impl Authorizer {
    pub fn new(evaluator: PolicyEvaluator, auditor: DecisionAuditor, skip_health_check: bool) -> Self {
        Self {
            evaluator,
            auditor,
            skip_health_check,
        }
    }

    pub fn evaluator(&self) -> &PolicyEvaluator {
        &self.evaluator
    }

    fn is_health_check(&self, request: &AuthzRequest) -> bool {
        self.skip_health_check && request.method == "HEAD" && request.uri == HEALTH_CHECK_PATH
    }

    /// Decide `request`, giving the policy backend until `deadline`.
    pub async fn authorize(&self, request: &AuthzRequest, deadline: Instant) -> Decision {
        if self.is_health_check(request) {
            tracing::debug!("health check, skipping policy evaluation");
            return Decision::allow();
        }

        let input = match RequestNormalizer::normalize(request)
            .map_err(|e| e.to_string())
            .and_then(|document| document.to_value().map_err(|e| e.to_string()))
        {
            Ok(input) => input,
            Err(e) => {
                tracing::warn!(
                    method = %request.method,
                    uri = %request.uri,
                    error = %e,
                    "could not build policy input, denying request"
                );
                return Decision::error(e);
            }
        };

        let evaluation = self.evaluator.evaluate(deadline, &input).await;
        let (allowed, error) = match evaluation.outcome {
            Ok(verdict) => (verdict.is_allow(), None),
            Err(e) => (e.is_fail_open(), Some(e.to_string())),
        };

        let record = self.auditor.record(
            input,
            allowed,
            evaluation.policy_bytes.as_deref(),
            error.clone(),
        );
        self.auditor.audit(&record);

        match (allowed, error) {
            (true, None) => Decision::allow(),
            (true, Some(e)) => Decision::fail_open(e),
            (false, Some(e)) => Decision::error(e),
            (false, None) => Decision::deny(),
        }
    }

    /// Responses are never restricted.
    pub fn authorize_response(&self, request: &AuthzRequest) -> Decision {
        tracing::debug!(method = %request.method, uri = %request.uri, "response allowed");
        Decision::allow()
    }
}
