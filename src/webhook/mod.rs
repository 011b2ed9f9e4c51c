//! GitHub/CI webhook ingestion, grounded in
//! `examples/original_source/src/membria/webhook_server.py` (route
//! layout) and `github_client.py` (the `Decision: dec_<hex>` trailer
//! form embedded in PR bodies and commit messages).

use crate::error::Error;
use crate::graph::GraphStore;
use crate::outcome::OutcomeTracker;
use crate::signal_queue::{NewSignal, SignalQueue};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use regex::Regex;
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::{Arc, OnceLock};

/// Parses an RFC3339 timestamp field off a webhook payload, falling back to
/// the time the event is being processed. Preferring the external event's
/// own timestamp (when GitHub supplies one) over wall-clock time is what
/// lets a redelivered webhook collapse onto the same signal.
fn event_timestamp(value: &Value, field: &str) -> DateTime<Utc> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

type HmacSha256 = Hmac<Sha256>;

fn decision_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\bdec_[0-9a-f]+\b").expect("valid decision id pattern"))
}

/// Finds the first `dec_<hex>` token in `text`, matching both a bare
/// mention and the `Decision: dec_<hex>` trailer form (the trailer is
/// just surrounding text around the same token).
pub fn extract_decision_id(text: &str) -> Option<String> {
    decision_id_pattern().find(text).map(|m| m.as_str().to_lowercase())
}

/// Verifies a GitHub `X-Hub-Signature-256` header (`sha256=<hex>`)
/// against `secret` and the raw request body.
pub fn verify_github_signature(secret: &str, raw_body: &[u8], signature_header: &str) -> bool {
    let Some(hex_sig) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&expected).is_ok()
}

pub struct WebhookState {
    tracker: OutcomeTracker,
    signal_queue: Option<SignalQueue>,
    github_secret: Option<String>,
}

impl WebhookState {
    pub fn new(store: Arc<dyn GraphStore>, signal_queue: Option<SignalQueue>, github_secret: Option<String>) -> Self {
        Self { tracker: OutcomeTracker::new(store), signal_queue, github_secret }
    }
}

pub struct WebhookServer {
    state: Arc<WebhookState>,
}

impl WebhookServer {
    pub fn new(state: WebhookState) -> Self {
        Self { state: Arc::new(state) }
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/github/push", post(handle_push))
            .route("/github/pull_request", post(handle_pull_request))
            .route("/github/workflow_run", post(handle_workflow_run))
            .route("/github/check_run", post(handle_check_run))
            .route("/ci/event", post(handle_ci_event))
            .route("/health", get(health))
            .with_state(self.state)
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "healthy"}))
}

fn verify_if_configured(state: &WebhookState, headers: &HeaderMap, raw_body: &[u8]) -> Result<(), StatusCode> {
    let Some(secret) = &state.github_secret else {
        return Ok(());
    };
    let signature = headers.get("X-Hub-Signature-256").and_then(|v| v.to_str().ok());
    match signature {
        Some(sig) if verify_github_signature(secret, raw_body, sig) => Ok(()),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

fn ignored(reason: &str) -> Json<Value> {
    Json(json!({"status": "ignored", "reason": reason}))
}

fn error_response(err: Error) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"status": "error", "message": err.to_string()})))
}

fn record_commit_reference(state: &WebhookState, decision_id: &str, message: &str) {
    if let Some(queue) = &state.signal_queue {
        let signal = NewSignal {
            signal_type: "commit_reference".to_string(),
            confidence: 1.0,
            module: "general".to_string(),
            raw_text: format!("{decision_id}: {message}"),
        };
        if let Err(e) = queue.save_signal(signal) {
            tracing::warn!(error = %e, "failed to queue commit-reference signal");
        }
    }
}

async fn handle_push(State(state): State<Arc<WebhookState>>, headers: HeaderMap, raw_body: Bytes) -> impl IntoResponse {
    if let Err(status) = verify_if_configured(&state, &headers, &raw_body) {
        return status.into_response();
    }
    let payload: Value = match serde_json::from_slice(&raw_body) {
        Ok(v) => v,
        Err(_) => return (StatusCode::BAD_REQUEST, Json(json!({"status": "error", "message": "invalid JSON"}))).into_response(),
    };

    let mut referenced = 0u32;
    if let Some(commits) = payload.get("commits").and_then(|c| c.as_array()) {
        for commit in commits {
            let message = commit.get("message").and_then(|m| m.as_str()).unwrap_or("");
            if let Some(decision_id) = extract_decision_id(message) {
                record_commit_reference(&state, &decision_id, message);
                referenced += 1;
            }
        }
    }

    if referenced == 0 {
        return ignored("no commits referenced a decision").into_response();
    }
    Json(json!({"status": "success", "commits_linked": referenced})).into_response()
}

async fn handle_pull_request(State(state): State<Arc<WebhookState>>, headers: HeaderMap, raw_body: Bytes) -> impl IntoResponse {
    if let Err(status) = verify_if_configured(&state, &headers, &raw_body) {
        return status.into_response();
    }
    let payload: Value = match serde_json::from_slice(&raw_body) {
        Ok(v) => v,
        Err(_) => return (StatusCode::BAD_REQUEST, Json(json!({"status": "error", "message": "invalid JSON"}))).into_response(),
    };

    let action = payload.get("action").and_then(|a| a.as_str()).unwrap_or("");
    let pr = payload.get("pull_request").cloned().unwrap_or(Value::Null);
    let title = pr.get("title").and_then(|t| t.as_str()).unwrap_or("");
    let body = pr.get("body").and_then(|b| b.as_str()).unwrap_or("");
    let Some(decision_id) = extract_decision_id(title).or_else(|| extract_decision_id(body)) else {
        return ignored("no decision id found in title or body").into_response();
    };

    let outcome = match state.tracker.store().get_outcome_by_decision(&decision_id) {
        Ok(Some(o)) => o,
        Ok(None) => return ignored("no outcome recorded for this decision").into_response(),
        Err(e) => return error_response(e).into_response(),
    };

    let number = pr.get("number").and_then(|n| n.as_i64()).unwrap_or_default();
    let url = pr.get("html_url").and_then(|u| u.as_str()).unwrap_or_default();
    let branch = pr.get("head").and_then(|h| h.get("ref")).and_then(|r| r.as_str());
    let merged = pr.get("merged").and_then(|m| m.as_bool()).unwrap_or(false);

    // Idempotent redelivery (spec §4.K/I7, scenario 5): a "opened"/"closed"
    // action whose transition already happened is a no-op success, not an
    // `IllegalTransition` — the outcome is already where this event wants
    // it, so there is nothing left to apply.
    use crate::model::OutcomeStatus;
    let result = if action == "opened" {
        if outcome.status != OutcomeStatus::Pending {
            Ok("pr_created")
        } else {
            state.tracker.record_pr_created(&outcome.id, number, url, branch).map(|_| "pr_created")
        }
    } else if action == "closed" && merged {
        if matches!(outcome.status, OutcomeStatus::Merged | OutcomeStatus::Completed) {
            Ok("pr_merged")
        } else {
            state.tracker.record_pr_merged(&outcome.id, number).map(|_| "pr_merged")
        }
    } else {
        return ignored("no actionable pull_request transition").into_response();
    };

    match result {
        Ok(event) => Json(json!({"status": "success", "outcome_id": outcome.id, "event": event})).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn handle_workflow_run(State(state): State<Arc<WebhookState>>, headers: HeaderMap, raw_body: Bytes) -> impl IntoResponse {
    if let Err(status) = verify_if_configured(&state, &headers, &raw_body) {
        return status.into_response();
    }
    let payload: Value = match serde_json::from_slice(&raw_body) {
        Ok(v) => v,
        Err(_) => return (StatusCode::BAD_REQUEST, Json(json!({"status": "error", "message": "invalid JSON"}))).into_response(),
    };

    let run = payload.get("workflow_run").cloned().unwrap_or(Value::Null);
    let status_field = run.get("status").and_then(|s| s.as_str()).unwrap_or("");
    if status_field != "completed" {
        return ignored("workflow run not completed").into_response();
    }
    let conclusion = run.get("conclusion").and_then(|c| c.as_str()).unwrap_or("");
    let message = run.get("head_commit").and_then(|c| c.get("message")).and_then(|m| m.as_str()).unwrap_or("");
    let Some(decision_id) = extract_decision_id(message) else {
        return ignored("no decision id found in head commit message").into_response();
    };

    let outcome = match state.tracker.store().get_outcome_by_decision(&decision_id) {
        Ok(Some(o)) => o,
        Ok(None) => return ignored("no outcome recorded for this decision").into_response(),
        Err(e) => return error_response(e).into_response(),
    };

    let passed = conclusion == "success";
    let at = event_timestamp(&run, "updated_at");
    match state.tracker.record_ci_result(&outcome.id, passed, Some(conclusion.to_string()), at) {
        Ok(_) => Json(json!({"status": "success", "outcome_id": outcome.id, "event": "ci_result"})).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn handle_check_run(State(state): State<Arc<WebhookState>>, headers: HeaderMap, raw_body: Bytes) -> impl IntoResponse {
    if let Err(status) = verify_if_configured(&state, &headers, &raw_body) {
        return status.into_response();
    }
    let payload: Value = match serde_json::from_slice(&raw_body) {
        Ok(v) => v,
        Err(_) => return (StatusCode::BAD_REQUEST, Json(json!({"status": "error", "message": "invalid JSON"}))).into_response(),
    };

    let check = payload.get("check_run").cloned().unwrap_or(Value::Null);
    let status_field = check.get("status").and_then(|s| s.as_str()).unwrap_or("");
    if status_field != "completed" {
        return ignored("check run not completed").into_response();
    }
    let conclusion = check.get("conclusion").and_then(|c| c.as_str()).unwrap_or("");
    let summary = check
        .get("output")
        .and_then(|o| o.get("summary").or_else(|| o.get("title")))
        .and_then(|s| s.as_str())
        .unwrap_or("");
    let name = check.get("name").and_then(|n| n.as_str()).unwrap_or("");
    let Some(decision_id) = extract_decision_id(summary).or_else(|| extract_decision_id(name)) else {
        return ignored("no decision id found in check run").into_response();
    };

    let outcome = match state.tracker.store().get_outcome_by_decision(&decision_id) {
        Ok(Some(o)) => o,
        Ok(None) => return ignored("no outcome recorded for this decision").into_response(),
        Err(e) => return error_response(e).into_response(),
    };

    let passed = conclusion == "success";
    let at = event_timestamp(&check, "completed_at");
    match state.tracker.record_ci_result(&outcome.id, passed, Some(conclusion.to_string()), at) {
        Ok(_) => Json(json!({"status": "success", "outcome_id": outcome.id, "event": "ci_result"})).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// Generic CI JSON event (no signature verification, matching the
/// source's `/ci/event` route): `{decision_id, passed, details}`.
async fn handle_ci_event(State(state): State<Arc<WebhookState>>, Json(payload): Json<Value>) -> impl IntoResponse {
    let Some(decision_id) = payload.get("decision_id").and_then(|d| d.as_str()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({"status": "error", "message": "decision_id is required"}))).into_response();
    };
    let outcome = match state.tracker.store().get_outcome_by_decision(decision_id) {
        Ok(Some(o)) => o,
        Ok(None) => return ignored("no outcome recorded for this decision").into_response(),
        Err(e) => return error_response(e).into_response(),
    };
    let passed = payload.get("passed").and_then(|p| p.as_bool()).unwrap_or(false);
    let details = payload.get("details").and_then(|d| d.as_str()).map(|s| s.to_string());
    let at = event_timestamp(&payload, "timestamp");

    match state.tracker.record_ci_result(&outcome.id, passed, details, at) {
        Ok(_) => Json(json!({"status": "success", "outcome_id": outcome.id, "event": "ci_result"})).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bare_decision_id() {
        assert_eq!(extract_decision_id("implements dec_789"), Some("dec_789".to_string()));
    }

    #[test]
    fn extracts_decision_id_from_trailer_form() {
        let message = "Implement feature\n\nDecision: dec_abc123";
        assert_eq!(extract_decision_id(message), Some("dec_abc123".to_string()));
    }

    #[test]
    fn returns_none_when_absent() {
        assert_eq!(extract_decision_id("just a regular commit"), None);
    }

    #[test]
    fn signature_round_trips_with_hmac() {
        let secret = "topsecret";
        let body = b"{\"a\":1}";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let digest = hex::encode(mac.finalize().into_bytes());
        let header = format!("sha256={digest}");
        assert!(verify_github_signature(secret, body, &header));
        assert!(!verify_github_signature("wrong", body, &header));
    }

    /// Spec §8 scenario 5: posting the same merged `pull_request` payload
    /// twice yields a single `pr_merged` signal and two HTTP 200 responses
    /// with identical `outcome_id`.
    #[tokio::test]
    async fn duplicate_pull_request_merged_webhook_is_idempotent() {
        use crate::model::{Decision, Namespace, SignalType};
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let store: Arc<dyn GraphStore> = Arc::new(crate::graph::SqliteGraphStore::in_memory().unwrap());
        let decision = Decision::new("dec_abc123def012", Namespace::new("t", "team", "proj"), "use X", vec![], 0.8, "backend", Utc::now()).unwrap();
        store.add_decision(&decision).unwrap();
        let tracker = OutcomeTracker::new(store.clone());
        let outcome = tracker.create_outcome(decision.id.clone()).unwrap();
        tracker.record_pr_created(&outcome.id, 42, "https://github.com/acme/svc/pull/42", Some("feat/db")).unwrap();

        let state = WebhookState::new(store.clone(), None, None);
        let app = WebhookServer::new(state).router();

        let body = json!({
            "action": "closed",
            "pull_request": {
                "number": 42,
                "merged": true,
                "title": format!("Wire up {}", decision.id),
                "body": "",
                "head": {"ref": "feat/db"},
            }
        })
        .to_string();

        let make_request = || {
            Request::builder()
                .method("POST")
                .uri("/github/pull_request")
                .header("content-type", "application/json")
                .body(Body::from(body.clone()))
                .unwrap()
        };

        let first = app.clone().oneshot(make_request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = app.oneshot(make_request()).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);

        let final_outcome = store.get_outcome(&outcome.id).unwrap().unwrap();
        let merged_signals = final_outcome.signals.iter().filter(|s| s.signal_type == SignalType::PrMerged).count();
        assert_eq!(merged_signals, 1);
    }
}
