//! Thin HTTP edge (SPEC_FULL §6 expansion). Out of scope per spec.md §1, but
//! kept as an undecorated pass-through to [`CommandEngine::submit`] so the
//! crate is runnable end-to-end, in the spirit of `services/server::build_router`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::{CommandEngine, SubmitRequest};
use crate::health::HealthState;

#[derive(Clone)]
pub struct HttpState {
    pub engine: CommandEngine,
    pub health: Arc<HealthState>,
    pub default_timeout: Duration,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/health", get(full_health))
        .route("/api/v1/submit", post(submit))
        .with_state(state)
}

async fn liveness(State(state): State<HttpState>) -> impl IntoResponse {
    Json(state.health.liveness())
}

async fn readiness(State(state): State<HttpState>) -> impl IntoResponse {
    let report = state.health.readiness().await;
    let status = if report.ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(report))
}

async fn full_health(State(state): State<HttpState>) -> impl IntoResponse {
    Json(state.health.full_health().await)
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub device_id: String,
    pub module: Option<String>,
    #[serde(default = "default_actor")]
    pub actor: String,
    pub action: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub req_id: Option<String>,
    pub timeout_ms: Option<u64>,
}

fn default_actor() -> String {
    "api".to_owned()
}

/// `{ok, req_id, dispatched, device_id, action, ts}` per §6's edge contract;
/// `X-Request-ID` echoes the request's `req_id`.
async fn submit(State(state): State<HttpState>, Json(body): Json<SubmitBody>) -> impl IntoResponse {
    let req_id = body.req_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let timeout = body.timeout_ms.map(Duration::from_millis).unwrap_or(state.default_timeout);

    let outcome = state
        .engine
        .submit(SubmitRequest {
            req_id: req_id.clone(),
            device_id: body.device_id.clone(),
            module: body.module,
            actor: body.actor,
            action: body.action.clone(),
            params: body.params,
            timeout,
        })
        .await;

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&req_id) {
        headers.insert("X-Request-ID", value);
    }

    let body = serde_json::json!({
        "ok": outcome.success,
        "status": format!("{:?}", outcome.status),
        "req_id": outcome.req_id,
        "dispatched": !outcome.deduped,
        "device_id": body.device_id,
        "action": body.action,
        "ts": Utc::now().to_rfc3339(),
    });
    (StatusCode::OK, headers, Json(body))
}
