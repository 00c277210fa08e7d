//! API route definitions.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::info;

use super::state::AppState;
use crate::error::SchedulerError;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/log", get(log))
        .route("/run/start", post(start))
        .route("/run/stop", post(stop))
        .route("/run/check", post(check))
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": meta()
    }))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "data": state.scheduler.snapshot(), "meta": meta() }))
}

async fn log(State(state): State<AppState>) -> Json<Value> {
    let entries = state.scheduler.state().log().entries();
    let total = entries.len();
    Json(json!({ "data": entries, "meta": { "total": total } }))
}

async fn start(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.scheduler.start(state.config.as_ref().clone()) {
        Ok(()) => {
            info!("check loop started via API");
            (
                StatusCode::OK,
                Json(json!({ "data": { "status": state.scheduler.snapshot().status }, "meta": meta() })),
            )
        }
        Err(e) => conflict(&e),
    }
}

fn conflict(e: &SchedulerError) -> (StatusCode, Json<Value>) {
    (
        StatusCode::CONFLICT,
        Json(json!({ "error": { "code": e.code(), "message": e.to_string() } })),
    )
}

async fn stop(State(state): State<AppState>) -> Json<Value> {
    let status = state.scheduler.request_stop();
    info!(%status, "stop requested via API");
    Json(json!({ "data": { "status": status }, "meta": meta() }))
}

async fn check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    // Detached: the session lock orders it after any running session.
    match state.scheduler.request_check(state.config.as_ref().clone()) {
        Ok(_) => {
            info!("on-demand check queued via API");
            (
                StatusCode::ACCEPTED,
                Json(json!({ "data": { "accepted": true }, "meta": meta() })),
            )
        }
        Err(e) => conflict(&e),
    }
}
