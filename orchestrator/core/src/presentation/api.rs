// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Operator-facing HTTP surface.
//!
//! Read endpoints for health and incidents plus the pause/resume controls.
//! Everything here is a thin view over the orchestrator; no state lives in
//! the handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::application::orchestrator::Orchestrator;
use crate::domain::incident::SecurityIncident;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
}

pub fn router(orchestrator: Orchestrator) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/incidents", get(incidents))
        .route("/system/pause", post(pause))
        .route("/system/resume", post(resume))
        .with_state(AppState { orchestrator })
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(state.orchestrator.health())
}

async fn incidents(State(state): State<AppState>) -> Json<Vec<SecurityIncident>> {
    Json(state.orchestrator.incidents())
}

#[derive(Debug, Deserialize)]
struct PauseRequest {
    reason: String,
}

async fn pause(
    State(state): State<AppState>,
    Json(request): Json<PauseRequest>,
) -> (StatusCode, Json<Value>) {
    info!(reason = %request.reason, "pause requested via api");
    state.orchestrator.pause_system(&request.reason).await;
    (StatusCode::ACCEPTED, Json(json!({"status": "paused"})))
}

async fn resume(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    info!("resume requested via api");
    state.orchestrator.resume_system().await;
    (StatusCode::ACCEPTED, Json(json!({"status": "resumed"})))
}
