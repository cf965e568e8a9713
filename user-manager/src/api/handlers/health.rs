use crate::AppState;
use crate::db::engine::EngineState;
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Engine state keyed by `name/role`.
    pub engines: BTreeMap<String, &'static str>,
}

/// Liveness plus a snapshot of every configured engine. Reports 503 once any engine is closed.
pub async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let states = state.factory.states();
    let closed = states.iter().any(|(_, s)| *s == EngineState::Closed);
    let engines = states
        .into_iter()
        .map(|(identity, s)| (identity.to_string(), s.as_str()))
        .collect();

    if closed {
        (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse { status: "closing", engines }))
    } else {
        (StatusCode::OK, Json(HealthResponse { status: "ok", engines }))
    }
}
