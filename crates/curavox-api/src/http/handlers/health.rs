//! Service info and health endpoints.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::state::AppState;

/// `GET /` -- service identification.
pub async fn root() -> Json<Value> {
    Json(json!({
        "name": "Curavox API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

/// `GET /health` -- liveness plus the number of active sessions.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "active_sessions": state.registry.len(),
    }))
}
