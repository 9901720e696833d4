//! Liveness of the server and reachability of the event store.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use event_store::{EventStore, Position};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Head of the event log; absent when the store is unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_position: Option<Position>,
}

/// GET /health: 200 while the store answers, 503 otherwise.
pub async fn check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    match state.store.latest_position().await {
        Ok(position) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                latest_position: Some(position),
            }),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "event store unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                    latest_position: None,
                }),
            )
        }
    }
}
