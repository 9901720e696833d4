//! Public signing keys, served through the verification key cache.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use projections::PublicKeyRow;

use crate::AppState;
use crate::error::ApiError;

/// GET /keys/{id}: the public half of an unexpired signing key.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PublicKeyRow>, ApiError> {
    state.catch_up().await?;
    state
        .public_keys
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("API-K3yNf", "Errors.Key.NotFound"))
}
