//! Read access to the raw event log.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use common::AggregateId;
use event_store::{EventEnvelope, EventQuery, EventStore, Position};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

/// Page size when the request names none.
const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Default, Deserialize)]
pub struct ListEventsParams {
    pub aggregate_type: Option<String>,
    pub aggregate_id: Option<String>,
    pub resource_owner: Option<String>,
    pub event_type: Option<String>,
    /// Only events after this global position.
    pub after_position: Option<i64>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListEventsParams {
    fn into_query(self) -> Result<EventQuery, ApiError> {
        let mut query = EventQuery::new();
        if let Some(aggregate_type) = self.aggregate_type {
            query = query.aggregate_type(aggregate_type);
        }
        if let Some(id) = self.aggregate_id {
            query = query.aggregate_id(AggregateId::from(id));
        }
        if let Some(owner) = self.resource_owner {
            query = query.resource_owner(AggregateId::from(owner));
        }
        if let Some(event_type) = self.event_type {
            query = query.event_type(event_type);
        }
        if let Some(position) = self.after_position {
            if position < 0 {
                return Err(ApiError::BadRequest(format!(
                    "after_position must not be negative, got {position}"
                )));
            }
            query = query.after_position(Position::new(position));
        }
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        query = query.limit(limit);
        if let Some(offset) = self.offset {
            query = query.offset(offset);
        }
        Ok(query)
    }
}

/// GET /events: committed events in global order.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListEventsParams>,
) -> Result<Json<Vec<EventEnvelope>>, ApiError> {
    let query = params.into_query()?;
    let events = state.store.filter(query).await?;
    Ok(Json(events))
}
