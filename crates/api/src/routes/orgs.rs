//! Organization endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use domain::ObjectDetails;
use projections::{OrgColumn, OrgRow, SearchQuery, SearchRequest, SearchResult, TextMethod};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;
use crate::routes::context;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrgRequest {
    pub name: String,
    pub owner_user_id: String,
    /// Organization of the owner; defaults to the new organization itself.
    #[serde(default)]
    pub owner_resource_owner: Option<String>,
}

#[derive(Deserialize)]
pub struct RenameOrgRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ListOrgsParams {
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: usize,
    /// Case-insensitive substring of the name.
    pub name: Option<String>,
    pub sort: Option<OrgColumn>,
    #[serde(default = "ascending")]
    pub asc: bool,
}

fn ascending() -> bool {
    true
}

// -- Handlers --

/// POST /orgs: create an organization owned by `owner_user_id`.
#[tracing::instrument(skip(state, headers, req), fields(name = %req.name))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateOrgRequest>,
) -> Result<(StatusCode, Json<ObjectDetails>), ApiError> {
    let ctx = context(&headers);
    let org_id = common::AggregateId::new();
    let owner_resource_owner = req
        .owner_resource_owner
        .unwrap_or_else(|| org_id.to_string());
    let details = state
        .commands
        .add_org_with_id(
            &ctx,
            org_id.as_str(),
            &req.name,
            &req.owner_user_id,
            &owner_resource_owner,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// GET /orgs: one page of organizations.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListOrgsParams>,
) -> Result<Json<SearchResult<OrgRow>>, ApiError> {
    state.catch_up().await?;

    let mut queries = Vec::new();
    if let Some(name) = params.name.filter(|name| !name.is_empty()) {
        queries.push(SearchQuery::text(
            OrgColumn::Name,
            TextMethod::ContainsIgnoreCase,
            name,
        ));
    }
    let mut request = SearchRequest::page(params.offset, params.limit);
    if let Some(column) = params.sort {
        request = request.sorted_by(column, params.asc);
    }
    Ok(Json(state.queries().search_orgs(&queries, &request).await))
}

/// GET /orgs/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrgRow>, ApiError> {
    state.catch_up().await?;
    state
        .queries()
        .org_by_id(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("API-0rgNf", "Errors.Org.NotFound"))
}

/// PUT /orgs/{id}: rename the organization.
#[tracing::instrument(skip(state, headers, req))]
pub async fn rename(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<RenameOrgRequest>,
) -> Result<Json<ObjectDetails>, ApiError> {
    let details = state
        .commands
        .change_org(&context(&headers), &id, &req.name)
        .await?;
    Ok(Json(details))
}

/// POST /orgs/{id}/deactivate
#[tracing::instrument(skip(state, headers))]
pub async fn deactivate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ObjectDetails>, ApiError> {
    let details = state
        .commands
        .deactivate_org(&context(&headers), &id)
        .await?;
    Ok(Json(details))
}

/// POST /orgs/{id}/reactivate
#[tracing::instrument(skip(state, headers))]
pub async fn reactivate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ObjectDetails>, ApiError> {
    let details = state
        .commands
        .reactivate_org(&context(&headers), &id)
        .await?;
    Ok(Json(details))
}

/// DELETE /orgs/{id}: remove the organization and release its users' names.
#[tracing::instrument(skip(state, headers))]
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ObjectDetails>, ApiError> {
    let details = state.commands.remove_org(&context(&headers), &id).await?;
    Ok(Json(details))
}
