//! User endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use commands::AddHuman;
use domain::ObjectDetails;
use domain::user::Profile;
use projections::{SearchQuery, SearchRequest, SearchResult, TextMethod, UserColumn, UserRow};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;
use crate::routes::context;

#[derive(Deserialize)]
pub struct CreateHumanRequest {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_change_required: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListUsersParams {
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: usize,
    /// Only users of this organization.
    pub org_id: Option<String>,
    /// Case-insensitive substring of the username.
    pub username: Option<String>,
}

/// POST /orgs/{id}/users: add a human user to the organization.
#[tracing::instrument(skip(state, headers, req), fields(username = %req.username))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateHumanRequest>,
) -> Result<(StatusCode, Json<ObjectDetails>), ApiError> {
    let mut profile = Profile::new(req.first_name, req.last_name);
    if let Some(display_name) = req.display_name {
        profile = profile.display_name(display_name);
    }
    let human = AddHuman {
        username: req.username,
        profile,
        email: req.email,
        email_verified: req.email_verified,
        password: req.password,
        password_change_required: req.password_change_required,
    };
    let details = state
        .commands
        .add_human(&context(&headers), &org_id, &human)
        .await?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// GET /users
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListUsersParams>,
) -> Result<Json<SearchResult<UserRow>>, ApiError> {
    state.catch_up().await?;

    let mut queries = Vec::new();
    if let Some(org_id) = params.org_id {
        queries.push(SearchQuery::equals(UserColumn::ResourceOwner, org_id));
    }
    if let Some(username) = params.username.filter(|name| !name.is_empty()) {
        queries.push(SearchQuery::text(
            UserColumn::Username,
            TextMethod::ContainsIgnoreCase,
            username,
        ));
    }
    let request = SearchRequest::page(params.offset, params.limit);
    Ok(Json(state.queries().search_users(&queries, &request).await))
}

/// GET /users/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UserRow>, ApiError> {
    state.catch_up().await?;
    state
        .queries()
        .user_by_id(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("API-Us3rN", "Errors.User.NotFound"))
}
