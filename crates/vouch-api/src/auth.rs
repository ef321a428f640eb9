use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use vouch_types::api::{LoginRequest, RegisterRequest, UserIdQuery, UsernameResponse};

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::state::AppState;

/// POST /api/register
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.service.register(&req.username, &req.password).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/login: `{id, username}` on success, 401 otherwise.
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.service.authenticate(&req.username, &req.password).await?;
    Ok(Json(user))
}

/// GET /api/users: ordered by username.
pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.list_users().await?))
}

/// GET /api/users/username?user_id=
pub async fn get_username(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<UserIdQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = query.parse().map_err(ApiError::Validation)?;
    let username = state.service.username_by_id(user_id).await?;
    Ok(Json(UsernameResponse { username }))
}
