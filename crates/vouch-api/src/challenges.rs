use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use vouch_types::api::{
    CreateChallengeRequest, ReassignCoachRequest, UpdateStatusRequest, UserIdQuery,
};
use vouch_types::models::ChallengeId;

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;

/// GET /api/challenges?user_id=: challenges the user runs or coaches, newest first.
pub async fn list_challenges(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<UserIdQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = query.parse().map_err(ApiError::Validation)?;
    Ok(Json(state.service.list_challenges(user_id).await?))
}

pub async fn create_challenge(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateChallengeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new = req.into_new_challenge().map_err(ApiError::Validation)?;
    let challenge = state.service.create_challenge(new).await?;
    Ok((StatusCode::CREATED, Json(challenge)))
}

pub async fn update_status(
    State(state): State<AppState>,
    ApiPath(challenge_id): ApiPath<ChallengeId>,
    ApiJson(req): ApiJson<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.update_status(challenge_id, req.status).await?))
}

pub async fn reassign_coach(
    State(state): State<AppState>,
    ApiPath(challenge_id): ApiPath<ChallengeId>,
    ApiJson(req): ApiJson<ReassignCoachRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.reassign_coach(challenge_id, req.coach_id).await?))
}

pub async fn archive(
    State(state): State<AppState>,
    ApiPath(challenge_id): ApiPath<ChallengeId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.archive(challenge_id).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    ApiPath(challenge_id): ApiPath<ChallengeId>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.delete(challenge_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
