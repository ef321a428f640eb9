use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use vouch_types::api::{
    MESSAGES_REVISION_HEADER, MarkReadRequest, PostMessageRequest, PostMessageResponse,
    SetProofRequest, ValidateMessageRequest,
};
use vouch_types::models::{ChallengeId, MessageId, MessageSnapshot};

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::state::AppState;

fn revision_header(snapshot: &MessageSnapshot) -> [(&'static str, String); 1] {
    [(MESSAGES_REVISION_HEADER, snapshot.revision.to_string())]
}

/// Every full list goes out with its revision in a header.
fn snapshot_response(snapshot: MessageSnapshot) -> impl IntoResponse {
    (revision_header(&snapshot), Json(snapshot.messages))
}

pub async fn get_messages(
    State(state): State<AppState>,
    ApiPath(challenge_id): ApiPath<ChallengeId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(snapshot_response(
        state.service.list_messages(challenge_id).await?,
    ))
}

/// POST /api/challenges/{id}/messages: responds with the new message and
/// the full list; the same list goes to the challenge's room.
pub async fn send_message(
    State(state): State<AppState>,
    ApiPath(challenge_id): ApiPath<ChallengeId>,
    ApiJson(req): ApiJson<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new = req
        .into_new_message(challenge_id)
        .map_err(ApiError::Validation)?;
    let (message, snapshot) = state.service.post_message(new).await?;

    Ok((
        StatusCode::CREATED,
        revision_header(&snapshot),
        Json(PostMessageResponse {
            success: true,
            message,
            messages: snapshot.messages,
        }),
    ))
}

pub async fn validate_message(
    State(state): State<AppState>,
    ApiPath(message_id): ApiPath<MessageId>,
    ApiJson(req): ApiJson<ValidateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.validate(message_id, req.is_validated).await?))
}

pub async fn set_proof(
    State(state): State<AppState>,
    ApiPath(message_id): ApiPath<MessageId>,
    ApiJson(req): ApiJson<SetProofRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.set_proof(message_id, req.is_proof).await?))
}

pub async fn mark_read(
    State(state): State<AppState>,
    ApiPath(challenge_id): ApiPath<ChallengeId>,
    ApiJson(req): ApiJson<MarkReadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(snapshot_response(
        state.service.mark_read(challenge_id, req.user_id).await?,
    ))
}
