use axum::{Json, extract::State, response::IntoResponse};

use vouch_types::api::UserIdQuery;
use vouch_types::models::NotificationId;

use crate::error::ApiError;
use crate::extract::{ApiPath, ApiQuery};
use crate::state::AppState;

pub async fn list_notifications(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<UserIdQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = query.parse().map_err(ApiError::Validation)?;
    Ok(Json(state.service.notifications(user_id).await?))
}

pub async fn mark_read(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<NotificationId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.mark_notification_read(id).await?))
}
