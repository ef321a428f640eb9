use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use vouch_db::StoreError;
use vouch_types::api::ErrorBody;

/// Every failure a handler can return. Store errors are mapped here and never
/// reach the client verbatim.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input
    #[error("{0}")]
    Validation(String),

    /// A referenced user or challenge does not exist (checked before writing)
    #[error("{0}")]
    InvalidReference(String),

    /// The store rejected a dangling foreign key
    #[error("referential integrity violation: {0}")]
    ReferentialIntegrity(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid username or password")]
    Authentication,

    #[error("{0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Store(#[source] StoreError),

    #[error("store call timed out")]
    Timeout,

    #[error("{0}")]
    Upload(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidReference(_) | Self::Upload(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            Self::ReferentialIntegrity(_) | Self::Store(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Text placed in the `{error}` body.
    fn public_message(&self) -> String {
        match self {
            Self::ReferentialIntegrity(_) => "Referenced record does not exist".into(),
            Self::Store(_) | Self::Internal(_) => "Internal server error".into(),
            Self::Timeout => "The store did not answer in time, try again".into(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{} {} not found", capitalize(entity), id)),
            StoreError::ReferentialIntegrity(detail) => Self::ReferentialIntegrity(detail),
            StoreError::Conflict(detail) => Self::Conflict(detail),
            other => Self::Store(other),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        }
        let body = ErrorBody {
            error: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_http_statuses() {
        let not_found: ApiError = StoreError::not_found("challenge", 4).into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.to_string(), "Challenge 4 not found");

        let fk: ApiError = StoreError::ReferentialIntegrity("FOREIGN KEY constraint failed".into()).into();
        assert_eq!(fk.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fk.public_message(), "Referenced record does not exist");

        let poisoned: ApiError = StoreError::LockPoisoned.into();
        assert_eq!(poisoned.public_message(), "Internal server error");
    }

    #[test]
    fn client_errors_keep_their_message() {
        let err = ApiError::Validation("Missing required fields: title".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "Missing required fields: title");
        assert_eq!(ApiError::Authentication.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Upload("too big".into()).status(), StatusCode::BAD_REQUEST);
    }
}
