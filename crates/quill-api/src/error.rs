use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use quill_ai::AiError;

/// Request-level failure taxonomy. Responses carry the same
/// `{ "error": ..., "message": ... }` JSON body for every variant.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    /// AI provider failure on the non-streaming path. Streaming failures
    /// never reach this type: the response is already committed, so they
    /// go out as in-band `error` events instead.
    #[error(transparent)]
    Upstream(#[from] AiError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(anyhow::Error::new(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, label, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "Invalid request", msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "Unauthorized", (*msg).to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", (*msg).to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", (*msg).to_string()),
            ApiError::Upstream(e) => {
                error!("upstream AI failure: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "Upstream error",
                    "AI provider request failed".to_string(),
                )
            }
            ApiError::Internal(e) => {
                error!("internal error: {e:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    "Something went wrong".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": label, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_the_taxonomy() {
        let cases = [
            (ApiError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (ApiError::Unauthorized("no"), StatusCode::UNAUTHORIZED),
            (ApiError::NotFound("gone"), StatusCode::NOT_FOUND),
            (ApiError::Conflict("dup"), StatusCode::CONFLICT),
            (ApiError::Upstream(AiError::MissingApiKey), StatusCode::BAD_GATEWAY),
            (ApiError::Internal(anyhow::anyhow!("boom")), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
