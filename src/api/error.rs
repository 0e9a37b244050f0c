//! HTTP mapping of service errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::error::PresenceError;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "roomsense::api";

use crate::{log_error, log_warn};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Presence(#[from] PresenceError),

    /// Missing credentials or an identity with no user row.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Presence(err) => match err {
                PresenceError::Validation(_) => StatusCode::BAD_REQUEST,
                PresenceError::NotFound { .. } | PresenceError::RoomUndetermined => {
                    StatusCode::NOT_FOUND
                }
                PresenceError::Upstream { .. } => StatusCode::BAD_GATEWAY,
                PresenceError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Presence(err) => match err {
                PresenceError::Validation(_) => "VALIDATION_ERROR",
                PresenceError::NotFound { .. } => "NOT_FOUND",
                PresenceError::RoomUndetermined => "ROOM_UNDETERMINED",
                PresenceError::Upstream { .. } => "UPSTREAM_ERROR",
                PresenceError::Persistence(_) => "PERSISTENCE_ERROR",
            },
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log_error!("request failed: {:#}", self);
        } else {
            log_warn!("request rejected: {}", self);
        }

        let body = ErrorResponse {
            code: self.error_code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_taxonomy_to_status() {
        let cases = [
            (ApiError::from(PresenceError::validation("bad row")), StatusCode::BAD_REQUEST),
            (ApiError::from(PresenceError::RoomUndetermined), StatusCode::NOT_FOUND),
            (ApiError::from(PresenceError::user_not_found("zed")), StatusCode::NOT_FOUND),
            (
                ApiError::from(PresenceError::upstream("estimation", "timeout")),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ApiError::from(PresenceError::from(anyhow::anyhow!("disk full"))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::Unauthorized("no user".into()), StatusCode::UNAUTHORIZED),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err}");
        }
    }

    #[test]
    fn body_carries_code_and_message() {
        let response = ApiError::from(PresenceError::RoomUndetermined).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
