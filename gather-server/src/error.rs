use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rusqlite::ErrorCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

/// Every failure the chat subsystem reports, REST and real-time alike.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// Store timeout or temporary unavailability.
    #[error("store unavailable: {0}")]
    Transient(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type ChatResult<T> = Result<T, ChatError>;

/// Error envelope returned to clients: `{ "msg": "..." }`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub msg: String,
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ChatError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ChatError::Forbidden(_) => StatusCode::FORBIDDEN,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Conflict(_) => StatusCode::CONFLICT,
            ChatError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ChatError::Transient(_))
    }

    /// Message safe to show a client. Store internals never leak.
    pub fn client_message(&self) -> String {
        match self {
            ChatError::Transient(_) => "Service temporarily unavailable, try again.".to_string(),
            ChatError::Internal(_) => "Server Error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<rusqlite::Error> for ChatError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    ChatError::Transient(err.to_string())
                }
                ErrorCode::ConstraintViolation => ChatError::Conflict(err.to_string()),
                _ => ChatError::Internal(err.to_string()),
            },
            _ => ChatError::Internal(err.to_string()),
        }
    }
}

impl From<garde::Report> for ChatError {
    fn from(report: garde::Report) -> Self {
        ChatError::InvalidArgument(report.to_string())
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        if matches!(self, ChatError::Internal(_)) {
            error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            msg: self.client_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}
