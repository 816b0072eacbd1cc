use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::storage::StorageError;

/// Domain errors surfaced by the word bank and quiz session services.
///
/// Every variant maps to a distinct, stable `error` kind in the JSON body so
/// clients can tell "unknown session" from "nothing left to pick" from
/// "input rejected".
#[derive(Debug, Error)]
pub enum QuizError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Storage(StorageError),
}

impl QuizError {
    pub fn not_found(message: impl Into<String>) -> Self {
        QuizError::NotFound(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        QuizError::InvalidState(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        QuizError::Validation(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QuizError::NotFound(_) => "not_found",
            QuizError::InvalidState(_) => "invalid_state",
            QuizError::Validation(_) => "validation_error",
            QuizError::Storage(_) => "storage_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            QuizError::NotFound(_) => StatusCode::NOT_FOUND,
            QuizError::InvalidState(_) => StatusCode::BAD_REQUEST,
            QuizError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            QuizError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StorageError> for QuizError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => QuizError::NotFound(format!("{} not found", what)),
            StorageError::Conflict(message) => QuizError::Validation(message),
            other => QuizError::Storage(other),
        }
    }
}

impl From<validator::ValidationErrors> for QuizError {
    fn from(err: validator::ValidationErrors) -> Self {
        QuizError::Validation(err.to_string())
    }
}

impl IntoResponse for QuizError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", self.kind(), self);
        }
        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
