// src/error.rs
use crate::models::auth::ErrorResponse;
use crate::relay::provider::ProviderError;
use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Not found")]
    NotFound,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Completion provider failure: {0}")]
    ProviderFailure(String),
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound,
            StoreError::Duplicate(what) => AppError::Conflict(what),
            other => AppError::PersistenceFailure(other.to_string()),
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        AppError::ProviderFailure(err.to_string())
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ProviderFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::PersistenceFailure(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown to callers. Server-side failures stay generic.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Unauthorized => "Unauthorized".to_string(),
            AppError::InvalidCredentials => "Invalid email or password".to_string(),
            AppError::NotFound => "Not found".to_string(),
            AppError::InvalidInput(msg) | AppError::Conflict(msg) => msg.clone(),
            AppError::ProviderFailure(_) => "The assistant is unavailable right now".to_string(),
            AppError::PersistenceFailure(_) | AppError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = %status.as_u16(), "request failed");
        }

        (
            status,
            Json(ErrorResponse {
                success: false,
                message: self.public_message(),
            }),
        )
            .into_response()
    }
}
