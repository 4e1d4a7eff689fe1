use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use super::dto::ErrorResponse;
use crate::config::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    ValidationFailed,
    ReloadFailed,
    Unauthorized,
    Forbidden,
    Conflict,
    ShuttingDown,
    CommandTimeout,
    NotFound,
    Internal,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("configuration failed validation")]
    Validation(Vec<ValidationError>),
    #[error("{0}")]
    ReloadFailed(String),
    #[error("missing or invalid bearer token")]
    Unauthorized,
    #[error("token does not authorize this operation")]
    Forbidden,
    #[error("a reload is already in progress")]
    Conflict,
    #[error("the supervisor is shutting down and is not accepting new commands")]
    ShuttingDown,
    #[error("the supervisor did not reply before the command timed out; it is still running")]
    CommandTimeout,
    #[error("{0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn code(&self) -> ApiErrorCode {
        match self {
            ApiError::Validation(_) => ApiErrorCode::ValidationFailed,
            ApiError::ReloadFailed(_) => ApiErrorCode::ReloadFailed,
            ApiError::Unauthorized => ApiErrorCode::Unauthorized,
            ApiError::Forbidden => ApiErrorCode::Forbidden,
            ApiError::Conflict => ApiErrorCode::Conflict,
            ApiError::ShuttingDown => ApiErrorCode::ShuttingDown,
            ApiError::CommandTimeout => ApiErrorCode::CommandTimeout,
            ApiError::NotFound(_) => ApiErrorCode::NotFound,
            ApiError::Internal(_) => ApiErrorCode::Internal,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::ReloadFailed(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::CommandTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::Validation(details) => ErrorResponse::validation(self.code(), details.clone()),
            other => ErrorResponse::message(other.code(), other.to_string()),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

impl From<crate::api::client::ClientError> for ApiError {
    fn from(err: crate::api::client::ClientError) -> Self {
        match err {
            crate::api::client::ClientError::ActorGone => ApiError::ShuttingDown,
            crate::api::client::ClientError::Timeout => ApiError::CommandTimeout,
        }
    }
}
