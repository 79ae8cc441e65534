use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use uuid::Uuid;

use crate::models::response::ApiResponse;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Broker connection failed: {0}")]
    Connection(String),

    #[error("Failed to publish message to '{queue}': {reason}")]
    Publish { queue: String, reason: String },

    #[error("Broker rejected message published to '{0}'")]
    Nacked(String),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Trace id {0} already exists")]
    DuplicateTraceId(Uuid),

    #[error("Trace id must not be nil")]
    NilTraceId,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Invalid notification request",
            ),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "Notification not found"),
            AppError::Broker(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Message broker unavailable, notification not accepted",
            ),
            AppError::Store(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to record notification status",
            ),
        };

        let body = ApiResponse::error(self.to_string(), message.to_string());
        (status, Json(body)).into_response()
    }
}
