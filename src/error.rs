use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::order::OrderStatus;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("illegal transition from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    #[error("driver unavailable: {0}")]
    DriverUnavailable(String),

    #[error("stale location sample")]
    StaleLocation,

    #[error("consistency failure: {0}")]
    ConsistencyFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::IllegalTransition { .. } => "illegal_transition",
            AppError::DriverUnavailable(_) => "driver_unavailable",
            AppError::StaleLocation => "stale_location",
            AppError::ConsistencyFailure(_) => "consistency_failure",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConsistencyFailure(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::IllegalTransition { .. } => (
                StatusCode::CONFLICT,
                "this order cannot be updated to that status from its current state".to_string(),
            ),
            AppError::DriverUnavailable(_) => (
                StatusCode::CONFLICT,
                "driver no longer available, choose another".to_string(),
            ),
            AppError::StaleLocation => (StatusCode::OK, "stale location sample ignored".to_string()),
            AppError::ConsistencyFailure(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message,
            "kind": self.kind(),
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}

impl From<AppError> for tonic::Status {
    fn from(err: AppError) -> Self {
        let message = err.to_string();
        match err {
            AppError::NotFound(_) => tonic::Status::not_found(message),
            AppError::BadRequest(_) => tonic::Status::invalid_argument(message),
            AppError::IllegalTransition { .. } | AppError::DriverUnavailable(_) => {
                tonic::Status::failed_precondition(message)
            }
            AppError::StaleLocation => tonic::Status::already_exists(message),
            AppError::ConsistencyFailure(_) => tonic::Status::unavailable(message),
            AppError::Internal(_) => tonic::Status::internal(message),
        }
    }
}
