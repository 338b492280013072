use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::ControlError;

/// Maps the control-core error taxonomy onto HTTP responses.
#[derive(Debug)]
pub enum AppError {
    Control(ControlError),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Control(ControlError::Validation(m)) => {
                (StatusCode::BAD_REQUEST, m.clone())
            }
            AppError::Control(ControlError::InvalidThreshold(m)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, m.clone())
            }
            AppError::Control(e @ ControlError::Conflict { .. }) => {
                (StatusCode::CONFLICT, e.to_string())
            }
            AppError::Control(e @ ControlError::StoreUnavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
            AppError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ControlError> for AppError {
    fn from(e: ControlError) -> Self {
        Self::Control(e)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        Self::Control(ControlError::StoreUnavailable(e))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e)
    }
}
