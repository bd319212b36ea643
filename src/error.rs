use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::protocol::ErrorBody;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("{0}")]
    Validation(String),

    #[error("Daily review limit reached ({reviews_today}/{limit}). Try again tomorrow.")]
    RateLimitExceeded { reviews_today: u32, limit: u32 },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Failed to create review: {0}")]
    WriteFailure(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl ReviewError {
    pub fn status(&self) -> StatusCode {
        match self {
            ReviewError::Validation(_) => StatusCode::BAD_REQUEST,
            ReviewError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ReviewError::NotFound(_) => StatusCode::NOT_FOUND,
            ReviewError::StorageUnavailable(_) | ReviewError::WriteFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ReviewError {
    fn into_response(self) -> Response {
        let status = self.status();
        let reviews_today = match &self {
            ReviewError::RateLimitExceeded { reviews_today, .. } => Some(*reviews_today),
            _ => None,
        };
        let body = ErrorBody {
            success: false,
            message: self.to_string(),
            reviews_today,
        };
        (status, Json(body)).into_response()
    }
}
