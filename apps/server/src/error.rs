use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use spa_core::{BookingError, ErrorCategory};

use crate::models::ApiResponse;

/// Handler error rendered as an `ApiResponse` with a matching status code.
#[derive(Debug)]
pub enum ApiError {
    Booking(BookingError),
    /// Missing or malformed identity header.
    Unauthorized(&'static str),
    Forbidden(&'static str),
    NotFound(String),
}

impl From<BookingError> for ApiError {
    fn from(e: BookingError) -> Self {
        ApiError::Booking(e)
    }
}

fn booking_status(e: &BookingError) -> StatusCode {
    if e.is_not_found() {
        return StatusCode::NOT_FOUND;
    }
    match e.category() {
        ErrorCategory::Recoverable => StatusCode::CONFLICT,
        ErrorCategory::Terminal => StatusCode::FORBIDDEN,
        ErrorCategory::UserCorrectable => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCategory::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Booking(e) => {
                let status = booking_status(&e);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!("request failed: {}", e);
                    (status, "Internal error".to_string())
                } else {
                    (status, e.to_string())
                }
            }
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.to_string()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };
        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}
