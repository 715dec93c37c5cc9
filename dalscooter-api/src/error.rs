//! Service error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("User not found")]
    UserNotFound,

    #[error("Booking not found")]
    BookingNotFound,

    #[error("Bike not found")]
    BikeNotFound,

    #[error("Message not found")]
    MessageNotFound,

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Forbidden")]
    Forbidden,

    #[error("Password too short (minimum 8 characters)")]
    PasswordTooShort,

    #[error("Password too long (maximum 80 characters)")]
    PasswordTooLong,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Dependency failures the caller may retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::QueueUnavailable(_) | ApiError::Internal(_))
    }
}

impl From<dalscooter_core::Error> for ApiError {
    fn from(err: dalscooter_core::Error) -> Self {
        use dalscooter_core::Error as CoreError;
        match err {
            CoreError::MissingField(field) => {
                ApiError::ValidationError(format!("Missing required field: {}", field))
            }
            CoreError::InvalidBooking(msg) => ApiError::ValidationError(msg),
            err @ CoreError::Unrecognized { .. } => ApiError::ValidationError(err.to_string()),
            CoreError::InvalidToken(_)
            | CoreError::TokenExpired
            | CoreError::UnknownSigningKey(_)
            | CoreError::Jwt(_) => ApiError::NotAuthenticated,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::UserNotFound => (StatusCode::NOT_FOUND, "User not found"),
            ApiError::BookingNotFound => (StatusCode::NOT_FOUND, "Booking not found"),
            ApiError::BikeNotFound => (StatusCode::NOT_FOUND, "Bike not found"),
            ApiError::MessageNotFound => (StatusCode::NOT_FOUND, "Message not found"),
            ApiError::EmailAlreadyExists => (StatusCode::CONFLICT, "Email already exists"),
            ApiError::NotAuthenticated => (StatusCode::UNAUTHORIZED, "Not authenticated"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden"),
            ApiError::PasswordTooShort => {
                (StatusCode::BAD_REQUEST, "Password too short (minimum 8 characters)")
            }
            ApiError::PasswordTooLong => {
                (StatusCode::BAD_REQUEST, "Password too long (maximum 80 characters)")
            }
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            ApiError::QueueUnavailable(msg) => {
                tracing::error!("Queue unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Request failed, please retry")
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({
            "success": false,
            "reason": message,
            "retryable": self.is_retryable(),
        });
        (status, axum::Json(body)).into_response()
    }
}
