//! Error types for DalScooter domain rules

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("No security questions found for user {user_id}")]
    NoQuestionsFound { user_id: String },

    #[error("No challenge defined for factor index {0}")]
    NoSuchFactor(usize),

    #[error("Invalid cipher shift: {0} (must be 1-25)")]
    InvalidShift(u8),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Unrecognized {kind}: {value}")]
    Unrecognized { kind: &'static str, value: String },

    #[error("Invalid booking: {0}")]
    InvalidBooking(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Unknown signing key: {0}")]
    UnknownSigningKey(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}
