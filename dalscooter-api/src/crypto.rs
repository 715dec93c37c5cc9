//! Password hashing and identifier generation

use dalscooter_core::{BookingId, MessageId};

/// Default bcrypt cost factor
pub const BCRYPT_COST: u32 = 12;

/// Hash a password with bcrypt
pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, BCRYPT_COST)
}

/// Generate a fresh booking identifier
pub fn generate_booking_id() -> BookingId {
    BookingId(uuid::Uuid::new_v4().to_string())
}

/// Generate a fresh concern or response identifier
pub fn generate_message_id() -> MessageId {
    MessageId(uuid::Uuid::new_v4().to_string())
}

pub fn generate_feedback_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
