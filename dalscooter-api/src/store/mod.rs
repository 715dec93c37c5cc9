//! Storage abstractions for the service

pub mod memory;
pub mod models;
pub mod sqlite;

pub use memory::{InMemoryBookingStore, InMemorySupportStore, InMemoryUserStore};
pub use models::*;
pub use sqlite::SqliteStore;

use dalscooter_core::{
    Booking, BookingId, Feedback, Group, MessageId, SecurityQuestion, SupportMessage,
};

use crate::error::ApiError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, ApiError>;

pub(crate) fn poisoned<T>(_: std::sync::PoisonError<T>) -> ApiError {
    ApiError::Internal("store lock poisoned".into())
}

/// Identity directory: credentials, group membership and security questions
pub trait UserStore: Send + Sync {
    /// Create an unconfirmed user; fails with `EmailAlreadyExists` on a
    /// duplicate email
    fn create_user(&self, user: &NewUser, password_hash: &str) -> StoreResult<UserId>;

    /// Mark a user as confirmed
    fn confirm_user(&self, user_id: &UserId) -> StoreResult<()>;

    /// Add a user to a group (idempotent)
    fn add_to_group(&self, user_id: &UserId, group: Group) -> StoreResult<()>;

    /// Get a user by ID
    fn get_user(&self, user_id: &UserId) -> StoreResult<Option<User>>;

    /// Get a user by email address (case-insensitive)
    fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Confirmed members of a group, ordered by email
    fn list_users_in_group(&self, group: Group) -> StoreResult<Vec<User>>;

    /// Store a user's security questions as one unit, replacing any
    /// previous set
    fn put_questions(&self, user_id: &UserId, questions: &[SecurityQuestion]) -> StoreResult<()>;

    /// Get a user's active security questions
    fn get_questions(&self, user_id: &UserId) -> StoreResult<Vec<SecurityQuestionRecord>>;
}

/// Bookings and the bike rows the booking pipeline mutates
pub trait BookingStore: Send + Sync {
    /// Insert a booking
    fn put_booking(&self, booking: &Booking) -> StoreResult<()>;

    /// Get a booking by ID
    fn get_booking(&self, booking_id: &BookingId) -> StoreResult<Option<Booking>>;

    /// Apply `change` only if `guard` holds for the stored booking
    fn update_booking_if(
        &self,
        booking_id: &BookingId,
        guard: BookingGuard,
        change: BookingChange,
    ) -> StoreResult<UpdateOutcome>;

    /// All bookings
    fn scan_bookings(&self) -> StoreResult<Vec<Booking>>;

    /// A user's bookings, latest start time first
    fn list_bookings_for_user(&self, user_id: &str) -> StoreResult<Vec<Booking>>;

    /// Insert or replace a bike
    fn put_bike(&self, bike: &Bike) -> StoreResult<()>;

    /// Get a bike by ID
    fn get_bike(&self, bike_id: &str) -> StoreResult<Option<Bike>>;

    /// All bikes, ordered by ID
    fn list_bikes(&self) -> StoreResult<Vec<Bike>>;

    /// Mark a bike unavailable under `access_code`; false if no such bike
    fn rent_bike(&self, bike_id: &str, access_code: &str) -> StoreResult<bool>;

    /// Make a bike available again, only if it still carries `access_code`
    fn release_bike(&self, bike_id: &str, access_code: &str) -> StoreResult<bool>;
}

/// Customer concerns, franchise responses and ride feedback
pub trait SupportStore: Send + Sync {
    /// Insert a concern or response
    fn put_message(&self, message: &SupportMessage) -> StoreResult<()>;

    fn get_message(&self, message_id: &MessageId) -> StoreResult<Option<SupportMessage>>;

    /// Hand a concern to `franchise_id`, only while it is still open
    fn assign_concern(&self, message_id: &MessageId, franchise_id: &str)
        -> StoreResult<MessageUpdate>;

    /// Store `response` and mark the concern it answers resolved, as one
    /// unit. `NotFound` when the response does not answer a stored concern.
    fn resolve_concern(&self, response: &SupportMessage) -> StoreResult<MessageUpdate>;

    /// A customer's concerns and the responses to them, newest first
    fn list_messages_for_user(&self, user_id: &str) -> StoreResult<Vec<SupportMessage>>;

    /// Concerns assigned to an operator and the operator's responses,
    /// newest first
    fn list_messages_for_franchise(&self, franchise_id: &str) -> StoreResult<Vec<SupportMessage>>;

    fn put_feedback(&self, feedback: &Feedback) -> StoreResult<()>;

    /// All feedback, or one bike's, newest first
    fn list_feedback(&self, bike_id: Option<&str>) -> StoreResult<Vec<Feedback>>;
}
