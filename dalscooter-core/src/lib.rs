//! DalScooter Core Library
//!
//! Domain rules for the scooter-rental backend:
//! - The custom authentication challenge (security question, then Caesar
//!   cipher) driven by the identity provider
//! - Booking records and their request/approve/expire lifecycle
//! - Verification of identity-provider bearer tokens
//! - Customer concerns, franchise responses and ride feedback

pub mod answer;
pub mod booking;
pub mod challenge;
pub mod cipher;
pub mod concern;
pub mod error;
pub mod feedback;
pub mod token;

pub use answer::hash_answer;
pub use booking::{generate_access_code, Booking, BookingId, BookingRequest, BookingStatus};
pub use challenge::{
    define_next_step, verify_answer, Challenge, ChallengeKind, ChallengeParameters, NextStep,
    PrivateChallenge, PublicChallenge, SecurityQuestion, Verification, VerifyFailure,
};
pub use concern::{
    pick_operator, ConcernRequest, MessageId, MessageKind, MessageStatus, SupportMessage,
};
pub use error::Error;
pub use feedback::{Feedback, FeedbackRequest, Polarity};
pub use token::{AuthContext, Group, JwksVerifier, SharedSecretVerifier, TokenVerifier};

/// Result type for dalscooter-core operations
pub type Result<T> = std::result::Result<T, Error>;
