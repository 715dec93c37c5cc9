//! Data models for service storage

use chrono::{DateTime, Utc};
use dalscooter_core::{Booking, Group, SecurityQuestion, SupportMessage};
use serde::{Deserialize, Serialize};

/// Opaque, stable user identifier issued by the identity directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attributes supplied at registration
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// A directory user
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub confirmed: bool,
    pub groups: Vec<Group>,
    pub created_at: DateTime<Utc>,
}

/// A stored security question
#[derive(Debug, Clone)]
pub struct SecurityQuestionRecord {
    pub user_id: UserId,
    /// "q1", "q2" or "q3"
    pub question_id: String,
    pub question_text: String,
    pub answer_hash: String,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

impl SecurityQuestionRecord {
    pub fn new(user_id: &UserId, question: &SecurityQuestion, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.clone(),
            question_id: question.question_id.clone(),
            question_text: question.text.clone(),
            answer_hash: question.answer_hash.clone(),
            created_at,
            is_active: true,
        }
    }

    pub fn to_question(&self) -> SecurityQuestion {
        SecurityQuestion {
            question_id: self.question_id.clone(),
            text: self.question_text.clone(),
            answer_hash: self.answer_hash.clone(),
        }
    }
}

/// A bike in the rental inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bike {
    pub bike_id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub bike_type: String,
    #[serde(default)]
    pub hourly_rate: f64,
    /// Available for booking
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Mirrors the active booking's code while rented
    #[serde(default)]
    pub access_code: String,
}

fn default_true() -> bool {
    true
}

impl Bike {
    pub fn is_rented(&self) -> bool {
        !self.is_active && !self.access_code.is_empty()
    }
}

/// Precondition for a conditional booking update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingGuard {
    /// No access code yet and not used
    AwaitingApproval,
    /// Not yet used (redeemed or expired)
    Unused,
}

impl BookingGuard {
    pub fn holds(&self, booking: &Booking) -> bool {
        match self {
            BookingGuard::AwaitingApproval => booking.awaiting_approval(),
            BookingGuard::Unused => !booking.is_used,
        }
    }
}

/// Mutation applied when a guard holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingChange {
    /// Set the access code and confirm the booking is unused
    AssignAccessCode(String),
    /// Mark used and clear the access code
    Expire,
}

impl BookingChange {
    pub fn apply(&self, booking: &mut Booking) {
        match self {
            BookingChange::AssignAccessCode(code) => {
                booking.access_code = code.clone();
                booking.is_used = false;
            }
            BookingChange::Expire => {
                booking.is_used = true;
                booking.access_code.clear();
            }
        }
    }
}

/// Result of a conditional booking update
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The guard held; carries the stored booking before and after the change
    Applied { before: Booking, after: Booking },
    /// The guard did not hold; carries the booking as currently stored
    GuardFailed(Booking),
    NotFound,
}

/// Result of a conditional concern update
#[derive(Debug, Clone, PartialEq)]
pub enum MessageUpdate {
    /// Carries the concern after the change
    Applied(SupportMessage),
    /// The concern was not in the required state; carries it as stored
    Unchanged(SupportMessage),
    NotFound,
}
