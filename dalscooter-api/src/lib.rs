//! DalScooter API
//!
//! HTTP service for the scooter-rental backend: registration, the identity
//! provider's custom-authentication triggers, bike inventory, the booking
//! request / approval / expiry pipeline, customer concerns and ride
//! feedback.

pub mod auth;
pub mod booking;
pub mod config;
pub mod crypto;
pub mod email;
pub mod error;
pub mod queue;
pub mod routes;
pub mod state;
pub mod store;
pub mod support;
pub mod triggers;

pub use booking::{
    process_approval, run_approval_worker, run_sweeper, submit_booking, sweep_expired_bookings,
    ApprovalOutcome, SweepReport,
};
pub use config::Config;
pub use email::{ConsoleEmailSender, EmailMessage, EmailSender, SmtpConfig, SmtpEmailSender};
pub use error::ApiError;
pub use queue::{ChannelQueue, QueueMessage, QueueReceiver, QueueReceivers, Queues, WorkQueue};
pub use state::AppState;
pub use store::{
    Bike, BookingStore, InMemoryBookingStore, InMemorySupportStore, InMemoryUserStore, NewUser,
    SqliteStore, SupportStore, UserStore,
};
pub use support::{
    process_concern, respond_to_concern, run_concern_worker, submit_concern, submit_feedback,
    ConcernOutcome, LexiconSentiment, SentimentAnalyzer,
};
