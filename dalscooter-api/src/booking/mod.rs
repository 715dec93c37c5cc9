//! Booking pipeline: submission, approval and expiry

pub mod approval;
pub mod request;
pub mod sweeper;

pub use approval::{process_approval, run_approval_worker, ApprovalOutcome};
pub use request::submit_booking;
pub use sweeper::{run_sweeper, sweep_expired_bookings, SweepFailure, SweepReport};
