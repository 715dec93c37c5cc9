//! Approval worker: issues access codes for queued bookings

use std::sync::Arc;

use chrono::Utc;
use dalscooter_core::{generate_access_code, Booking, BookingId};

use crate::email::{send_best_effort, templates, EmailSender};
use crate::error::ApiError;
use crate::queue::QueueReceiver;
use crate::state::AppState;
use crate::store::{BookingChange, BookingGuard, BookingStore, UpdateOutcome, UserId, UserStore};

/// Deliveries of one message before it is dropped
pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;

/// What processing one queue message did
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalOutcome {
    /// An access code was issued
    Approved {
        access_code: String,
        bike_marked: bool,
        notified: bool,
    },
    /// The booking already had a code; nothing changed
    Duplicate,
    /// The booking was used or expired before approval
    Closed,
    /// No such booking; the message is dropped
    NotFound,
}

/// Approve one booking
///
/// Safe to call again for the same booking: the access code is written
/// with a conditional update, so only one delivery ever issues a code or
/// sends a confirmation. Bike and email failures are logged and never undo
/// the approval. A booking whose window has passed is closed rather than
/// approved, and if it expires while the bike is being marked the bike is
/// released again. Store failures while reading or writing the booking are
/// returned so the message can be redelivered.
pub fn process_approval<U, B, E>(
    user_store: &U,
    booking_store: &B,
    email_sender: &E,
    booking_id: &BookingId,
) -> Result<ApprovalOutcome, ApiError>
where
    U: UserStore + ?Sized,
    B: BookingStore + ?Sized,
    E: EmailSender + ?Sized,
{
    let Some(booking) = booking_store.get_booking(booking_id)? else {
        tracing::warn!(booking_id = %booking_id, "Booking not found; dropping approval message");
        return Ok(ApprovalOutcome::NotFound);
    };

    if !booking.awaiting_approval() {
        return Ok(skipped(&booking));
    }
    if booking.is_expired_at(Utc::now()) {
        tracing::info!(booking_id = %booking_id, "Booking window passed before approval; skipping");
        return Ok(ApprovalOutcome::Closed);
    }

    let code = generate_access_code();
    let booking = match booking_store.update_booking_if(
        booking_id,
        BookingGuard::AwaitingApproval,
        BookingChange::AssignAccessCode(code.clone()),
    )? {
        UpdateOutcome::Applied { after, .. } => after,
        UpdateOutcome::GuardFailed(current) => return Ok(skipped(&current)),
        UpdateOutcome::NotFound => {
            tracing::warn!(booking_id = %booking_id, "Booking vanished during approval");
            return Ok(ApprovalOutcome::NotFound);
        }
    };

    tracing::info!(booking_id = %booking_id, bike_id = %booking.bike_id, "Booking approved");
    tracing::debug!(booking_id = %booking_id, access_code = %code, "Issued access code");

    let bike_marked = match booking_store.rent_bike(&booking.bike_id, &code) {
        Ok(true) => true,
        Ok(false) => {
            tracing::warn!(booking_id = %booking_id, bike_id = %booking.bike_id, "Bike not in inventory");
            false
        }
        Err(e) => {
            tracing::warn!(booking_id = %booking_id, bike_id = %booking.bike_id, error = %e, "Could not mark bike rented");
            false
        }
    };

    // The sweeper may have retired the code before the bike was marked
    if bike_marked && code_retired(booking_store, &booking, &code) {
        tracing::info!(booking_id = %booking_id, "Booking expired during approval; releasing bike");
        if let Err(e) = booking_store.release_bike(&booking.bike_id, &code) {
            tracing::warn!(booking_id = %booking_id, bike_id = %booking.bike_id, error = %e, "Could not release bike");
        }
        return Ok(ApprovalOutcome::Closed);
    }

    let notified = notify_rider(user_store, email_sender, &booking);

    Ok(ApprovalOutcome::Approved {
        access_code: code,
        bike_marked,
        notified,
    })
}

fn code_retired<B>(booking_store: &B, booking: &Booking, code: &str) -> bool
where
    B: BookingStore + ?Sized,
{
    match booking_store.get_booking(&booking.booking_id) {
        Ok(Some(current)) => current.access_code != code,
        Ok(None) => true,
        Err(e) => {
            tracing::warn!(booking_id = %booking.booking_id, error = %e, "Could not re-read booking after approval");
            false
        }
    }
}

fn skipped(booking: &Booking) -> ApprovalOutcome {
    if booking.access_code.is_empty() {
        tracing::info!(booking_id = %booking.booking_id, "Booking closed before approval; skipping");
        ApprovalOutcome::Closed
    } else {
        tracing::info!(booking_id = %booking.booking_id, "Duplicate approval delivery; skipping");
        ApprovalOutcome::Duplicate
    }
}

fn notify_rider<U, E>(user_store: &U, email_sender: &E, booking: &Booking) -> bool
where
    U: UserStore + ?Sized,
    E: EmailSender + ?Sized,
{
    let user = match user_store.get_user(&UserId(booking.user_id.clone())) {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!(booking_id = %booking.booking_id, user_id = %booking.user_id, "No user to notify");
            return false;
        }
        Err(e) => {
            tracing::warn!(booking_id = %booking.booking_id, error = %e, "Could not look up rider");
            return false;
        }
    };

    send_best_effort(email_sender, &templates::booking_confirmation(&user.email, booking))
}

/// Consume the approval queue until every producer is gone
pub async fn run_approval_worker<U, B, E>(
    state: Arc<AppState<U, B, E>>,
    mut receiver: QueueReceiver<BookingId>,
)
where
    U: UserStore + 'static,
    B: BookingStore + 'static,
    E: EmailSender + 'static,
{
    tracing::info!("Approval worker started");

    while let Some(batch) = receiver.recv_batch().await {
        tracing::debug!(messages = batch.len(), "Processing approval batch");

        for message in batch {
            let task_state = state.clone();
            let booking_id = message.payload.clone();
            // Stores and SMTP are blocking
            let result = tokio::task::spawn_blocking(move || {
                process_approval(
                    &task_state.user_store,
                    &task_state.booking_store,
                    &task_state.email_sender,
                    &booking_id,
                )
            })
            .await;

            match result {
                Ok(Ok(outcome)) => {
                    tracing::debug!(booking_id = %message.payload, ?outcome, "Approval message handled")
                }
                Ok(Err(e)) if e.is_retryable() && message.attempts + 1 < MAX_DELIVERY_ATTEMPTS => {
                    tracing::warn!(
                        booking_id = %message.payload,
                        attempt = message.attempts + 1,
                        error = %e,
                        "Approval failed; redelivering"
                    );
                    if let Err(e) = state.approval_queue.send(message.redelivery()) {
                        tracing::error!(booking_id = %message.payload, error = %e, "Could not redeliver approval message");
                    }
                }
                Ok(Err(e)) => {
                    tracing::error!(booking_id = %message.payload, error = %e, "Approval failed; dropping message")
                }
                Err(e) => {
                    tracing::error!(booking_id = %message.payload, error = %e, "Approval task panicked")
                }
            }
        }
    }

    tracing::info!("Approval worker stopped");
}
