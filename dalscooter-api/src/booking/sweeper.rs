//! Expiry sweeper: retires access codes of bookings whose window has passed

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dalscooter_core::BookingId;

use crate::email::EmailSender;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::{BookingChange, BookingGuard, BookingStore, UpdateOutcome, UserStore};

/// A booking the sweep could not finish
#[derive(Debug, Clone, PartialEq)]
pub struct SweepFailure {
    pub booking_id: BookingId,
    pub reason: String,
}

/// Summary of one sweep
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    /// Bookings scanned
    pub examined: usize,
    /// Bookings marked used by this sweep
    pub expired: usize,
    /// Bikes made available again
    pub bikes_released: usize,
    pub failures: Vec<SweepFailure>,
}

/// Expire every unused booking whose end time is before `now`
///
/// Each expiry is a conditional update, so a booking redeemed in the
/// meantime is left alone. A rented bike is released only while it still
/// carries the code the expiry cleared. Per-booking failures are collected
/// in the report; only a failed scan is an error.
pub fn sweep_expired_bookings<B>(store: &B, now: DateTime<Utc>) -> Result<SweepReport, ApiError>
where
    B: BookingStore + ?Sized,
{
    let bookings = store.scan_bookings()?;
    let mut report = SweepReport {
        examined: bookings.len(),
        ..SweepReport::default()
    };

    for booking in bookings.iter().filter(|b| b.is_expired_at(now)) {
        let outcome =
            store.update_booking_if(&booking.booking_id, BookingGuard::Unused, BookingChange::Expire);

        // Release under the code the expiry cleared, which may be newer than the scan
        let expired = match outcome {
            Ok(UpdateOutcome::Applied { before, .. }) => {
                report.expired += 1;
                tracing::info!(booking_id = %booking.booking_id, "Booking expired");
                before
            }
            Ok(UpdateOutcome::GuardFailed(_)) | Ok(UpdateOutcome::NotFound) => continue,
            Err(e) => {
                tracing::warn!(booking_id = %booking.booking_id, error = %e, "Could not expire booking");
                report.failures.push(SweepFailure {
                    booking_id: booking.booking_id.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if expired.access_code.is_empty() {
            continue;
        }
        match store.release_bike(&expired.bike_id, &expired.access_code) {
            Ok(true) => report.bikes_released += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(booking_id = %booking.booking_id, bike_id = %expired.bike_id, error = %e, "Could not release bike");
                report.failures.push(SweepFailure {
                    booking_id: booking.booking_id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}

/// Run the sweep on a fixed interval, forever
pub async fn run_sweeper<U, B, E>(state: Arc<AppState<U, B, E>>, interval: Duration)
where
    U: UserStore + 'static,
    B: BookingStore + 'static,
    E: EmailSender + 'static,
{
    tracing::info!(interval_secs = interval.as_secs(), "Expiry sweeper started");
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        let task_state = state.clone();
        let result = tokio::task::spawn_blocking(move || {
            sweep_expired_bookings(&task_state.booking_store, Utc::now())
        })
        .await;

        match result {
            Ok(Ok(report)) if report.failures.is_empty() => {
                tracing::debug!(examined = report.examined, expired = report.expired, "Sweep complete")
            }
            Ok(Ok(report)) => tracing::warn!(
                examined = report.examined,
                expired = report.expired,
                failures = report.failures.len(),
                "Sweep completed with failures"
            ),
            Ok(Err(e)) => tracing::error!(error = %e, "Sweep failed"),
            Err(e) => tracing::error!(error = %e, "Sweep task panicked"),
        }
    }
}
