//! Booking submission

use chrono::Utc;
use dalscooter_core::{Booking, BookingId, BookingRequest};

use crate::crypto::generate_booking_id;
use crate::error::ApiError;
use crate::queue::WorkQueue;
use crate::store::BookingStore;

/// Validate and store a new booking, then queue it for approval
///
/// The booking is written before it is queued. If queueing fails the
/// booking stays REQUESTED and the caller sees a retryable error.
pub fn submit_booking<B>(
    store: &B,
    queue: &dyn WorkQueue<BookingId>,
    request: BookingRequest,
) -> Result<Booking, ApiError>
where
    B: BookingStore + ?Sized,
{
    request.validate()?;

    let booking = Booking::requested(generate_booking_id(), request, Utc::now());
    store.put_booking(&booking)?;

    if let Err(e) = queue.enqueue(booking.booking_id.clone()) {
        tracing::error!(
            booking_id = %booking.booking_id,
            error = %e,
            "Booking stored but not queued for approval; it stays REQUESTED"
        );
        return Err(e);
    }

    tracing::info!(
        booking_id = %booking.booking_id,
        user_id = %booking.user_id,
        bike_id = %booking.bike_id,
        "Booking requested"
    );
    Ok(booking)
}
