//! Booking endpoints (bearer-authenticated)

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use dalscooter_core::booking::parse_instant;
use dalscooter_core::{Booking, BookingId, BookingRequest, BookingStatus, Error as CoreError};
use serde::{Deserialize, Serialize};

use crate::auth::authenticate;
use crate::booking::submit_booking;
use crate::email::EmailSender;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::{BookingStore, UserStore};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBookingRequest {
    pub bike_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub price: Option<f64>,
}

impl SubmitBookingRequest {
    fn into_request(self, user_id: String) -> Result<BookingRequest, ApiError> {
        let bike_id = self.bike_id.ok_or(CoreError::MissingField("bikeId"))?;
        let start_time = self.start_time.ok_or(CoreError::MissingField("startTime"))?;
        let end_time = self.end_time.ok_or(CoreError::MissingField("endTime"))?;
        let price = self.price.ok_or(CoreError::MissingField("price"))?;

        Ok(BookingRequest {
            user_id,
            bike_id,
            start_time: parse_instant(&start_time)?,
            end_time: parse_instant(&end_time)?,
            price,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBookingResponse {
    pub success: bool,
    pub booking_id: BookingId,
    pub status: BookingStatus,
    pub message: String,
}

/// A booking with its derived lifecycle state
#[derive(Serialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub status: BookingStatus,
}

impl From<Booking> for BookingView {
    fn from(booking: Booking) -> Self {
        let status = booking.status();
        Self { booking, status }
    }
}

#[derive(Serialize)]
pub struct BookingListResponse {
    pub success: bool,
    pub bookings: Vec<BookingView>,
}

#[derive(Serialize)]
pub struct BookingResponse {
    pub success: bool,
    pub booking: BookingView,
}

/// POST /bookings
/// Store a booking for the caller and queue it for approval
pub async fn submit<U, B, E>(
    State(state): State<Arc<AppState<U, B, E>>>,
    headers: HeaderMap,
    Json(req): Json<SubmitBookingRequest>,
) -> Result<Json<SubmitBookingResponse>, ApiError>
where
    U: UserStore,
    B: BookingStore,
    E: EmailSender,
{
    let auth = authenticate(&state, &headers)?;
    let request = req.into_request(auth.user_id)?;

    let booking = submit_booking(&state.booking_store, state.approval_queue.as_ref(), request)?;

    Ok(Json(SubmitBookingResponse {
        success: true,
        status: booking.status(),
        booking_id: booking.booking_id,
        message: "Booking created and pushed to approval queue.".into(),
    }))
}

/// GET /bookings/mine
pub async fn list_mine<U, B, E>(
    State(state): State<Arc<AppState<U, B, E>>>,
    headers: HeaderMap,
) -> Result<Json<BookingListResponse>, ApiError>
where
    U: UserStore,
    B: BookingStore,
    E: EmailSender,
{
    let auth = authenticate(&state, &headers)?;
    let bookings = state.booking_store.list_bookings_for_user(&auth.user_id)?;

    Ok(Json(BookingListResponse {
        success: true,
        bookings: bookings.into_iter().map(BookingView::from).collect(),
    }))
}

/// GET /bookings/:id
/// Visible to the booking's owner and to franchise members
pub async fn get_booking<U, B, E>(
    State(state): State<Arc<AppState<U, B, E>>>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
) -> Result<Json<BookingResponse>, ApiError>
where
    U: UserStore,
    B: BookingStore,
    E: EmailSender,
{
    let auth = authenticate(&state, &headers)?;
    let booking = state
        .booking_store
        .get_booking(&BookingId(booking_id))?
        .ok_or(ApiError::BookingNotFound)?;

    if booking.user_id != auth.user_id && !auth.is_franchise() {
        return Err(ApiError::Forbidden);
    }

    Ok(Json(BookingResponse {
        success: true,
        booking: booking.into(),
    }))
}
