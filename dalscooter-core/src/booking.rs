//! Booking records and their lifecycle
//!
//! A booking moves through:
//!
//! ```text
//! REQUESTED --approve--> APPROVED --redeem--> REDEEMED
//!     |                      |
//!     +-------expire---------+----> EXPIRED
//! ```
//!
//! The state is carried by two fields: `access_code` is empty until the
//! approval worker assigns one, and `is_used` flips to true exactly once
//! (by redemption or by the expiry sweep) and never goes back.

use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Length of an access code, in hex characters
pub const ACCESS_CODE_LEN: usize = 6;

/// Unique booking identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(pub String);

impl BookingId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BookingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a booking is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Requested,
    Approved,
    Redeemed,
    Expired,
}

/// A validated booking request
#[derive(Debug, Clone, PartialEq)]
pub struct BookingRequest {
    pub user_id: String,
    pub bike_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub price: f64,
}

impl BookingRequest {
    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(Error::MissingField("userId"));
        }
        if self.bike_id.trim().is_empty() {
            return Err(Error::MissingField("bikeId"));
        }
        if self.start_time >= self.end_time {
            return Err(Error::InvalidBooking(
                "startTime must be before endTime".into(),
            ));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(Error::InvalidBooking(
                "price must be a non-negative number".into(),
            ));
        }
        Ok(())
    }
}

/// A stored booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub booking_id: BookingId,
    pub user_id: String,
    pub bike_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub price: f64,
    pub access_code: String,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// A new booking awaiting approval
    pub fn requested(booking_id: BookingId, request: BookingRequest, now: DateTime<Utc>) -> Self {
        Self {
            booking_id,
            user_id: request.user_id,
            bike_id: request.bike_id,
            start_time: request.start_time,
            end_time: request.end_time,
            price: request.price,
            access_code: String::new(),
            is_used: false,
            created_at: now,
        }
    }

    /// Redeemed bookings keep their code; expired ones have it cleared.
    pub fn status(&self) -> BookingStatus {
        match (self.is_used, self.access_code.is_empty()) {
            (false, true) => BookingStatus::Requested,
            (false, false) => BookingStatus::Approved,
            (true, false) => BookingStatus::Redeemed,
            (true, true) => BookingStatus::Expired,
        }
    }

    /// Whether the approval worker may still assign a code
    pub fn awaiting_approval(&self) -> bool {
        self.status() == BookingStatus::Requested
    }

    /// Whether the sweeper should close this booking out at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_used && self.end_time < now
    }
}

/// Generate a random access code: 6 uppercase hex characters
pub fn generate_access_code() -> String {
    let value: u32 = rand::thread_rng().gen_range(0..=0xFF_FFFF);
    format!("{:06X}", value)
}

/// Parse an ISO-8601 instant. Timestamps without an offset are taken as UTC.
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .map(|naive| naive.and_utc())
        .map_err(|_| Error::InvalidBooking(format!("invalid timestamp: {}", value)))
}
