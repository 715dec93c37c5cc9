//! Bike inventory endpoints

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::authenticate;
use crate::email::EmailSender;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::{Bike, BookingStore, UserStore};

#[derive(Deserialize)]
pub struct ListBikesQuery {
    /// Only bikes that can be booked right now
    #[serde(default)]
    pub available: Option<bool>,
}

#[derive(Serialize)]
pub struct ListBikesResponse {
    pub success: bool,
    pub bikes: Vec<Bike>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutBikeRequest {
    #[serde(default)]
    pub bike_id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub bike_type: String,
    #[serde(default)]
    pub hourly_rate: f64,
    pub is_active: Option<bool>,
}

#[derive(Serialize)]
pub struct PutBikeResponse {
    pub success: bool,
    pub bike: Bike,
}

/// GET /bikes
pub async fn list_bikes<U, B, E>(
    State(state): State<Arc<AppState<U, B, E>>>,
    Query(query): Query<ListBikesQuery>,
) -> Result<Json<ListBikesResponse>, ApiError>
where
    U: UserStore,
    B: BookingStore,
    E: EmailSender,
{
    let mut bikes = state.booking_store.list_bikes()?;
    if query.available == Some(true) {
        bikes.retain(|bike| bike.is_active);
    }

    Ok(Json(ListBikesResponse {
        success: true,
        bikes,
    }))
}

/// POST /bikes
/// Add or replace a bike (franchise only). Rental state is kept: a rented
/// bike stays rented under its current access code.
pub async fn put_bike<U, B, E>(
    State(state): State<Arc<AppState<U, B, E>>>,
    headers: HeaderMap,
    Json(req): Json<PutBikeRequest>,
) -> Result<Json<PutBikeResponse>, ApiError>
where
    U: UserStore,
    B: BookingStore,
    E: EmailSender,
{
    let auth = authenticate(&state, &headers)?;
    if !auth.is_franchise() {
        return Err(ApiError::Forbidden);
    }

    let bike_id = req.bike_id.trim().to_string();
    if bike_id.is_empty() {
        return Err(ApiError::ValidationError("Missing required field: bikeId".into()));
    }
    if !req.hourly_rate.is_finite() || req.hourly_rate < 0.0 {
        return Err(ApiError::ValidationError(
            "hourlyRate must be a non-negative number".into(),
        ));
    }

    let existing = state.booking_store.get_bike(&bike_id)?;
    let bike = match existing.filter(|b| b.is_rented()) {
        Some(rented) => Bike {
            bike_id,
            model: req.model,
            bike_type: req.bike_type,
            hourly_rate: req.hourly_rate,
            is_active: false,
            access_code: rented.access_code,
        },
        None => Bike {
            bike_id,
            model: req.model,
            bike_type: req.bike_type,
            hourly_rate: req.hourly_rate,
            is_active: req.is_active.unwrap_or(true),
            access_code: String::new(),
        },
    };
    state.booking_store.put_bike(&bike)?;

    tracing::info!(bike_id = %bike.bike_id, user_id = %auth.user_id, "Bike saved");
    Ok(Json(PutBikeResponse {
        success: true,
        bike,
    }))
}
