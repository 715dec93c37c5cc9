//! HTTP routes for the service

mod bikes;
mod bookings;
mod concerns;
mod feedback;
mod health;
mod register;
mod triggers;

use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::email::EmailSender;
use crate::state::AppState;
use crate::store::{BookingStore, UserStore};

pub use triggers::TRIGGER_SECRET_HEADER;

/// Create the router with all routes, allowing any CORS origin
pub fn create_router<U, B, E>(state: Arc<AppState<U, B, E>>) -> Router
where
    U: UserStore + 'static,
    B: BookingStore + 'static,
    E: EmailSender + 'static,
{
    create_router_with_origin(state, None)
}

/// Create the router, restricting CORS to `allowed_origin` when given
pub fn create_router_with_origin<U, B, E>(
    state: Arc<AppState<U, B, E>>,
    allowed_origin: Option<&str>,
) -> Router
where
    U: UserStore + 'static,
    B: BookingStore + 'static,
    E: EmailSender + 'static,
{
    Router::new()
        .route("/health", get(health::health))
        .route("/register", post(register::register))
        .route(
            "/triggers/define-auth-challenge",
            post(triggers::define_auth_challenge),
        )
        .route(
            "/triggers/create-auth-challenge",
            post(triggers::create_auth_challenge),
        )
        .route(
            "/triggers/verify-auth-challenge",
            post(triggers::verify_auth_challenge),
        )
        .route("/bookings", post(bookings::submit))
        .route("/bookings/mine", get(bookings::list_mine))
        .route("/bookings/:id", get(bookings::get_booking))
        .route("/bikes", get(bikes::list_bikes).post(bikes::put_bike))
        .route("/concerns", post(concerns::submit))
        .route("/concerns/mine", get(concerns::list_mine))
        .route("/concerns/assigned", get(concerns::list_assigned))
        .route("/concerns/:id/respond", post(concerns::respond))
        .route("/feedback", get(feedback::list).post(feedback::submit))
        .layer(cors_layer(allowed_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origin: Option<&str>) -> CorsLayer {
    let origin = match allowed_origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => AllowOrigin::exact(origin),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Invalid ALLOWED_ORIGIN; allowing any origin");
            AllowOrigin::any()
        }
        None => AllowOrigin::any(),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(TRIGGER_SECRET_HEADER),
        ])
}
