//! Custom-authentication trigger endpoints
//!
//! The identity provider calls these during a login. Each takes the
//! provider's event and returns it with the response part filled in.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::email::{send_best_effort, EmailSender};
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::{BookingStore, UserStore};
use crate::triggers::{
    self, CreateAuthChallengeEvent, DefineAuthChallengeEvent, VerifyAuthChallengeEvent,
};

/// Header carrying the shared trigger secret
pub const TRIGGER_SECRET_HEADER: &str = "x-trigger-secret";

fn check_trigger_secret<U, B, E>(state: &AppState<U, B, E>, headers: &HeaderMap) -> Result<(), ApiError>
where
    U: UserStore,
    B: BookingStore,
    E: EmailSender,
{
    let Some(expected) = &state.trigger_secret else {
        tracing::error!("Trigger call rejected: no trigger secret configured");
        return Err(ApiError::NotAuthenticated);
    };
    let provided = headers
        .get(TRIGGER_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if provided == Some(expected.as_str()) {
        Ok(())
    } else {
        tracing::warn!("Rejected trigger call with missing or wrong secret");
        Err(ApiError::NotAuthenticated)
    }
}

/// POST /triggers/define-auth-challenge
pub async fn define_auth_challenge<U, B, E>(
    State(state): State<Arc<AppState<U, B, E>>>,
    headers: HeaderMap,
    Json(event): Json<DefineAuthChallengeEvent>,
) -> Result<Json<DefineAuthChallengeEvent>, ApiError>
where
    U: UserStore,
    B: BookingStore,
    E: EmailSender,
{
    check_trigger_secret(&state, &headers)?;
    Ok(Json(triggers::define_auth_challenge(event)))
}

/// POST /triggers/create-auth-challenge
pub async fn create_auth_challenge<U, B, E>(
    State(state): State<Arc<AppState<U, B, E>>>,
    headers: HeaderMap,
    Json(event): Json<CreateAuthChallengeEvent>,
) -> Result<Json<CreateAuthChallengeEvent>, ApiError>
where
    U: UserStore,
    B: BookingStore,
    E: EmailSender,
{
    check_trigger_secret(&state, &headers)?;
    let event = triggers::create_auth_challenge(&state.user_store, event, &mut rand::thread_rng())?;
    Ok(Json(event))
}

/// POST /triggers/verify-auth-challenge
/// A completed login also queues a sign-in alert, off the request path
pub async fn verify_auth_challenge<U, B, E>(
    State(state): State<Arc<AppState<U, B, E>>>,
    headers: HeaderMap,
    Json(event): Json<VerifyAuthChallengeEvent>,
) -> Result<Json<VerifyAuthChallengeEvent>, ApiError>
where
    U: UserStore + 'static,
    B: BookingStore + 'static,
    E: EmailSender + 'static,
{
    check_trigger_secret(&state, &headers)?;
    let outcome = triggers::verify_auth_challenge(event);

    if outcome.login_complete {
        if let Some(message) = triggers::login_notification(&outcome.event) {
            let state = state.clone();
            tokio::task::spawn_blocking(move || send_best_effort(&state.email_sender, &message));
        }
    }

    Ok(Json(outcome.event))
}
