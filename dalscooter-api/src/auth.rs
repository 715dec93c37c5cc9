//! Bearer-token authentication for API routes

use std::sync::Arc;
use std::time::Duration;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use dalscooter_core::{AuthContext, JwksVerifier, SharedSecretVerifier, TokenVerifier};
use jsonwebtoken::jwk::JwkSet;
use reqwest::blocking::Client;

use crate::config::Config;
use crate::email::EmailSender;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::{BookingStore, UserStore};

/// Extract the token from an `Authorization: Bearer ...` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Verify the request's bearer token and produce its auth context
pub fn authenticate<U, B, E>(
    state: &AppState<U, B, E>,
    headers: &HeaderMap,
) -> Result<AuthContext, ApiError>
where
    U: UserStore,
    B: BookingStore,
    E: EmailSender,
{
    let token = bearer_token(headers).ok_or(ApiError::NotAuthenticated)?;
    state.token_verifier.verify(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected bearer token");
        ApiError::from(e)
    })
}

/// Fetch the identity provider's published key set
fn fetch_jwks(url: &str) -> Result<JwkSet, ApiError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ApiError::Internal(format!("HTTP client: {}", e)))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| ApiError::Internal(format!("JWKS request failed: {}", e)))?;
    if !response.status().is_success() {
        return Err(ApiError::Internal(format!("JWKS HTTP error: {}", response.status())));
    }

    response
        .json::<JwkSet>()
        .map_err(|e| ApiError::Internal(format!("Invalid JWKS document: {}", e)))
}

/// Build the token verifier described by the configuration
///
/// A JWKS URL takes precedence; otherwise a development shared secret is
/// used. With neither, startup fails.
pub async fn build_token_verifier(config: &Config) -> Result<Arc<dyn TokenVerifier>, ApiError> {
    if let Some(url) = config.jwks_url.clone() {
        let issuer = config
            .token_issuer
            .clone()
            .ok_or_else(|| ApiError::Internal("TOKEN_ISSUER is required with JWKS_URL".into()))?;

        // Run in blocking task since reqwest::blocking::Client can't run on the async runtime
        let keys = tokio::task::spawn_blocking(move || fetch_jwks(&url))
            .await
            .map_err(|e| ApiError::Internal(format!("Blocking task failed: {}", e)))??;

        let verifier = JwksVerifier::new(keys, &issuer, config.token_audience.as_deref());
        tracing::info!(keys = verifier.key_count(), issuer = %issuer, "Loaded identity provider keys");
        return Ok(Arc::new(verifier));
    }

    if let Some(secret) = &config.dev_token_secret {
        tracing::warn!("Verifying bearer tokens with DEV_TOKEN_SECRET; do not use in production");
        return Ok(Arc::new(SharedSecretVerifier::new(
            secret.as_bytes(),
            config.token_issuer.as_deref(),
        )));
    }

    Err(ApiError::Internal(
        "no token verifier configured (set JWKS_URL or DEV_TOKEN_SECRET)".into(),
    ))
}
