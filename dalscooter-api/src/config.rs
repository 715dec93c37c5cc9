//! Service configuration

use std::time::Duration;

/// Default HTTP port
const DEFAULT_PORT: u16 = 3000;
/// Default interval between expiry sweeps
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
/// Default number of queue messages handled per worker batch
const DEFAULT_APPROVAL_BATCH_SIZE: usize = 10;

#[derive(Clone)]
pub struct Config {
    /// Port to listen on
    pub port: u16,

    /// SQLite database file; in-memory stores when unset
    pub database_path: Option<String>,

    /// Identity provider key set used to verify bearer tokens
    pub jwks_url: Option<String>,

    /// Expected `iss` claim
    pub token_issuer: Option<String>,

    /// Expected `aud` claim, when the provider sets one
    pub token_audience: Option<String>,

    /// HS256 secret for local development tokens
    pub dev_token_secret: Option<String>,

    /// Shared secret required on challenge trigger calls; startup fails
    /// without it
    pub trigger_secret: Option<String>,

    pub sweep_interval: Duration,

    pub approval_batch_size: usize,

    /// CORS origin; any origin when unset
    pub allowed_origin: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_path: None,
            jwks_url: None,
            token_issuer: None,
            token_audience: None,
            dev_token_secret: None,
            trigger_secret: None,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            approval_batch_size: DEFAULT_APPROVAL_BATCH_SIZE,
            allowed_origin: None,
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = env_string("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        let sweep_interval = env_string("SWEEP_INTERVAL_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.sweep_interval);

        let approval_batch_size = env_string("APPROVAL_BATCH_SIZE")
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|s| *s > 0)
            .unwrap_or(defaults.approval_batch_size);

        Self {
            port,
            database_path: env_string("DATABASE_PATH"),
            jwks_url: env_string("JWKS_URL"),
            token_issuer: env_string("TOKEN_ISSUER"),
            token_audience: env_string("TOKEN_AUDIENCE"),
            dev_token_secret: env_string("DEV_TOKEN_SECRET"),
            trigger_secret: env_string("TRIGGER_SECRET"),
            sweep_interval,
            approval_batch_size,
            allowed_origin: env_string("ALLOWED_ORIGIN"),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database_path", &self.database_path)
            .field("jwks_url", &self.jwks_url)
            .field("token_issuer", &self.token_issuer)
            .field("token_audience", &self.token_audience)
            .field("dev_token_secret", &redact(&self.dev_token_secret))
            .field("trigger_secret", &redact(&self.trigger_secret))
            .field("sweep_interval", &self.sweep_interval)
            .field("approval_batch_size", &self.approval_batch_size)
            .field("allowed_origin", &self.allowed_origin)
            .finish()
    }
}
