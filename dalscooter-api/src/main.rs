//! DalScooter API server

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dalscooter_api::{
    auth, queue, routes, run_approval_worker, run_concern_worker, run_sweeper, AppState,
    BookingStore, Config, ConsoleEmailSender, EmailSender, InMemoryBookingStore,
    InMemorySupportStore, InMemoryUserStore, SmtpConfig, SmtpEmailSender, SqliteStore,
    SupportStore, UserStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dalscooter_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    tracing::info!(?config, "Loaded configuration");

    let email_sender: Box<dyn EmailSender> = match SmtpConfig::from_env() {
        Some(smtp) => match SmtpEmailSender::new(smtp) {
            Ok(sender) => Box::new(sender),
            Err(e) => {
                tracing::warn!(error = %e, "SMTP unavailable; writing emails to console");
                Box::new(ConsoleEmailSender::new())
            }
        },
        None => {
            tracing::info!("SMTP not configured; writing emails to console");
            Box::new(ConsoleEmailSender::new())
        }
    };

    match config.database_path.clone() {
        Some(path) => {
            let store = Arc::new(SqliteStore::open(&path)?);
            tracing::info!(path = %path, "Using SQLite store");
            serve(config, store.clone(), store.clone(), store, email_sender).await
        }
        None => {
            tracing::warn!("DATABASE_PATH not set; using in-memory stores");
            serve(
                config,
                InMemoryUserStore::new(),
                InMemoryBookingStore::new(),
                Arc::new(InMemorySupportStore::new()),
                email_sender,
            )
            .await
        }
    }
}

async fn serve<U, B, E>(
    config: Config,
    user_store: U,
    booking_store: B,
    support_store: Arc<dyn SupportStore>,
    email_sender: E,
) -> Result<()>
where
    U: UserStore + 'static,
    B: BookingStore + 'static,
    E: EmailSender + 'static,
{
    let token_verifier = auth::build_token_verifier(&config).await?;
    let trigger_secret = config
        .trigger_secret
        .clone()
        .ok_or_else(|| anyhow::anyhow!("TRIGGER_SECRET must be set"))?;
    let (queues, receivers) = queue::queues(config.approval_batch_size);

    // Create app state
    let state = Arc::new(
        AppState::new(
            user_store,
            booking_store,
            email_sender,
            queues,
            token_verifier,
        )
        .with_support_store(support_store)
        .with_trigger_secret(Some(trigger_secret)),
    );

    // Background work
    tokio::spawn(run_approval_worker(state.clone(), receivers.approvals));
    tokio::spawn(run_concern_worker(state.clone(), receivers.concerns));
    tokio::spawn(run_sweeper(state.clone(), config.sweep_interval));

    // Create router
    let app = routes::create_router_with_origin(state, config.allowed_origin.as_deref());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("DalScooter API listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
