//! Application state shared by handlers and background tasks

use std::sync::Arc;

use dalscooter_core::{BookingId, MessageId, TokenVerifier};

use crate::email::EmailSender;
use crate::queue::{Queues, WorkQueue};
use crate::store::{BookingStore, InMemorySupportStore, SupportStore, UserStore};
use crate::support::{LexiconSentiment, SentimentAnalyzer};

/// Application state
pub struct AppState<U: UserStore, B: BookingStore, E: EmailSender> {
    /// Identity directory and security questions
    pub user_store: U,
    /// Bookings and bike inventory
    pub booking_store: B,
    /// Concerns, responses and feedback
    pub support_store: Arc<dyn SupportStore>,
    /// Notification emails
    pub email_sender: E,
    /// Producer side of the approval queue
    pub approval_queue: Arc<dyn WorkQueue<BookingId>>,
    /// Producer side of the concern queue
    pub concern_queue: Arc<dyn WorkQueue<MessageId>>,
    pub sentiment: Arc<dyn SentimentAnalyzer>,
    /// Bearer-token verification
    pub token_verifier: Arc<dyn TokenVerifier>,
    /// Required `x-trigger-secret` on challenge trigger calls; every call is
    /// rejected while unset
    pub trigger_secret: Option<String>,
}

impl<U: UserStore, B: BookingStore, E: EmailSender> AppState<U, B, E> {
    /// State with an in-memory support store and the word-list sentiment
    /// analyzer
    pub fn new(
        user_store: U,
        booking_store: B,
        email_sender: E,
        queues: Queues,
        token_verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        Self {
            user_store,
            booking_store,
            support_store: Arc::new(InMemorySupportStore::new()),
            email_sender,
            approval_queue: queues.approvals,
            concern_queue: queues.concerns,
            sentiment: Arc::new(LexiconSentiment::new()),
            token_verifier,
            trigger_secret: None,
        }
    }

    /// Set the shared secret challenge trigger calls must carry
    pub fn with_trigger_secret(mut self, secret: Option<String>) -> Self {
        self.trigger_secret = secret;
        self
    }

    pub fn with_support_store(mut self, store: Arc<dyn SupportStore>) -> Self {
        self.support_store = store;
        self
    }

    pub fn with_sentiment_analyzer(mut self, analyzer: Arc<dyn SentimentAnalyzer>) -> Self {
        self.sentiment = analyzer;
        self
    }
}
