//! Common test utilities for API integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue};
use axum_test::{TestRequest, TestServer};
use chrono::Utc;
use dalscooter_api::{
    queue, routes, ApiError, AppState, BookingStore, EmailMessage, EmailSender,
    InMemoryBookingStore, InMemoryUserStore, QueueMessage, QueueReceiver, Queues,
    SentimentAnalyzer, SupportStore, UserStore, WorkQueue,
};
use dalscooter_api::routes::TRIGGER_SECRET_HEADER;
use dalscooter_core::{BookingId, MessageId, SharedSecretVerifier};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

/// Secret the test verifier accepts
pub const TEST_TOKEN_SECRET: &[u8] = b"dalscooter-test-secret";

/// Secret the identity provider sends on trigger calls
pub const TEST_TRIGGER_SECRET: &str = "hook-secret";

pub const TEST_PASSWORD: &str = "Sup3rSecret!";

/// Mock email sender that captures messages
#[derive(Default, Clone)]
pub struct MockEmailSender {
    pub sent: Arc<RwLock<Vec<EmailMessage>>>,
}

impl MockEmailSender {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Messages sent to an address, oldest first
    pub fn messages_to(&self, to: &str) -> Vec<EmailMessage> {
        self.sent
            .read()
            .unwrap()
            .iter()
            .filter(|m| m.to == to)
            .cloned()
            .collect()
    }

    /// Wait briefly for a message to `to` whose subject contains `subject`
    pub async fn wait_for(&self, to: &str, subject: &str) -> Option<EmailMessage> {
        for _ in 0..100 {
            let found = self
                .messages_to(to)
                .into_iter()
                .find(|m| m.subject.contains(subject));
            if found.is_some() {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        None
    }
}

impl EmailSender for MockEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<(), String> {
        self.sent.write().unwrap().push(message.clone());
        Ok(())
    }
}

/// Queue that is always down
pub struct FailingQueue;

impl<T: Clone> WorkQueue<T> for FailingQueue {
    fn send(&self, _message: QueueMessage<T>) -> Result<(), ApiError> {
        Err(ApiError::QueueUnavailable("queue endpoint unreachable".into()))
    }
}

/// A running test server plus handles on its internals
pub struct TestApp<U: UserStore, B: BookingStore> {
    pub server: TestServer,
    pub state: Arc<AppState<U, B, MockEmailSender>>,
    pub email: MockEmailSender,
    pub receiver: QueueReceiver<BookingId>,
    pub concern_receiver: QueueReceiver<MessageId>,
}

fn build_state<U, B>(
    user_store: U,
    booking_store: B,
    email: MockEmailSender,
    queues: Queues,
    support_store: Option<Arc<dyn SupportStore>>,
    trigger_secret: Option<&str>,
) -> Arc<AppState<U, B, MockEmailSender>>
where
    U: UserStore,
    B: BookingStore,
{
    let mut state = AppState::new(
        user_store,
        booking_store,
        email,
        queues,
        Arc::new(SharedSecretVerifier::new(TEST_TOKEN_SECRET, None)),
    )
    .with_trigger_secret(trigger_secret.map(str::to_string));
    if let Some(store) = support_store {
        state = state.with_support_store(store);
    }
    Arc::new(state)
}

/// Create a test app over the given stores
pub fn build_app<U, B>(user_store: U, booking_store: B, trigger_secret: Option<&str>) -> TestApp<U, B>
where
    U: UserStore + 'static,
    B: BookingStore + 'static,
{
    build_app_with_support(user_store, booking_store, None, trigger_secret)
}

/// Create a test app, optionally over a given support store
pub fn build_app_with_support<U, B>(
    user_store: U,
    booking_store: B,
    support_store: Option<Arc<dyn SupportStore>>,
    trigger_secret: Option<&str>,
) -> TestApp<U, B>
where
    U: UserStore + 'static,
    B: BookingStore + 'static,
{
    let email = MockEmailSender::new();
    let (queues, receivers) = queue::queues(10);
    let state = build_state(
        user_store,
        booking_store,
        email.clone(),
        queues,
        support_store,
        trigger_secret,
    );

    let app = routes::create_router(state.clone());
    let server = TestServer::new(app).expect("Failed to create test server");

    TestApp {
        server,
        state,
        email,
        receiver: receivers.approvals,
        concern_receiver: receivers.concerns,
    }
}

/// Create a test app with in-memory stores
pub fn create_test_app() -> TestApp<InMemoryUserStore, InMemoryBookingStore> {
    build_app(
        InMemoryUserStore::new(),
        InMemoryBookingStore::new(),
        Some(TEST_TRIGGER_SECRET),
    )
}

/// Create a test server whose queues always fail
pub fn create_app_with_failing_queue() -> (
    TestServer,
    Arc<AppState<InMemoryUserStore, InMemoryBookingStore, MockEmailSender>>,
) {
    let state = build_state(
        InMemoryUserStore::new(),
        InMemoryBookingStore::new(),
        MockEmailSender::new(),
        Queues {
            approvals: Arc::new(FailingQueue),
            concerns: Arc::new(FailingQueue),
        },
        None,
        Some(TEST_TRIGGER_SECRET),
    );
    let server = TestServer::new(routes::create_router(state.clone()))
        .expect("Failed to create test server");
    (server, state)
}

/// Create a test server with a custom sentiment analyzer
pub fn create_app_with_sentiment(
    analyzer: Arc<dyn SentimentAnalyzer>,
) -> (
    TestServer,
    Arc<AppState<InMemoryUserStore, InMemoryBookingStore, MockEmailSender>>,
) {
    let (queues, _receivers) = queue::queues(10);
    let state = Arc::new(
        AppState::new(
            InMemoryUserStore::new(),
            InMemoryBookingStore::new(),
            MockEmailSender::new(),
            queues,
            Arc::new(SharedSecretVerifier::new(TEST_TOKEN_SECRET, None)),
        )
        .with_sentiment_analyzer(analyzer),
    );
    let server = TestServer::new(routes::create_router(state.clone()))
        .expect("Failed to create test server");
    (server, state)
}

/// Sign a bearer token the test verifier accepts
pub fn token_for(user_id: &str, email: &str, groups: &[&str]) -> String {
    let claims = json!({
        "sub": user_id,
        "email": email,
        "cognito:groups": groups,
        "exp": (Utc::now() + chrono::Duration::hours(1)).timestamp(),
    });
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_TOKEN_SECRET),
    )
    .unwrap()
}

/// Attach a bearer token to a request
pub fn bearer(request: TestRequest, token: &str) -> TestRequest {
    request.add_header(
        HeaderName::from_static("authorization"),
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    )
}

/// A trigger call carrying the test trigger secret
pub fn trigger(server: &TestServer, path: &str) -> TestRequest {
    server.post(path).add_header(
        HeaderName::from_static(TRIGGER_SECRET_HEADER),
        HeaderValue::from_static(TEST_TRIGGER_SECRET),
    )
}

/// Answers for the questions registered by [`register_user`]
pub fn answer_for(question_id: &str) -> &'static str {
    match question_id {
        "q1" => "Rex",
        "q2" => "Halifax",
        _ => "Blue",
    }
}

/// Register a user and return its id
pub async fn register_user(server: &TestServer, email: &str, user_type: &str) -> String {
    let response = server
        .post("/register")
        .json(&json!({
            "email": email,
            "password": TEST_PASSWORD,
            "firstName": "Ria",
            "lastName": "Der",
            "userType": user_type,
            "securityQuestions": [
                {"question": "First pet?", "answer": "Rex"},
                {"question": "Home town?", "answer": "Halifax"},
                {"question": "Favourite colour?", "answer": "Blue"},
            ],
        }))
        .await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    body["userId"].as_str().expect("No userId").to_string()
}

/// A define-auth-challenge event with the given history
pub fn define_event(sub: &str, results: &[bool]) -> Value {
    let session: Vec<Value> = results
        .iter()
        .map(|r| json!({"challengeName": "CUSTOM_CHALLENGE", "challengeResult": r}))
        .collect();
    json!({
        "version": "1",
        "triggerSource": "DefineAuthChallenge_Authentication",
        "userName": sub,
        "request": {"userAttributes": {"sub": sub}, "session": session},
        "response": {"challengeName": null, "issueTokens": null, "failAuthentication": null},
    })
}

/// A create-auth-challenge event after `rounds` passed factors
pub fn create_event(sub: &str, email: &str, rounds: usize) -> Value {
    let session: Vec<Value> = (0..rounds)
        .map(|_| json!({"challengeName": "CUSTOM_CHALLENGE", "challengeResult": true}))
        .collect();
    json!({
        "version": "1",
        "triggerSource": "CreateAuthChallenge_Authentication",
        "request": {
            "userAttributes": {"sub": sub, "email": email},
            "challengeName": "CUSTOM_CHALLENGE",
            "session": session,
        },
        "response": {},
    })
}

/// A verify-auth-challenge event answering a created challenge
pub fn verify_event(sub: &str, email: &str, private: &Value, answer: &str) -> Value {
    json!({
        "version": "1",
        "triggerSource": "VerifyAuthChallengeResponse_Authentication",
        "request": {
            "userAttributes": {"sub": sub, "email": email},
            "privateChallengeParameters": private,
            "challengeAnswer": answer,
        },
        "response": {"answerCorrect": null},
    })
}

/// Add or replace a bike as a franchise member
pub async fn seed_bike(server: &TestServer, bike_id: &str) {
    let token = token_for("franchise-admin", "ops@dalscooter.ca", &["franchise"]);
    let response = bearer(server.post("/bikes"), &token)
        .json(&json!({
            "bikeId": bike_id,
            "model": "Segway Ninebot",
            "bikeType": "eBike",
            "hourlyRate": 5.0,
        }))
        .await;
    assert_eq!(response.status_code(), 200);
}
