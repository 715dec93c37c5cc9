//! End-to-end flow against the SQLite store

mod common;

use std::sync::Arc;

use chrono::Utc;
use common::{
    answer_for, bearer, build_app, create_event, register_user, seed_bike, token_for, trigger,
    verify_event, TEST_TRIGGER_SECRET,
};
use dalscooter_api::{
    process_approval, sweep_expired_bookings, ApprovalOutcome, BookingStore, SqliteStore,
    UserStore,
};
use dalscooter_core::{BookingId, BookingStatus, Group};
use serde_json::{json, Value};
use tempfile::TempDir;

const EMAIL: &str = "rider@example.com";

fn sqlite_app(dir: &TempDir) -> common::TestApp<Arc<SqliteStore>, Arc<SqliteStore>> {
    let path = dir.path().join("dalscooter.db");
    let store = Arc::new(SqliteStore::open(path.to_str().unwrap()).unwrap());
    build_app(store.clone(), store, Some(TEST_TRIGGER_SECRET))
}

#[tokio::test]
async fn test_register_and_first_factor_with_sqlite() {
    let dir = TempDir::new().unwrap();
    let app = sqlite_app(&dir);
    let sub = register_user(&app.server, EMAIL, "franchise").await;

    let user = app.state.user_store.get_user_by_email(EMAIL).unwrap().unwrap();
    assert_eq!(user.id.0, sub);
    assert!(user.confirmed);
    assert_eq!(user.groups, vec![Group::Franchise]);

    let created: Value = trigger(&app.server, "/triggers/create-auth-challenge")
        .json(&create_event(&sub, EMAIL, 0))
        .await
        .json();
    let question_id = created["response"]["publicChallengeParameters"]["questionId"]
        .as_str()
        .unwrap()
        .to_string();

    let verified: Value = trigger(&app.server, "/triggers/verify-auth-challenge")
        .json(&verify_event(
            &sub,
            EMAIL,
            &created["response"]["privateChallengeParameters"],
            answer_for(&question_id),
        ))
        .await
        .json();
    assert_eq!(verified["response"]["answerCorrect"], true);
}

#[tokio::test]
async fn test_booking_lifecycle_with_sqlite() {
    let dir = TempDir::new().unwrap();
    let mut app = sqlite_app(&dir);
    seed_bike(&app.server, "bike-1").await;
    let sub = register_user(&app.server, EMAIL, "customer").await;
    let token = token_for(&sub, EMAIL, &["customers"]);

    let start = Utc::now() + chrono::Duration::hours(1);
    let response = bearer(app.server.post("/bookings"), &token)
        .json(&json!({
            "bikeId": "bike-1",
            "startTime": start.to_rfc3339(),
            "endTime": (start + chrono::Duration::hours(1)).to_rfc3339(),
            "price": 5.0,
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    let booking_id = BookingId(body["bookingId"].as_str().unwrap().to_string());

    let message = app.receiver.drain().remove(0);
    let state = &app.state;
    let first = process_approval(
        &state.user_store,
        &state.booking_store,
        &state.email_sender,
        &message.payload,
    )
    .unwrap();
    assert!(matches!(first, ApprovalOutcome::Approved { .. }));

    let second = process_approval(
        &state.user_store,
        &state.booking_store,
        &state.email_sender,
        &message.payload,
    )
    .unwrap();
    assert_eq!(second, ApprovalOutcome::Duplicate);

    let approved = state.booking_store.get_booking(&booking_id).unwrap().unwrap();
    assert_eq!(approved.status(), BookingStatus::Approved);
    let bike = state.booking_store.get_bike("bike-1").unwrap().unwrap();
    assert_eq!(bike.access_code, approved.access_code);

    // Sweep as if the booking window had already passed
    let later = approved.end_time + chrono::Duration::minutes(1);
    let report = sweep_expired_bookings(&state.booking_store, later).unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(report.bikes_released, 1);

    let expired = state.booking_store.get_booking(&booking_id).unwrap().unwrap();
    assert_eq!(expired.status(), BookingStatus::Expired);
    assert!(state.booking_store.get_bike("bike-1").unwrap().unwrap().is_active);

    let mine: Value = bearer(app.server.get("/bookings/mine"), &token).await.json();
    assert_eq!(mine["bookings"][0]["status"], "EXPIRED");
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let sub = {
        let app = sqlite_app(&dir);
        register_user(&app.server, EMAIL, "customer").await
    };

    let app = sqlite_app(&dir);
    let user = app.state.user_store.get_user_by_email(EMAIL).unwrap().unwrap();
    assert_eq!(user.id.0, sub);

    let duplicate = app
        .server
        .post("/register")
        .json(&json!({
            "email": EMAIL,
            "password": "An0therPass",
            "firstName": "Ria",
            "lastName": "Der",
            "securityQuestions": [
                {"question": "a?", "answer": "a"},
                {"question": "b?", "answer": "b"},
                {"question": "c?", "answer": "c"},
            ],
        }))
        .await;
    assert_eq!(duplicate.status_code(), 409);
}
