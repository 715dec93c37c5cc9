//! Tests for the booking request and approval pipeline

mod common;

use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{
    bearer, create_app_with_failing_queue, create_test_app, register_user, seed_bike, token_for,
};
use dalscooter_api::{process_approval, run_approval_worker, ApprovalOutcome, BookingStore};
use dalscooter_core::{BookingId, BookingStatus};
use serde_json::{json, Value};

const EMAIL: &str = "rider@example.com";

fn booking_body(bike_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Value {
    json!({
        "bikeId": bike_id,
        "startTime": start.to_rfc3339(),
        "endTime": end.to_rfc3339(),
        "price": 12.5,
    })
}

fn upcoming(bike_id: &str) -> Value {
    let start = Utc::now() + chrono::Duration::hours(1);
    booking_body(bike_id, start, start + chrono::Duration::hours(2))
}

#[tokio::test]
async fn test_submit_stores_requested_booking_and_enqueues() {
    let mut app = create_test_app();
    let sub = register_user(&app.server, EMAIL, "customer").await;
    let token = token_for(&sub, EMAIL, &["customers"]);

    let response = bearer(app.server.post("/bookings"), &token)
        .json(&upcoming("bike-1"))
        .await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "REQUESTED");
    let booking_id = BookingId(body["bookingId"].as_str().unwrap().to_string());

    let stored = app
        .state
        .booking_store
        .get_booking(&booking_id)
        .unwrap()
        .expect("booking written before enqueue");
    assert_eq!(stored.user_id, sub);
    assert_eq!(stored.bike_id, "bike-1");
    assert_eq!(stored.access_code, "");
    assert!(!stored.is_used);
    assert_eq!(stored.price, 12.5);

    let queued = app.receiver.drain();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].payload, booking_id);
    assert_eq!(queued[0].attempts, 0);
}

#[tokio::test]
async fn test_approval_issues_code_once() {
    let mut app = create_test_app();
    seed_bike(&app.server, "bike-1").await;
    let sub = register_user(&app.server, EMAIL, "customer").await;
    let token = token_for(&sub, EMAIL, &["customers"]);

    let body: Value = bearer(app.server.post("/bookings"), &token)
        .json(&upcoming("bike-1"))
        .await
        .json();
    let booking_id = BookingId(body["bookingId"].as_str().unwrap().to_string());

    let messages = app.receiver.drain();
    assert_eq!(messages.len(), 1);

    let state = &app.state;
    let outcome = process_approval(
        &state.user_store,
        &state.booking_store,
        &state.email_sender,
        &messages[0].payload,
    )
    .unwrap();

    let code = match outcome {
        ApprovalOutcome::Approved {
            access_code,
            bike_marked,
            notified,
        } => {
            assert!(bike_marked);
            assert!(notified);
            access_code
        }
        other => panic!("Expected approval, got {:?}", other),
    };
    assert_eq!(code.len(), 6);
    assert!(code
        .chars()
        .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));

    let booking = state.booking_store.get_booking(&booking_id).unwrap().unwrap();
    assert_eq!(booking.access_code, code);
    assert!(!booking.is_used);
    assert_eq!(booking.status(), BookingStatus::Approved);

    let bike = state.booking_store.get_bike("bike-1").unwrap().unwrap();
    assert!(!bike.is_active);
    assert_eq!(bike.access_code, code);

    // Redelivery of the same message is a no-op
    let again = process_approval(
        &state.user_store,
        &state.booking_store,
        &state.email_sender,
        &booking_id,
    )
    .unwrap();
    assert_eq!(again, ApprovalOutcome::Duplicate);

    let booking = state.booking_store.get_booking(&booking_id).unwrap().unwrap();
    assert_eq!(booking.access_code, code);

    let confirmations: Vec<_> = app
        .email
        .messages_to(EMAIL)
        .into_iter()
        .filter(|m| m.subject.contains("confirmed"))
        .collect();
    assert_eq!(confirmations.len(), 1);
    assert!(confirmations[0].body_text.contains(&code));

    let view: Value = bearer(app.server.get(&format!("/bookings/{}", booking_id)), &token)
        .await
        .json();
    assert_eq!(view["booking"]["status"], "APPROVED");
    assert_eq!(view["booking"]["accessCode"], code.as_str());
}

#[tokio::test]
async fn test_approval_without_inventory_entry_still_approves() {
    let mut app = create_test_app();
    let sub = register_user(&app.server, EMAIL, "customer").await;
    let token = token_for(&sub, EMAIL, &["customers"]);

    bearer(app.server.post("/bookings"), &token)
        .json(&upcoming("ghost-bike"))
        .await;
    let message = app.receiver.drain().remove(0);

    let state = &app.state;
    let outcome = process_approval(
        &state.user_store,
        &state.booking_store,
        &state.email_sender,
        &message.payload,
    )
    .unwrap();

    match outcome {
        ApprovalOutcome::Approved { bike_marked, .. } => assert!(!bike_marked),
        other => panic!("Expected approval, got {:?}", other),
    }
}

#[tokio::test]
async fn test_approval_of_missing_booking_is_dropped() {
    let app = create_test_app();
    let state = &app.state;

    let outcome = process_approval(
        &state.user_store,
        &state.booking_store,
        &state.email_sender,
        &BookingId("does-not-exist".into()),
    )
    .unwrap();

    assert_eq!(outcome, ApprovalOutcome::NotFound);
}

#[tokio::test]
async fn test_worker_approves_queued_bookings() {
    let app = create_test_app();
    seed_bike(&app.server, "bike-7").await;
    let sub = register_user(&app.server, EMAIL, "customer").await;
    let token = token_for(&sub, EMAIL, &["customers"]);

    let worker = tokio::spawn(run_approval_worker(app.state.clone(), app.receiver));

    let body: Value = bearer(app.server.post("/bookings"), &token)
        .json(&upcoming("bike-7"))
        .await
        .json();
    let booking_id = BookingId(body["bookingId"].as_str().unwrap().to_string());

    let mut approved = None;
    for _ in 0..100 {
        let booking = app
            .state
            .booking_store
            .get_booking(&booking_id)
            .unwrap()
            .unwrap();
        if !booking.access_code.is_empty() {
            approved = Some(booking);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let booking = approved.expect("worker did not approve the booking");
    assert_eq!(booking.status(), BookingStatus::Approved);
    assert!(app.email.wait_for(EMAIL, "confirmed").await.is_some());

    worker.abort();
}

#[tokio::test]
async fn test_enqueue_failure_returns_retryable_error() {
    let (server, state) = create_app_with_failing_queue();
    let token = token_for("user-1", EMAIL, &["customers"]);

    let response = bearer(server.post("/bookings"), &token)
        .json(&upcoming("bike-1"))
        .await;

    assert_eq!(response.status_code(), 503);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["retryable"], true);

    // The record was written first and stays awaiting approval
    let bookings = state.booking_store.scan_bookings().unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].status(), BookingStatus::Requested);
    assert_eq!(bookings[0].user_id, "user-1");
}

#[tokio::test]
async fn test_submit_requires_authentication() {
    let app = create_test_app();

    let response = app.server.post("/bookings").json(&upcoming("bike-1")).await;
    assert_eq!(response.status_code(), 401);

    let response = bearer(app.server.post("/bookings"), "not-a-jwt")
        .json(&upcoming("bike-1"))
        .await;
    assert_eq!(response.status_code(), 401);

    assert!(app.state.booking_store.scan_bookings().unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_validation() {
    let mut app = create_test_app();
    let token = token_for("user-1", EMAIL, &["customers"]);
    let now = Utc::now();

    let missing_price = json!({
        "bikeId": "bike-1",
        "startTime": now.to_rfc3339(),
        "endTime": (now + chrono::Duration::hours(1)).to_rfc3339(),
    });
    let response = bearer(app.server.post("/bookings"), &token)
        .json(&missing_price)
        .await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert!(body["reason"].as_str().unwrap().contains("price"));

    let backwards = booking_body("bike-1", now, now - chrono::Duration::hours(1));
    let response = bearer(app.server.post("/bookings"), &token)
        .json(&backwards)
        .await;
    assert_eq!(response.status_code(), 400);

    let bad_time = json!({
        "bikeId": "bike-1",
        "startTime": "next tuesday",
        "endTime": (now + chrono::Duration::hours(1)).to_rfc3339(),
        "price": 3.0,
    });
    let response = bearer(app.server.post("/bookings"), &token)
        .json(&bad_time)
        .await;
    assert_eq!(response.status_code(), 400);

    assert!(app.state.booking_store.scan_bookings().unwrap().is_empty());
    assert!(app.receiver.drain().is_empty());
}

#[tokio::test]
async fn test_booking_visibility() {
    let app = create_test_app();
    let owner = token_for("owner", "owner@example.com", &["customers"]);
    let other = token_for("other", "other@example.com", &["customers"]);
    let franchise = token_for("ops", "ops@example.com", &["franchise"]);

    let body: Value = bearer(app.server.post("/bookings"), &owner)
        .json(&upcoming("bike-1"))
        .await
        .json();
    let path = format!("/bookings/{}", body["bookingId"].as_str().unwrap());

    let response = bearer(app.server.get(&path), &owner).await;
    assert_eq!(response.status_code(), 200);
    let view: Value = response.json();
    assert_eq!(view["booking"]["userId"], "owner");
    assert_eq!(view["booking"]["status"], "REQUESTED");
    assert_eq!(view["booking"]["isUsed"], false);

    let response = bearer(app.server.get(&path), &other).await;
    assert_eq!(response.status_code(), 403);

    let response = bearer(app.server.get(&path), &franchise).await;
    assert_eq!(response.status_code(), 200);

    let response = bearer(app.server.get("/bookings/unknown"), &owner).await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_list_my_bookings() {
    let app = create_test_app();
    let mine = token_for("me", "me@example.com", &["customers"]);
    let theirs = token_for("them", "them@example.com", &["customers"]);

    for bike in ["bike-1", "bike-2"] {
        let response = bearer(app.server.post("/bookings"), &mine)
            .json(&upcoming(bike))
            .await;
        assert_eq!(response.status_code(), 200);
    }
    bearer(app.server.post("/bookings"), &theirs)
        .json(&upcoming("bike-3"))
        .await;

    let body: Value = bearer(app.server.get("/bookings/mine"), &mine).await.json();
    let bookings = body["bookings"].as_array().unwrap();
    assert_eq!(bookings.len(), 2);
    assert!(bookings.iter().all(|b| b["userId"] == "me"));
}
