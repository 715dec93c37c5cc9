//! Customer concern endpoints (bearer-authenticated)

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use dalscooter_core::{ConcernRequest, MessageId, MessageStatus, SupportMessage};
use serde::{Deserialize, Serialize};

use crate::auth::authenticate;
use crate::email::EmailSender;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::{BookingStore, UserStore};
use crate::support::{respond_to_concern, submit_concern};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitConcernRequest {
    #[serde(default)]
    pub content: String,
    pub booking_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitConcernResponse {
    pub success: bool,
    pub message: String,
    pub message_id: MessageId,
    pub status: MessageStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MyMessagesResponse {
    pub success: bool,
    pub messages: Vec<SupportMessage>,
    pub total_count: usize,
}

#[derive(Serialize)]
pub struct AssignedMessagesResponse {
    pub success: bool,
    pub messages: Vec<SupportMessage>,
    pub count: usize,
}

#[derive(Deserialize)]
pub struct RespondRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondResponse {
    pub success: bool,
    pub message: String,
    pub response_message_id: MessageId,
    pub concern: SupportMessage,
}

/// POST /concerns
/// Store a concern for the caller and queue it for assignment
pub async fn submit<U, B, E>(
    State(state): State<Arc<AppState<U, B, E>>>,
    headers: HeaderMap,
    Json(req): Json<SubmitConcernRequest>,
) -> Result<Json<SubmitConcernResponse>, ApiError>
where
    U: UserStore,
    B: BookingStore,
    E: EmailSender,
{
    let auth = authenticate(&state, &headers)?;
    let concern = submit_concern(
        state.support_store.as_ref(),
        state.concern_queue.as_ref(),
        ConcernRequest {
            user_id: auth.user_id,
            booking_id: req.booking_id,
            content: req.content,
        },
    )?;

    Ok(Json(SubmitConcernResponse {
        success: true,
        message: "Concern submitted successfully".into(),
        status: concern.status,
        message_id: concern.message_id,
    }))
}

/// GET /concerns/mine
/// The caller's concerns and the responses to them
pub async fn list_mine<U, B, E>(
    State(state): State<Arc<AppState<U, B, E>>>,
    headers: HeaderMap,
) -> Result<Json<MyMessagesResponse>, ApiError>
where
    U: UserStore,
    B: BookingStore,
    E: EmailSender,
{
    let auth = authenticate(&state, &headers)?;
    let messages = state.support_store.list_messages_for_user(&auth.user_id)?;

    Ok(Json(MyMessagesResponse {
        success: true,
        total_count: messages.len(),
        messages,
    }))
}

/// GET /concerns/assigned
/// Concerns assigned to the calling operator (franchise only)
pub async fn list_assigned<U, B, E>(
    State(state): State<Arc<AppState<U, B, E>>>,
    headers: HeaderMap,
) -> Result<Json<AssignedMessagesResponse>, ApiError>
where
    U: UserStore,
    B: BookingStore,
    E: EmailSender,
{
    let auth = authenticate(&state, &headers)?;
    if !auth.is_franchise() {
        return Err(ApiError::Forbidden);
    }
    let messages = state.support_store.list_messages_for_franchise(&auth.user_id)?;

    Ok(Json(AssignedMessagesResponse {
        success: true,
        count: messages.len(),
        messages,
    }))
}

/// POST /concerns/:id/respond
/// Answer a concern and resolve it (franchise only)
pub async fn respond<U, B, E>(
    State(state): State<Arc<AppState<U, B, E>>>,
    headers: HeaderMap,
    Path(concern_id): Path<String>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<RespondResponse>, ApiError>
where
    U: UserStore,
    B: BookingStore,
    E: EmailSender,
{
    let auth = authenticate(&state, &headers)?;
    if !auth.is_franchise() {
        return Err(ApiError::Forbidden);
    }

    let concern_id = MessageId(concern_id);
    let response = respond_to_concern(
        state.support_store.as_ref(),
        &auth.user_id,
        &concern_id,
        &req.content,
    )?;
    let concern = state
        .support_store
        .get_message(&concern_id)?
        .ok_or(ApiError::MessageNotFound)?;

    Ok(Json(RespondResponse {
        success: true,
        message: "Response submitted successfully".into(),
        response_message_id: response.message_id,
        concern,
    }))
}
