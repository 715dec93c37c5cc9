//! Concern intake, operator assignment and responses

use std::sync::Arc;

use chrono::Utc;
use dalscooter_core::{pick_operator, ConcernRequest, Group, MessageId, MessageStatus, SupportMessage};
use rand::Rng;

use crate::booking::approval::MAX_DELIVERY_ATTEMPTS;
use crate::crypto::generate_message_id;
use crate::email::{send_best_effort, templates, EmailSender};
use crate::error::ApiError;
use crate::queue::{QueueReceiver, WorkQueue};
use crate::state::AppState;
use crate::store::{BookingStore, MessageUpdate, SupportStore, UserStore};

/// What processing one concern message did
#[derive(Debug, Clone, PartialEq)]
pub enum ConcernOutcome {
    /// Handed to an operator
    Assigned { franchise_id: String, notified: bool },
    /// Already assigned or answered; nothing changed
    AlreadyHandled,
    /// No franchise operator exists; the concern stays open
    NoOperators,
    /// No such concern; the message is dropped
    NotFound,
}

/// Validate and store a concern, then queue it for assignment
///
/// Like bookings, the concern is written first. If queueing fails it stays
/// open and the caller sees a retryable error.
pub fn submit_concern<S>(
    store: &S,
    queue: &dyn WorkQueue<MessageId>,
    request: ConcernRequest,
) -> Result<SupportMessage, ApiError>
where
    S: SupportStore + ?Sized,
{
    request.validate()?;

    let concern = SupportMessage::concern(generate_message_id(), request, Utc::now());
    store.put_message(&concern)?;

    if let Err(e) = queue.enqueue(concern.message_id.clone()) {
        tracing::error!(
            message_id = %concern.message_id,
            error = %e,
            "Concern stored but not queued for assignment; it stays open"
        );
        return Err(e);
    }

    tracing::info!(message_id = %concern.message_id, user_id = %concern.user_id, "Concern submitted");
    Ok(concern)
}

/// Assign one concern to a random franchise operator and email them
///
/// The assignment is conditional on the concern still being open, so a
/// redelivered message never reassigns or re-notifies.
pub fn process_concern<U, S, E, R>(
    user_store: &U,
    support_store: &S,
    email_sender: &E,
    message_id: &MessageId,
    rng: &mut R,
) -> Result<ConcernOutcome, ApiError>
where
    U: UserStore + ?Sized,
    S: SupportStore + ?Sized,
    E: EmailSender + ?Sized,
    R: Rng + ?Sized,
{
    let Some(concern) = support_store.get_message(message_id)?.filter(|m| m.is_concern()) else {
        tracing::warn!(message_id = %message_id, "Concern not found; dropping message");
        return Ok(ConcernOutcome::NotFound);
    };
    if concern.status != MessageStatus::Open {
        tracing::info!(message_id = %message_id, status = concern.status.as_str(), "Concern already handled");
        return Ok(ConcernOutcome::AlreadyHandled);
    }

    let operators = user_store.list_users_in_group(Group::Franchise)?;
    let Some(operator) = pick_operator(&operators, rng) else {
        tracing::warn!(message_id = %message_id, "No franchise operators; concern stays open");
        return Ok(ConcernOutcome::NoOperators);
    };

    let concern = match support_store.assign_concern(message_id, &operator.id.0)? {
        MessageUpdate::Applied(concern) => concern,
        MessageUpdate::Unchanged(_) => return Ok(ConcernOutcome::AlreadyHandled),
        MessageUpdate::NotFound => return Ok(ConcernOutcome::NotFound),
    };
    tracing::info!(message_id = %message_id, franchise_id = %operator.id, "Concern assigned");

    let notified = send_best_effort(email_sender, &templates::concern_assigned(&operator.email, &concern));

    Ok(ConcernOutcome::Assigned {
        franchise_id: operator.id.0.clone(),
        notified,
    })
}

/// Answer a concern as a franchise operator
///
/// Stores the response and resolves the concern together. Any franchise
/// member may answer, and a resolved concern can be answered again.
pub fn respond_to_concern<S>(
    store: &S,
    franchise_id: &str,
    concern_id: &MessageId,
    content: &str,
) -> Result<SupportMessage, ApiError>
where
    S: SupportStore + ?Sized,
{
    let concern = store
        .get_message(concern_id)?
        .filter(|m| m.is_concern())
        .ok_or(ApiError::MessageNotFound)?;

    let response =
        SupportMessage::response_to(&concern, generate_message_id(), franchise_id, content, Utc::now())?;

    match store.resolve_concern(&response)? {
        MessageUpdate::Applied(_) | MessageUpdate::Unchanged(_) => {
            tracing::info!(message_id = %concern_id, franchise_id = %franchise_id, "Concern resolved");
            Ok(response)
        }
        MessageUpdate::NotFound => Err(ApiError::MessageNotFound),
    }
}

/// Consume the concern queue until every producer is gone
pub async fn run_concern_worker<U, B, E>(
    state: Arc<AppState<U, B, E>>,
    mut receiver: QueueReceiver<MessageId>,
) where
    U: UserStore + 'static,
    B: BookingStore + 'static,
    E: EmailSender + 'static,
{
    tracing::info!("Concern worker started");

    while let Some(batch) = receiver.recv_batch().await {
        for message in batch {
            let task_state = state.clone();
            let message_id = message.payload.clone();
            let result = tokio::task::spawn_blocking(move || {
                process_concern(
                    &task_state.user_store,
                    task_state.support_store.as_ref(),
                    &task_state.email_sender,
                    &message_id,
                    &mut rand::thread_rng(),
                )
            })
            .await;

            match result {
                Ok(Ok(outcome)) => {
                    tracing::debug!(message_id = %message.payload, ?outcome, "Concern message handled")
                }
                Ok(Err(e)) if e.is_retryable() && message.attempts + 1 < MAX_DELIVERY_ATTEMPTS => {
                    tracing::warn!(
                        message_id = %message.payload,
                        attempt = message.attempts + 1,
                        error = %e,
                        "Concern assignment failed; redelivering"
                    );
                    if let Err(e) = state.concern_queue.send(message.redelivery()) {
                        tracing::error!(message_id = %message.payload, error = %e, "Could not redeliver concern message");
                    }
                }
                Ok(Err(e)) => {
                    tracing::error!(message_id = %message.payload, error = %e, "Concern assignment failed; dropping message")
                }
                Err(e) => {
                    tracing::error!(message_id = %message.payload, error = %e, "Concern task panicked")
                }
            }
        }
    }

    tracing::info!("Concern worker stopped");
}
