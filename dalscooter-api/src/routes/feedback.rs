//! Ride feedback endpoints (public)

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use dalscooter_core::{Feedback, FeedbackRequest, Polarity};
use serde::{Deserialize, Serialize};

use crate::email::EmailSender;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::{BookingStore, UserStore};
use crate::support::submit_feedback;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitFeedbackRequest {
    pub email: Option<String>,
    pub feedback_text: Option<String>,
    pub bike_type: Option<String>,
    pub bike_id: Option<String>,
    pub booking_reference: Option<String>,
}

impl From<SubmitFeedbackRequest> for FeedbackRequest {
    fn from(req: SubmitFeedbackRequest) -> Self {
        FeedbackRequest {
            email: req.email,
            feedback_text: req.feedback_text,
            bike_type: req.bike_type,
            bike_id: req.bike_id,
            booking_reference: req.booking_reference,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitFeedbackResponse {
    pub success: bool,
    pub message: String,
    pub feedback_id: String,
    pub polarity: Polarity,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFeedbackQuery {
    pub bike_id: Option<String>,
}

#[derive(Serialize)]
pub struct ListFeedbackResponse {
    pub success: bool,
    pub feedback: Vec<Feedback>,
    pub count: usize,
}

/// POST /feedback
pub async fn submit<U, B, E>(
    State(state): State<Arc<AppState<U, B, E>>>,
    Json(req): Json<SubmitFeedbackRequest>,
) -> Result<Json<SubmitFeedbackResponse>, ApiError>
where
    U: UserStore,
    B: BookingStore,
    E: EmailSender,
{
    let feedback = submit_feedback(
        state.support_store.as_ref(),
        state.sentiment.as_ref(),
        req.into(),
    )?;

    Ok(Json(SubmitFeedbackResponse {
        success: true,
        message: "Feedback submitted successfully".into(),
        feedback_id: feedback.feedback_id,
        polarity: feedback.polarity,
    }))
}

/// GET /feedback?bikeId=
pub async fn list<U, B, E>(
    State(state): State<Arc<AppState<U, B, E>>>,
    Query(query): Query<ListFeedbackQuery>,
) -> Result<Json<ListFeedbackResponse>, ApiError>
where
    U: UserStore,
    B: BookingStore,
    E: EmailSender,
{
    let bike_id = query.bike_id.as_deref().filter(|b| !b.trim().is_empty());
    let feedback = state.support_store.list_feedback(bike_id)?;

    Ok(Json(ListFeedbackResponse {
        success: true,
        count: feedback.len(),
        feedback,
    }))
}
