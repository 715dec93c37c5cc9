//! Account registration endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use dalscooter_core::{hash_answer, Group, SecurityQuestion};
use serde::{Deserialize, Serialize};

use crate::crypto::hash_password;
use crate::email::{send_best_effort, templates, EmailSender};
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::{BookingStore, NewUser, UserStore};

/// Minimum password length
const MIN_PASSWORD_LENGTH: usize = 8;
/// Maximum password length
const MAX_PASSWORD_LENGTH: usize = 80;
/// Security questions required at registration
const REQUIRED_QUESTIONS: usize = 3;

#[derive(Deserialize)]
pub struct SecurityQuestionInput {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    /// "customer" (default) or "franchise"
    #[serde(default)]
    pub user_type: Option<String>,
    #[serde(default)]
    pub security_questions: Vec<SecurityQuestionInput>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    pub user_id: String,
    pub message: String,
}

impl RegisterRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let required = [&self.email, &self.password, &self.first_name, &self.last_name];
        if required.iter().any(|v| v.trim().is_empty()) || self.security_questions.is_empty() {
            return Err(ApiError::ValidationError("Missing required fields".into()));
        }
        if !self.email.contains('@') {
            return Err(ApiError::ValidationError("Invalid email address".into()));
        }
        // Limits count characters, not bytes
        let password_length = self.password.chars().count();
        if password_length < MIN_PASSWORD_LENGTH {
            return Err(ApiError::PasswordTooShort);
        }
        if password_length > MAX_PASSWORD_LENGTH {
            return Err(ApiError::PasswordTooLong);
        }
        if self.security_questions.len() != REQUIRED_QUESTIONS {
            return Err(ApiError::ValidationError(
                "Must provide exactly 3 security questions".into(),
            ));
        }
        if self
            .security_questions
            .iter()
            .any(|q| q.question.trim().is_empty() || q.answer.trim().is_empty())
        {
            return Err(ApiError::ValidationError(
                "Security questions need both a question and an answer".into(),
            ));
        }
        Ok(())
    }

    fn group(&self) -> Group {
        match self.user_type.as_deref() {
            Some("franchise") => Group::Franchise,
            _ => Group::Customers,
        }
    }

    fn questions(&self) -> Vec<SecurityQuestion> {
        self.security_questions
            .iter()
            .enumerate()
            .map(|(i, q)| SecurityQuestion {
                question_id: format!("q{}", i + 1),
                text: q.question.trim().to_string(),
                answer_hash: hash_answer(&q.answer),
            })
            .collect()
    }
}

/// POST /register
/// Create a confirmed account with its group and security questions
pub async fn register<U, B, E>(
    State(state): State<Arc<AppState<U, B, E>>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError>
where
    U: UserStore,
    B: BookingStore,
    E: EmailSender,
{
    req.validate()?;

    if state.user_store.get_user_by_email(req.email.trim())?.is_some() {
        return Err(ApiError::EmailAlreadyExists);
    }

    let password_hash =
        hash_password(&req.password).map_err(|e| ApiError::Internal(e.to_string()))?;

    let new_user = NewUser {
        email: req.email.trim().to_lowercase(),
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
    };
    let user_id = state.user_store.create_user(&new_user, &password_hash)?;
    state.user_store.confirm_user(&user_id)?;

    let group = req.group();
    state.user_store.add_to_group(&user_id, group)?;
    state.user_store.put_questions(&user_id, &req.questions())?;

    tracing::info!(user_id = %user_id, group = group.as_str(), "User registered");

    send_best_effort(
        &state.email_sender,
        &templates::welcome(&new_user.email, &new_user.first_name),
    );

    Ok(Json(RegisterResponse {
        success: true,
        user_id: user_id.0,
        message: "Registration successful!".into(),
    }))
}
