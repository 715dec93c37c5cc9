//! Define / Create / Verify handlers for the identity provider's custom
//! authentication flow

pub mod events;

pub use events::*;

use chrono::Utc;
use dalscooter_core::{
    define_next_step, verify_answer, Challenge, ChallengeKind, ChallengeParameters,
    SecurityQuestion, Verification,
};
use rand::Rng;

use crate::email::{templates, EmailMessage};
use crate::error::ApiError;
use crate::store::{UserId, UserStore};

/// Public parameter shown to the client when no challenge could be built
pub const CREATE_FAILED_MESSAGE: &str = "Failed to create challenge";

/// Decide the next step from the pass/fail history of this login attempt
pub fn define_auth_challenge(mut event: DefineAuthChallengeEvent) -> DefineAuthChallengeEvent {
    let history: Vec<bool> = event
        .request
        .session
        .iter()
        .map(|entry| entry.challenge_result)
        .collect();
    let step = define_next_step(&history);

    event.response = DefineResponse {
        challenge_name: step.challenge().map(|_| CUSTOM_CHALLENGE.to_string()),
        issue_tokens: step.issue_tokens(),
        fail_authentication: step.fail_authentication(),
    };

    tracing::info!(
        user_id = %event.request.user_attributes.sub,
        rounds = history.len(),
        ?step,
        "Defined next authentication step"
    );
    event
}

/// Build the challenge for the current factor
///
/// A user without security questions gets a generic error parameter and no
/// private parameters, so the following Verify fails. Store failures are
/// returned to the caller.
pub fn create_auth_challenge<U, R>(
    user_store: &U,
    mut event: CreateAuthChallengeEvent,
    rng: &mut R,
) -> Result<CreateAuthChallengeEvent, ApiError>
where
    U: UserStore + ?Sized,
    R: Rng + ?Sized,
{
    let factor = event.request.session.len();
    let user_id = event.request.user_attributes.sub.clone();

    let challenge = match ChallengeKind::for_factor(factor) {
        Some(ChallengeKind::SecurityQuestion) => {
            let questions: Vec<SecurityQuestion> = user_store
                .get_questions(&UserId(user_id.clone()))?
                .iter()
                .map(|record| record.to_question())
                .collect();
            Challenge::security_question(&user_id, &questions, rng)
        }
        Some(ChallengeKind::CaesarCipher) => Ok(Challenge::caesar(rng)),
        None => Err(dalscooter_core::Error::NoSuchFactor(factor)),
    };

    event.response = match challenge {
        Ok(challenge) => {
            tracing::info!(user_id = %user_id, kind = challenge.kind().as_str(), "Created challenge");
            CreateResponse {
                public_challenge_parameters: challenge.public.to_parameters(),
                private_challenge_parameters: challenge.private.to_parameters(),
                challenge_metadata: Some(challenge.kind().as_str().to_string()),
            }
        }
        Err(e) => {
            tracing::warn!(user_id = %user_id, factor, error = %e, "Could not create challenge");
            let mut public = ChallengeParameters::new();
            public.insert("error".into(), CREATE_FAILED_MESSAGE.into());
            CreateResponse {
                public_challenge_parameters: public,
                private_challenge_parameters: ChallengeParameters::new(),
                challenge_metadata: None,
            }
        }
    };

    Ok(event)
}

/// Result of the Verify step
pub struct VerifyOutcome {
    pub event: VerifyAuthChallengeEvent,
    pub verification: Verification,
    /// The final factor was answered correctly
    pub login_complete: bool,
}

/// Check the submitted answer against the private parameters
///
/// The client only learns `answerCorrect`; the failure reason is logged.
pub fn verify_auth_challenge(mut event: VerifyAuthChallengeEvent) -> VerifyOutcome {
    let private = &event.request.private_challenge_parameters;
    let verification = verify_answer(&event.request.challenge_answer, private);
    let kind = private
        .get("challengeType")
        .and_then(|kind| kind.parse::<ChallengeKind>().ok());
    let login_complete = verification.correct && kind.map_or(false, |k| k.is_final());

    let user_id = &event.request.user_attributes.sub;
    match &verification.failure {
        None => tracing::info!(user_id = %user_id, ?kind, "Challenge answered correctly"),
        Some(failure) => tracing::warn!(
            user_id = %user_id,
            code = failure.code(),
            reason = %failure,
            "Challenge verification failed"
        ),
    }

    event.response = VerifyResponse {
        answer_correct: verification.correct,
    };
    VerifyOutcome {
        event,
        verification,
        login_complete,
    }
}

/// The sign-in alert for a completed login, if the user has an email
pub fn login_notification(event: &VerifyAuthChallengeEvent) -> Option<EmailMessage> {
    let email = event.request.user_attributes.email.as_deref()?;
    Some(templates::login_alert(email, Utc::now()))
}
