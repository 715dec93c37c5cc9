//! Identity-provider custom-authentication trigger events
//!
//! The provider posts an event with a `request` and a `response` object and
//! expects the same event back with `response` filled in. Top-level fields
//! we don't model (`version`, `region`, `userName`, ...) are carried through
//! unchanged.

use dalscooter_core::ChallengeParameters;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Challenge name the provider uses for custom factors
pub const CUSTOM_CHALLENGE: &str = "CUSTOM_CHALLENGE";

/// The provider sends `null` for response fields it expects us to fill
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A trigger event with typed request and response parts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "Req: Deserialize<'de>, Resp: Default + Deserialize<'de>"))]
pub struct TriggerEvent<Req, Resp> {
    pub request: Req,
    #[serde(default, deserialize_with = "null_as_default")]
    pub response: Resp,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One prior round of the login attempt
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub challenge_result: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_metadata: Option<String>,
}

/// The user attributes the provider passes to triggers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserAttributes {
    #[serde(default, deserialize_with = "null_as_default")]
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefineRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub session: Vec<SessionEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_attributes: UserAttributes,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefineResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub issue_tokens: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fail_authentication: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub session: Vec<SessionEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_attributes: UserAttributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub public_challenge_parameters: ChallengeParameters,
    #[serde(default, deserialize_with = "null_as_default")]
    pub private_challenge_parameters: ChallengeParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_metadata: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_attributes: UserAttributes,
    #[serde(default, deserialize_with = "null_as_default")]
    pub private_challenge_parameters: ChallengeParameters,
    #[serde(default, deserialize_with = "null_as_default")]
    pub challenge_answer: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub answer_correct: bool,
}

pub type DefineAuthChallengeEvent = TriggerEvent<DefineRequest, DefineResponse>;
pub type CreateAuthChallengeEvent = TriggerEvent<CreateRequest, CreateResponse>;
pub type VerifyAuthChallengeEvent = TriggerEvent<VerifyRequest, VerifyResponse>;
