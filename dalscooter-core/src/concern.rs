//! Customer concerns and franchise responses
//!
//! A customer raises a concern, which is queued and handed to a randomly
//! chosen franchise operator. The operator answers with a response message
//! and the concern is resolved:
//!
//! ```text
//! OPEN --assign--> ASSIGNED --respond--> RESOLVED
//!   |                                       ^
//!   +----------------respond----------------+
//! ```

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Unique identifier of a concern or response
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Concern,
    Response,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Concern => "concern",
            MessageKind::Response => "response",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Waiting for an operator
    Open,
    /// Handed to a franchise operator
    Assigned,
    /// Answered
    Resolved,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Open => "open",
            MessageStatus::Assigned => "assigned",
            MessageStatus::Resolved => "resolved",
        }
    }
}

impl FromStr for MessageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "concern" => Ok(MessageKind::Concern),
            "response" => Ok(MessageKind::Response),
            _ => Err(Error::Unrecognized {
                kind: "message type",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for MessageStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(MessageStatus::Open),
            "assigned" => Ok(MessageStatus::Assigned),
            "resolved" => Ok(MessageStatus::Resolved),
            _ => Err(Error::Unrecognized {
                kind: "message status",
                value: s.to_string(),
            }),
        }
    }
}

/// A concern or a response to one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportMessage {
    pub message_id: MessageId,
    #[serde(rename = "messageType")]
    pub kind: MessageKind,
    /// The customer the conversation belongs to
    pub user_id: String,
    /// Operator handling the concern, or the responder
    pub franchise_id: Option<String>,
    pub booking_id: Option<String>,
    pub content: String,
    pub status: MessageStatus,
    /// The concern a response answers
    pub in_reply_to: Option<MessageId>,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// A customer's concern, before it is stored
#[derive(Debug, Clone, PartialEq)]
pub struct ConcernRequest {
    pub user_id: String,
    pub booking_id: Option<String>,
    pub content: String,
}

impl ConcernRequest {
    pub fn validate(&self) -> Result<()> {
        if self.content.trim().is_empty() {
            return Err(Error::MissingField("content"));
        }
        Ok(())
    }
}

impl SupportMessage {
    /// A new, unassigned concern
    pub fn concern(message_id: MessageId, request: ConcernRequest, now: DateTime<Utc>) -> Self {
        Self {
            message_id,
            kind: MessageKind::Concern,
            user_id: request.user_id,
            franchise_id: None,
            booking_id: request.booking_id.filter(|b| !b.trim().is_empty()),
            content: request.content.trim().to_string(),
            status: MessageStatus::Open,
            in_reply_to: None,
            created_at: now,
        }
    }

    /// An operator's answer to `concern`
    pub fn response_to(
        concern: &SupportMessage,
        message_id: MessageId,
        franchise_id: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if concern.kind != MessageKind::Concern {
            return Err(Error::Unrecognized {
                kind: "concern",
                value: concern.message_id.0.clone(),
            });
        }
        if content.trim().is_empty() {
            return Err(Error::MissingField("content"));
        }
        Ok(Self {
            message_id,
            kind: MessageKind::Response,
            user_id: concern.user_id.clone(),
            franchise_id: Some(franchise_id.to_string()),
            booking_id: concern.booking_id.clone(),
            content: content.trim().to_string(),
            status: MessageStatus::Resolved,
            in_reply_to: Some(concern.message_id.clone()),
            created_at: now,
        })
    }

    pub fn is_concern(&self) -> bool {
        self.kind == MessageKind::Concern
    }
}

/// Pick the operator a concern is handed to, uniformly at random
pub fn pick_operator<'a, T, R: Rng + ?Sized>(operators: &'a [T], rng: &mut R) -> Option<&'a T> {
    operators.choose(rng)
}
