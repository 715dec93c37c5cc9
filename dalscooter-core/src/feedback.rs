//! Ride feedback and its sentiment

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Overall sentiment of a piece of feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Polarity {
    Positive,
    Negative,
    Neutral,
    Mixed,
    /// Not analyzed, or analysis failed
    Unknown,
}

impl Polarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Positive => "POSITIVE",
            Polarity::Negative => "NEGATIVE",
            Polarity::Neutral => "NEUTRAL",
            Polarity::Mixed => "MIXED",
            Polarity::Unknown => "UNKNOWN",
        }
    }
}

impl std::str::FromStr for Polarity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "POSITIVE" => Ok(Polarity::Positive),
            "NEGATIVE" => Ok(Polarity::Negative),
            "NEUTRAL" => Ok(Polarity::Neutral),
            "MIXED" => Ok(Polarity::Mixed),
            "UNKNOWN" => Ok(Polarity::Unknown),
            _ => Err(Error::Unrecognized {
                kind: "polarity",
                value: s.to_string(),
            }),
        }
    }
}

/// Stored feedback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub feedback_id: String,
    /// Author, or "anonymous"
    pub email: String,
    pub feedback_text: String,
    pub bike_type: String,
    pub bike_id: String,
    pub booking_reference: String,
    pub polarity: Polarity,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub analyzed_at: Option<DateTime<Utc>>,
}

/// Submitted feedback; only the text is required
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackRequest {
    pub email: Option<String>,
    pub feedback_text: Option<String>,
    pub bike_type: Option<String>,
    pub bike_id: Option<String>,
    pub booking_reference: Option<String>,
}

fn or_default(value: Option<String>, default: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl FeedbackRequest {
    /// Fill in defaults; the result is not yet analyzed
    pub fn into_feedback(self, feedback_id: String, now: DateTime<Utc>) -> Result<Feedback> {
        let feedback_text = self
            .feedback_text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(Error::MissingField("feedback_text"))?;

        Ok(Feedback {
            feedback_id,
            email: or_default(self.email, "anonymous"),
            feedback_text,
            bike_type: or_default(self.bike_type, "unknown"),
            bike_id: or_default(self.bike_id, "unknown"),
            booking_reference: or_default(self.booking_reference, "N/A"),
            polarity: Polarity::Unknown,
            created_at: now,
            analyzed_at: None,
        })
    }
}
