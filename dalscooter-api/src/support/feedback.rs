//! Ride feedback and sentiment analysis

use chrono::Utc;
use dalscooter_core::{Feedback, FeedbackRequest, Polarity};

use crate::crypto::generate_feedback_id;
use crate::error::ApiError;
use crate::store::SupportStore;

/// Classifies the sentiment of free text
///
/// Feedback is stored even when analysis fails; the polarity is then
/// `Unknown` and `analyzed_at` stays empty.
pub trait SentimentAnalyzer: Send + Sync {
    fn analyze(&self, text: &str) -> Result<Polarity, String>;
}

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "amazing", "love", "smooth", "easy", "fast", "friendly",
    "comfortable", "clean", "awesome", "fantastic", "perfect", "helpful", "nice",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "poor", "terrible", "awful", "hate", "broken", "slow", "dirty", "difficult",
    "flat", "rude", "worst", "unsafe", "late", "expensive", "noisy",
];

/// Word-list classifier used when no external analyzer is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconSentiment;

impl LexiconSentiment {
    pub fn new() -> Self {
        Self
    }
}

impl SentimentAnalyzer for LexiconSentiment {
    fn analyze(&self, text: &str) -> Result<Polarity, String> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let positive = words.iter().any(|w| POSITIVE_WORDS.contains(w));
        let negative = words.iter().any(|w| NEGATIVE_WORDS.contains(w));

        Ok(match (positive, negative) {
            (true, true) => Polarity::Mixed,
            (true, false) => Polarity::Positive,
            (false, true) => Polarity::Negative,
            (false, false) => Polarity::Neutral,
        })
    }
}

/// Analyze and store a piece of feedback
pub fn submit_feedback<S, A>(
    store: &S,
    analyzer: &A,
    request: FeedbackRequest,
) -> Result<Feedback, ApiError>
where
    S: SupportStore + ?Sized,
    A: SentimentAnalyzer + ?Sized,
{
    let mut feedback = request.into_feedback(generate_feedback_id(), Utc::now())?;

    match analyzer.analyze(&feedback.feedback_text) {
        Ok(polarity) => {
            feedback.polarity = polarity;
            feedback.analyzed_at = Some(Utc::now());
        }
        Err(e) => {
            tracing::warn!(feedback_id = %feedback.feedback_id, error = %e, "Sentiment analysis failed; storing feedback unanalyzed");
        }
    }

    store.put_feedback(&feedback)?;
    tracing::info!(
        feedback_id = %feedback.feedback_id,
        bike_id = %feedback.bike_id,
        polarity = feedback.polarity.as_str(),
        "Feedback stored"
    );
    Ok(feedback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemorySupportStore;

    struct Unavailable;

    impl SentimentAnalyzer for Unavailable {
        fn analyze(&self, _text: &str) -> Result<Polarity, String> {
            Err("analyzer offline".into())
        }
    }

    #[test]
    fn test_lexicon_polarity() {
        let lexicon = LexiconSentiment::new();
        assert_eq!(lexicon.analyze("Great scooter, smooth ride!").unwrap(), Polarity::Positive);
        assert_eq!(lexicon.analyze("The tyre was FLAT.").unwrap(), Polarity::Negative);
        assert_eq!(lexicon.analyze("Fast but dirty").unwrap(), Polarity::Mixed);
        assert_eq!(lexicon.analyze("Picked it up at noon").unwrap(), Polarity::Neutral);
        // Substrings do not count
        assert_eq!(lexicon.analyze("goodbye flatland").unwrap(), Polarity::Neutral);
    }

    #[test]
    fn test_submit_stores_analyzed_feedback() {
        let store = InMemorySupportStore::new();
        let feedback = submit_feedback(
            &store,
            &LexiconSentiment::new(),
            FeedbackRequest {
                feedback_text: Some("Really easy to unlock".into()),
                bike_id: Some("EBK-001".into()),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(feedback.polarity, Polarity::Positive);
        assert!(feedback.analyzed_at.is_some());
        assert_eq!(store.list_feedback(Some("EBK-001")).unwrap(), vec![feedback]);
    }

    #[test]
    fn test_analysis_failure_still_stores() {
        let store = InMemorySupportStore::new();
        let feedback = submit_feedback(
            &store,
            &Unavailable,
            FeedbackRequest {
                feedback_text: Some("Fine".into()),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(feedback.polarity, Polarity::Unknown);
        assert!(feedback.analyzed_at.is_none());
        assert_eq!(store.list_feedback(None).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_text_stores_nothing() {
        let store = InMemorySupportStore::new();
        let result = submit_feedback(&store, &LexiconSentiment::new(), FeedbackRequest::default());
        assert!(matches!(result, Err(ApiError::ValidationError(_))));
        assert!(store.list_feedback(None).unwrap().is_empty());
    }
}
