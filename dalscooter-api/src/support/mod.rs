//! Customer support: concerns routed to franchise operators, and ride feedback

pub mod concern;
pub mod feedback;

pub use concern::{
    process_concern, respond_to_concern, run_concern_worker, submit_concern, ConcernOutcome,
};
pub use feedback::{submit_feedback, LexiconSentiment, SentimentAnalyzer};
