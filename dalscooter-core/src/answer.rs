//! Security-question answer hashing
//!
//! Answers are stored as the SHA-256 hex digest of the normalized answer, so
//! "  Halifax " and "halifax" hash identically while the stored value stays
//! one-way.

use sha2::{Digest, Sha256};

/// Normalize a security answer before hashing (trimmed, lowercase)
pub fn normalize_answer(answer: &str) -> String {
    answer.trim().to_lowercase()
}

/// Hash a security answer for storage or comparison
pub fn hash_answer(answer: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_answer(answer).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Check a submitted answer against a stored hash
pub fn answer_matches(submitted: &str, stored_hash: &str) -> bool {
    hash_answer(submitted) == stored_hash
}
