//! Caesar cipher used by the second login factor
//!
//! Only ASCII letters are shifted; upper and lower case wrap independently
//! and every other character passes through unchanged.

use rand::Rng;

use crate::{Error, Result};

/// Words the cipher challenge draws its plaintext from
pub const VOCABULARY: &[&str] = &[
    "DALSCOOTER",
    "BIKERENTAL",
    "FRANCHISE",
    "CUSTOMER",
    "SECURITY",
    "AUTHENTICATION",
    "SERVERLESS",
    "BOOKING",
];

/// Smallest shift ever drawn (0 would leave the text unchanged)
pub const MIN_SHIFT: u8 = 1;
/// Largest shift ever drawn (26 wraps back to the plaintext)
pub const MAX_SHIFT: u8 = 25;

const ALPHABET_LEN: u8 = 26;

fn shift_char(c: char, shift: u8) -> char {
    let base = match c {
        'A'..='Z' => b'A',
        'a'..='z' => b'a',
        _ => return c,
    };
    let offset = (c as u8 - base + shift % ALPHABET_LEN) % ALPHABET_LEN;
    (base + offset) as char
}

/// Shift every letter of `text` forward by `shift` places
pub fn encrypt(text: &str, shift: u8) -> String {
    text.chars().map(|c| shift_char(c, shift)).collect()
}

/// Undo [`encrypt`] with the same shift
pub fn decrypt(text: &str, shift: u8) -> String {
    let back = ALPHABET_LEN - shift % ALPHABET_LEN;
    encrypt(text, back)
}

/// Check that a shift is one the challenge may present
pub fn validate_shift(shift: u8) -> Result<u8> {
    if (MIN_SHIFT..=MAX_SHIFT).contains(&shift) {
        Ok(shift)
    } else {
        Err(Error::InvalidShift(shift))
    }
}

/// Draw a shift uniformly from 1..=25
pub fn random_shift<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    rng.gen_range(MIN_SHIFT..=MAX_SHIFT)
}

/// Draw a plaintext word uniformly from [`VOCABULARY`]
pub fn random_word<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    VOCABULARY[rng.gen_range(0..VOCABULARY.len())]
}
