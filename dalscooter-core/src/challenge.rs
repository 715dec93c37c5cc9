//! Custom authentication challenge policy
//!
//! After the password check, a login must pass two more factors in a fixed
//! order: one of the user's security questions, then a Caesar cipher. The
//! identity provider drives three steps per round:
//!
//! - **Define** looks at the pass/fail history and picks what happens next
//! - **Create** builds the challenge for the current factor, splitting it
//!   into public parameters (sent to the client) and private parameters
//!   (the expected answer, kept by the identity provider)
//! - **Verify** checks the client's answer against the private parameters
//!
//! The first wrong answer ends the login attempt.

use std::collections::BTreeMap;
use std::str::FromStr;

use rand::Rng;

use crate::answer::answer_matches;
use crate::cipher;
use crate::{Error, Result};

/// String parameters exchanged with the identity provider
pub type ChallengeParameters = BTreeMap<String, String>;

const PARAM_CHALLENGE_TYPE: &str = "challengeType";
const PARAM_ANSWER: &str = "answer";

/// The custom factors, in the order they are presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeKind {
    /// Factor 2: answer one of the questions chosen at registration
    SecurityQuestion,
    /// Factor 3: decode a Caesar-shifted word
    CaesarCipher,
}

impl ChallengeKind {
    /// Number of custom factors a login must pass
    pub const FACTOR_COUNT: usize = 2;

    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeKind::SecurityQuestion => "SECURITY_QUESTION",
            ChallengeKind::CaesarCipher => "CAESAR_CIPHER",
        }
    }

    /// The factor presented after `index` completed challenges
    pub fn for_factor(index: usize) -> Option<Self> {
        match index {
            0 => Some(ChallengeKind::SecurityQuestion),
            1 => Some(ChallengeKind::CaesarCipher),
            _ => None,
        }
    }

    pub fn factor_index(&self) -> usize {
        match self {
            ChallengeKind::SecurityQuestion => 0,
            ChallengeKind::CaesarCipher => 1,
        }
    }

    /// Whether passing this factor completes the login
    pub fn is_final(&self) -> bool {
        self.factor_index() + 1 == Self::FACTOR_COUNT
    }
}

impl FromStr for ChallengeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SECURITY_QUESTION" => Ok(ChallengeKind::SecurityQuestion),
            "CAESAR_CIPHER" => Ok(ChallengeKind::CaesarCipher),
            _ => Err(Error::Unrecognized {
                kind: "challenge type",
                value: s.to_string(),
            }),
        }
    }
}

/// Decision returned by the Define step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Present another custom challenge
    Present(ChallengeKind),
    /// Every factor passed
    IssueTokens,
    /// The attempt is over
    Fail,
}

impl NextStep {
    pub fn challenge(&self) -> Option<ChallengeKind> {
        match self {
            NextStep::Present(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn issue_tokens(&self) -> bool {
        matches!(self, NextStep::IssueTokens)
    }

    pub fn fail_authentication(&self) -> bool {
        matches!(self, NextStep::Fail)
    }
}

/// Decide the next step from the ordered results of previous challenges.
///
/// The factor index is the history length. Any failure is terminal, and a
/// history longer than the number of factors fails outright.
pub fn define_next_step(results: &[bool]) -> NextStep {
    if results.len() > ChallengeKind::FACTOR_COUNT {
        return NextStep::Fail;
    }
    if results.iter().any(|passed| !passed) {
        return NextStep::Fail;
    }
    match ChallengeKind::for_factor(results.len()) {
        Some(kind) => NextStep::Present(kind),
        None => NextStep::IssueTokens,
    }
}

/// A stored security question as the challenge sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityQuestion {
    pub question_id: String,
    pub text: String,
    pub answer_hash: String,
}

/// What the client is shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicChallenge {
    SecurityQuestion { question_id: String, question: String },
    CaesarCipher { cipher_text: String, shift: u8 },
}

impl PublicChallenge {
    pub fn kind(&self) -> ChallengeKind {
        match self {
            PublicChallenge::SecurityQuestion { .. } => ChallengeKind::SecurityQuestion,
            PublicChallenge::CaesarCipher { .. } => ChallengeKind::CaesarCipher,
        }
    }

    pub fn to_parameters(&self) -> ChallengeParameters {
        let mut params = ChallengeParameters::new();
        params.insert(PARAM_CHALLENGE_TYPE.into(), self.kind().as_str().into());
        match self {
            PublicChallenge::SecurityQuestion {
                question_id,
                question,
            } => {
                params.insert("question".into(), question.clone());
                params.insert("questionId".into(), question_id.clone());
                params.insert(
                    "instructions".into(),
                    "Please answer your security question".into(),
                );
            }
            PublicChallenge::CaesarCipher { cipher_text, shift } => {
                params.insert("cipherText".into(), cipher_text.clone());
                params.insert("shift".into(), shift.to_string());
                params.insert(
                    "instructions".into(),
                    format!("Decode this Caesar cipher (shift: {})", shift),
                );
                params.insert(
                    "hint".into(),
                    "Enter the original text that was encoded".into(),
                );
            }
        }
        params
    }
}

/// The expected answer, held by the identity provider between Create and
/// Verify. For security questions this is the stored hash, never plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateChallenge {
    pub kind: ChallengeKind,
    pub answer: String,
}

impl PrivateChallenge {
    pub fn to_parameters(&self) -> ChallengeParameters {
        let mut params = ChallengeParameters::new();
        params.insert(PARAM_ANSWER.into(), self.answer.clone());
        params.insert(PARAM_CHALLENGE_TYPE.into(), self.kind.as_str().into());
        params
    }

    /// Check a submitted answer
    pub fn verify(&self, submitted: &str) -> Verification {
        let correct = match self.kind {
            ChallengeKind::SecurityQuestion => answer_matches(submitted, &self.answer),
            ChallengeKind::CaesarCipher => submitted.trim().to_uppercase() == self.answer,
        };
        if correct {
            Verification::correct()
        } else {
            Verification::incorrect(VerifyFailure::WrongAnswer(self.kind))
        }
    }
}

/// A freshly created challenge
#[derive(Debug, Clone)]
pub struct Challenge {
    pub public: PublicChallenge,
    pub private: PrivateChallenge,
}

impl Challenge {
    pub fn kind(&self) -> ChallengeKind {
        self.private.kind
    }

    /// Build a security-question challenge from one of the user's questions,
    /// chosen uniformly at random.
    pub fn security_question<R: Rng + ?Sized>(
        user_id: &str,
        questions: &[SecurityQuestion],
        rng: &mut R,
    ) -> Result<Self> {
        if questions.is_empty() {
            return Err(Error::NoQuestionsFound {
                user_id: user_id.to_string(),
            });
        }
        let picked = &questions[rng.gen_range(0..questions.len())];
        Ok(Self {
            public: PublicChallenge::SecurityQuestion {
                question_id: picked.question_id.clone(),
                question: picked.text.clone(),
            },
            private: PrivateChallenge {
                kind: ChallengeKind::SecurityQuestion,
                answer: picked.answer_hash.clone(),
            },
        })
    }

    /// Build a cipher challenge with a random vocabulary word and shift
    pub fn caesar<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let word = cipher::random_word(rng);
        let shift = cipher::random_shift(rng);
        Self::build_caesar(word, shift)
    }

    /// Build a cipher challenge for a fixed word and shift
    pub fn caesar_with(word: &str, shift: u8) -> Result<Self> {
        let shift = cipher::validate_shift(shift)?;
        Ok(Self::build_caesar(word, shift))
    }

    fn build_caesar(word: &str, shift: u8) -> Self {
        let plaintext = word.trim().to_uppercase();
        Self {
            public: PublicChallenge::CaesarCipher {
                cipher_text: cipher::encrypt(&plaintext, shift),
                shift,
            },
            private: PrivateChallenge {
                kind: ChallengeKind::CaesarCipher,
                answer: plaintext,
            },
        }
    }
}

/// Why a verification did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyFailure {
    /// The answer did not match
    WrongAnswer(ChallengeKind),
    /// The private parameters named a challenge type we do not issue
    UnknownChallenge(String),
    /// The private parameters were incomplete
    MalformedParameters,
}

impl VerifyFailure {
    /// Code recorded in logs for this failure
    pub fn code(&self) -> &'static str {
        match self {
            VerifyFailure::WrongAnswer(kind) => kind.as_str(),
            VerifyFailure::UnknownChallenge(_) => "UNKNOWN_CHALLENGE",
            VerifyFailure::MalformedParameters => "VERIFICATION_ERROR",
        }
    }
}

impl std::fmt::Display for VerifyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyFailure::WrongAnswer(ChallengeKind::SecurityQuestion) => {
                write!(f, "The security question answer is incorrect")
            }
            VerifyFailure::WrongAnswer(ChallengeKind::CaesarCipher) => {
                write!(f, "The cipher solution is incorrect")
            }
            VerifyFailure::UnknownChallenge(kind) => write!(f, "Unknown challenge type: {}", kind),
            VerifyFailure::MalformedParameters => write!(f, "Challenge verification failed"),
        }
    }
}

/// Result of the Verify step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub correct: bool,
    pub failure: Option<VerifyFailure>,
}

impl Verification {
    pub fn correct() -> Self {
        Self {
            correct: true,
            failure: None,
        }
    }

    pub fn incorrect(failure: VerifyFailure) -> Self {
        Self {
            correct: false,
            failure: Some(failure),
        }
    }
}

/// Verify a submitted answer against the private parameters produced by
/// Create. Unknown or incomplete parameters are always incorrect.
pub fn verify_answer(submitted: &str, private: &ChallengeParameters) -> Verification {
    let Some(kind) = private.get(PARAM_CHALLENGE_TYPE) else {
        return Verification::incorrect(VerifyFailure::MalformedParameters);
    };
    let Ok(kind) = kind.parse::<ChallengeKind>() else {
        return Verification::incorrect(VerifyFailure::UnknownChallenge(kind.clone()));
    };
    let Some(answer) = private.get(PARAM_ANSWER) else {
        return Verification::incorrect(VerifyFailure::MalformedParameters);
    };
    PrivateChallenge {
        kind,
        answer: answer.clone(),
    }
    .verify(submitted)
}
