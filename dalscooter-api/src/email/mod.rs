//! Email sending abstractions

pub mod console;
pub mod smtp;
pub mod templates;

pub use console::ConsoleEmailSender;
pub use smtp::{SmtpConfig, SmtpEmailSender};

/// An outgoing email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
}

/// Trait for dispatching notification emails
///
/// Callers treat delivery as best-effort: an `Err` is logged, never
/// propagated into the operation that triggered the email.
pub trait EmailSender: Send + Sync {
    fn send(&self, message: &EmailMessage) -> Result<(), String>;
}

/// Allow using Box<dyn EmailSender> as an EmailSender
impl EmailSender for Box<dyn EmailSender> {
    fn send(&self, message: &EmailMessage) -> Result<(), String> {
        (**self).send(message)
    }
}

/// Send an email, logging instead of failing
///
/// Returns whether the sender accepted the message.
pub fn send_best_effort<E: EmailSender + ?Sized>(sender: &E, message: &EmailMessage) -> bool {
    match sender.send(message) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(to = %message.to, subject = %message.subject, error = %e, "Notification email failed");
            false
        }
    }
}
