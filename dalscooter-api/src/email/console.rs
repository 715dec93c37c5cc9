//! Console-based email sender for development

use super::{EmailMessage, EmailSender};

/// Email sender that logs to console (for development)
pub struct ConsoleEmailSender;

impl ConsoleEmailSender {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleEmailSender {
    fn default() -> Self {
        Self::new()
    }
}

impl EmailSender for ConsoleEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<(), String> {
        println!();
        println!("========================================");
        println!("  TO: {}", message.to);
        println!("  SUBJECT: {}", message.subject);
        println!("----------------------------------------");
        println!("{}", message.body_text);
        println!("========================================");
        println!();

        tracing::info!(to = %message.to, subject = %message.subject, "Email written to console");

        Ok(())
    }
}
