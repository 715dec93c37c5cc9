//! SMTP-based email sender for booking and login notifications

use lettre::{
    message::{header::ContentType, MultiPart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};

use super::{EmailMessage, EmailSender};

/// Configuration for SMTP email sending
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP server host (e.g., "email-smtp.us-east-1.amazonaws.com")
    pub host: String,
    /// SMTP server port (typically 465 for TLS, 587 for STARTTLS)
    pub port: u16,
    /// SMTP username
    pub username: String,
    /// SMTP password (or the provider's SMTP credential)
    pub password: String,
    /// From email address
    pub from_email: String,
    /// Display name shown to riders
    pub from_name: Option<String>,
}

/// Display name used when SMTP_FROM_NAME is not set
pub const DEFAULT_FROM_NAME: &str = "DalScooter";

impl SmtpConfig {
    /// Create config from environment variables
    ///
    /// Required:
    /// - SMTP_HOST
    /// - SMTP_USERNAME
    /// - SMTP_PASSWORD
    /// - SMTP_FROM_EMAIL
    ///
    /// Optional:
    /// - SMTP_PORT (default: 465)
    /// - SMTP_FROM_NAME (default: "DalScooter")
    pub fn from_env() -> Option<Self> {
        // Helper to get non-empty env var
        fn get_env(key: &str) -> Option<String> {
            std::env::var(key).ok().filter(|s| !s.is_empty())
        }

        let host = get_env("SMTP_HOST")?;
        let username = get_env("SMTP_USERNAME")?;
        let password = get_env("SMTP_PASSWORD")?;
        let from_email = get_env("SMTP_FROM_EMAIL")?;

        let port = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(465);

        let from_name = get_env("SMTP_FROM_NAME").or_else(|| Some(DEFAULT_FROM_NAME.to_string()));

        Some(Self {
            host,
            port,
            username,
            password,
            from_email,
            from_name,
        })
    }
}

/// SMTP email sender for production use
pub struct SmtpEmailSender {
    transport: SmtpTransport,
    from_email: String,
    from_name: Option<String>,
}

impl SmtpEmailSender {
    /// Create a new SMTP email sender
    pub fn new(config: SmtpConfig) -> Result<Self, String> {
        let creds = Credentials::new(config.username, config.password);

        let transport = SmtpTransport::relay(&config.host)
            .map_err(|e| format!("Failed to create SMTP transport: {}", e))?
            .port(config.port)
            .credentials(creds)
            .build();

        // Test the connection
        transport
            .test_connection()
            .map_err(|e| format!("SMTP connection test failed: {}", e))?;

        tracing::info!(host = %config.host, port = config.port, "SMTP connection established");

        Ok(Self {
            transport,
            from_email: config.from_email,
            from_name: config.from_name,
        })
    }

    fn from_address(&self) -> String {
        match &self.from_name {
            Some(name) => format!("{} <{}>", name, self.from_email),
            None => self.from_email.clone(),
        }
    }

    fn build(&self, message: &EmailMessage) -> Result<Message, String> {
        build_message(&self.from_address(), message)
    }
}

/// Build a MIME message; HTML bodies go out as multipart/alternative with
/// the plain-text body as fallback
fn build_message(from: &str, message: &EmailMessage) -> Result<Message, String> {
    let from = from
        .parse()
        .map_err(|e| format!("Invalid from address: {}", e))?;

    let to_addr = message
        .to
        .parse()
        .map_err(|e| format!("Invalid to address: {}", e))?;

    let builder = Message::builder()
        .from(from)
        .to(to_addr)
        .subject(message.subject.as_str());

    let email = match &message.body_html {
        Some(html) => builder.multipart(MultiPart::alternative_plain_html(
            message.body_text.clone(),
            html.clone(),
        )),
        None => builder
            .header(ContentType::TEXT_PLAIN)
            .body(message.body_text.clone()),
    };

    email.map_err(|e| format!("Failed to build email: {}", e))
}

impl EmailSender for SmtpEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<(), String> {
        let email = self.build(message)?;

        self.transport
            .send(&email)
            .map_err(|e| format!("Failed to send email: {}", e))?;

        tracing::info!(to = %message.to, subject = %message.subject, "Email sent");
        Ok(())
    }
}
