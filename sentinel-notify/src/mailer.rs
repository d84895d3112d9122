//! The `Mailer` seam and its SMTP submission implementation.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::smtp::{ClientError, SmtpClient};

/// A composed alert email, envelope included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub recipients: Vec<String>,
    pub subject: String,
    pub html_body: String,
}

/// Failure to hand a message to the relay. Every variant is retryable from
/// the pipeline's point of view; classification is informational.
#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("no recipients on the envelope")]
    EmptyEnvelope,
}

impl SendError {
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Client(e) if e.is_temporary())
    }
}

/// Something that can deliver a composed email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), SendError>;
}

/// Relay connection settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub sender: String,
    pub password: String,
    /// Submission relays on 587 expect STARTTLS; tests against a plain mock
    /// relay turn this off.
    pub starttls: bool,
}

/// `Mailer` that runs a full submission transaction per send.
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    #[must_use]
    pub const fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn helo_domain(&self) -> &str {
        self.config
            .sender
            .split_once('@')
            .map_or("localhost", |(_, domain)| domain)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), SendError> {
        if email.recipients.is_empty() {
            return Err(SendError::EmptyEnvelope);
        }

        let addr = format!("{}:{}", self.config.server, self.config.port);
        debug!(relay = %addr, recipients = email.recipients.len(), "submitting email");

        let mut client = SmtpClient::connect(&addr, self.config.server.clone()).await?;
        let helo = self.helo_domain().to_string();

        client.ehlo(&helo).await?;
        if self.config.starttls {
            client.starttls().await?;
            client.ehlo(&helo).await?;
        }
        client
            .auth_login(&self.config.sender, &self.config.password)
            .await?;

        client.mail_from(&self.config.sender).await?;
        for recipient in &email.recipients {
            client.rcpt_to(recipient).await?;
        }

        let message = build_message(&self.config.sender, email);
        client.send_message(&message).await?;

        // Best-effort; the message is already accepted.
        let _ = client.quit().await;

        Ok(())
    }
}

/// Assembles the multipart/alternative message with the HTML part.
fn build_message(from: &str, email: &OutboundEmail) -> String {
    let boundary = boundary();
    let mut message = String::with_capacity(email.html_body.len() + 512);

    message.push_str(&format!("From: {from}\r\n"));
    message.push_str(&format!("To: {}\r\n", email.recipients.join(", ")));
    message.push_str(&format!("Subject: {}\r\n", email.subject));
    message.push_str("MIME-Version: 1.0\r\n");
    message.push_str(&format!(
        "Content-Type: multipart/alternative; boundary=\"{boundary}\"\r\n"
    ));
    message.push_str("\r\n");

    message.push_str(&format!("--{boundary}\r\n"));
    message.push_str("Content-Type: text/html; charset=utf-8\r\n");
    message.push_str("\r\n");
    message.push_str(&email.html_body);
    message.push_str("\r\n");

    message.push_str(&format!("--{boundary}--\r\n"));
    message
}

fn boundary() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("----=_Part_{timestamp}")
}
