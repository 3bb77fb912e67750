//! Outbound mail. Handlers depend on [`MailSender`]; the concrete transport is
//! chosen once at startup and injected through application state.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::{info, warn};

use crate::config::MailConfig;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Transport configuration error: {0}")]
    Configuration(String),
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, text: &str) -> Result<(), MailError>;
}

/// SMTP relay transport.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| MailError::InvalidAddress(format!("{}: {}", config.from, e)))?;

        let builder = if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        }
        .map_err(|e| MailError::Configuration(e.to_string()))?
        .port(config.smtp_port);

        let builder = match (&config.smtp_username, &config.smtp_password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, text: &str) -> Result<(), MailError> {
        let recipient = to
            .parse::<Mailbox>()
            .map_err(|e| MailError::InvalidAddress(format!("{}: {}", to, e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(text.to_string())
            .map_err(|e| MailError::Delivery(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Delivery(e.to_string()))?;

        info!(subject, "Mail sent");
        Ok(())
    }
}

/// No-op transport for environments without SMTP: logs and drops.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl MailSender for LogMailer {
    async fn send(&self, to: &str, subject: &str, text: &str) -> Result<(), MailError> {
        info!(to, subject, "SMTP not configured; mail not sent");
        tracing::debug!(body = text, "Dropped mail body");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Keeps every message in memory instead of delivering it.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Most recent message addressed to `to`.
    pub fn last_to(&self, to: &str) -> Option<SentMail> {
        self.sent().into_iter().rev().find(|mail| mail.to == to)
    }
}

#[async_trait]
impl MailSender for MemoryMailer {
    async fn send(&self, to: &str, subject: &str, text: &str) -> Result<(), MailError> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| MailError::Delivery("mailbox lock poisoned".to_string()))?;
        sent.push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

/// SMTP when a host is configured, otherwise the logging transport.
pub fn build_mailer(config: &MailConfig) -> Result<Arc<dyn MailSender>, MailError> {
    if config.smtp_host.trim().is_empty() {
        warn!("SMTP host not configured; mail will be logged instead of sent");
        return Ok(Arc::new(LogMailer));
    }

    Ok(Arc::new(SmtpMailer::new(config)?))
}

pub fn verification_message(base_url: &str, token: &str) -> (String, String) {
    let subject = "Confirm your Family Benefits account".to_string();
    let body = format!(
        "Welcome!\n\nConfirm your email address by opening the link below:\n{}?token={}\n\nIf you did not create an account, ignore this message.",
        base_url.trim_end_matches('/'),
        token
    );
    (subject, body)
}

pub fn recovery_message(code: &str, valid_minutes: i64) -> (String, String) {
    let subject = "Family Benefits password recovery code".to_string();
    let body = format!(
        "Your password recovery code is: {}\n\nThe code is valid for {} minutes. If you did not ask to reset your password, ignore this message.",
        code, valid_minutes
    );
    (subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_log_mailer_without_smtp_host() {
        let config = crate::config::AppConfig::development().mail;
        assert!(build_mailer(&config).is_ok());
    }

    #[test]
    fn rejects_invalid_from_address() {
        let mut config = crate::config::AppConfig::development().mail;
        config.smtp_host = "smtp.example.com".to_string();
        config.from = "not an address".to_string();
        assert!(matches!(SmtpMailer::new(&config), Err(MailError::InvalidAddress(_))));
    }

    #[test]
    fn verification_link_carries_token() {
        let (_, body) = verification_message("https://app.example.com/verify/", "abc123");
        assert!(body.contains("https://app.example.com/verify?token=abc123"));
    }

    #[test]
    fn recovery_message_carries_code_and_window() {
        let (subject, body) = recovery_message("004217", 15);
        assert!(subject.contains("recovery"));
        assert!(body.contains("004217"));
        assert!(body.contains("15 minutes"));
    }

    #[tokio::test]
    async fn log_mailer_accepts_anything() {
        assert!(LogMailer.send("x@example.com", "s", "b").await.is_ok());
    }
}
