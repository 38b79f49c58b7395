//! SMTP mailer using Lettre.

use super::{Mailer, OrderNotification};
use crate::error::MailError;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// Connection settings for [`SmtpMailer`].
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Relay host, e.g. `smtp.gmail.com`.
    pub host: String,
    /// Relay port; 587 for STARTTLS.
    pub port: u16,
    /// Login, if the relay requires authentication.
    pub username: Option<String>,
    /// Password for `username`.
    pub password: Option<String>,
    /// Sender address.
    pub from: String,
}

/// Sends notifications through an SMTP relay with STARTTLS.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build a mailer for the given relay.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::InvalidAddress`] if the sender does not parse and
    /// [`MailError::Transport`] if the relay host is invalid.
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let from = config.from.parse::<Mailbox>().map_err(|e| MailError::InvalidAddress {
            address: config.from.clone(),
            reason: e.to_string(),
        })?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| MailError::Transport(format!("SMTP relay error: {e}")))?
            .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        tracing::info!(host = %config.host, port = config.port, from = %from, "SMTP mailer configured");

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, notification: &OrderNotification) -> Result<Message, MailError> {
        let to = notification.to.parse::<Mailbox>().map_err(|e| MailError::InvalidAddress {
            address: notification.to.clone(),
            reason: e.to_string(),
        })?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(notification.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body.clone())
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

impl Mailer for SmtpMailer {
    async fn send(&self, notification: &OrderNotification) -> Result<(), MailError> {
        let message = self.build_message(notification)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        tracing::debug!(
            order_id = %notification.order_id,
            status = %notification.status,
            to = %notification.to,
            "Notification email sent"
        );
        Ok(())
    }
}
