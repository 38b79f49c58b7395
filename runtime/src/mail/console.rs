//! Console mailer for development and testing.

use super::{Mailer, OrderNotification};
use crate::error::MailError;
use tracing::info;

/// Logs notifications instead of sending them.
///
/// Used when no SMTP relay is configured.
#[derive(Clone, Debug, Default)]
pub struct ConsoleMailer;

impl ConsoleMailer {
    /// Create a new console mailer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Mailer for ConsoleMailer {
    async fn send(&self, notification: &OrderNotification) -> Result<(), MailError> {
        info!(
            order_id = %notification.order_id,
            status = %notification.status,
            to = %notification.to,
            subject = %notification.subject,
            "Mail sent (console mode)"
        );
        Ok(())
    }
}
