//! Notification email delivery.
//!
//! The dispatcher renders one [`OrderNotification`] per notification event
//! and hands it to a [`Mailer`]. Delivery is a best-effort side channel: a
//! failed send is retried and then logged, never rolled back into the status
//! index.

mod console;
mod smtp;

pub use console::ConsoleMailer;
pub use smtp::{SmtpConfig, SmtpMailer};

use crate::error::MailError;
use order_lifecycle_core::{Order, OrderId, OrderStatus};
use std::future::Future;

/// Subject line of every status email.
pub const STATUS_SUBJECT: &str = "Estado pedido";

/// A rendered status email for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderNotification {
    /// Order the email is about.
    pub order_id: OrderId,
    /// Status being announced.
    pub status: OrderStatus,
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

impl OrderNotification {
    /// Render the status email for an order snapshot.
    #[must_use]
    pub fn for_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            status: order.status,
            to: order.email.clone(),
            subject: STATUS_SUBJECT.to_string(),
            body: format!(
                "Pedido: {}:\t{}\r\nProducto: {}\r\n",
                order.id, order.status, order.product_name
            ),
        }
    }
}

/// Email delivery backend.
///
/// This trait abstracts over the transport (SMTP relay, console, test double).
pub trait Mailer: Send + Sync {
    /// Deliver one notification.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::InvalidAddress`] or [`MailError::Build`] for a
    /// message that can never be sent, and [`MailError::Transport`] when the
    /// server could not be reached or refused it.
    fn send(&self, notification: &OrderNotification) -> impl Future<Output = Result<(), MailError>> + Send;
}
