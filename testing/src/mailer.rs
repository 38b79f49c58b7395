//! Mail doubles.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use order_lifecycle_core::{OrderId, OrderStatus};
use order_lifecycle_runtime::{MailError, Mailer, OrderNotification};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Keeps every notification instead of sending it.
///
/// Clones share the same outbox, so a test can keep one clone and hand the
/// other to the dispatcher.
#[derive(Clone, Debug, Default)]
pub struct RecordingMailer {
    outbox: Arc<Mutex<Vec<OrderNotification>>>,
}

impl RecordingMailer {
    /// Create a mailer with an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, in delivery order.
    #[must_use]
    pub fn sent(&self) -> Vec<OrderNotification> {
        self.outbox.lock().unwrap().clone()
    }

    /// Statuses announced to the customer of `id`, in delivery order.
    #[must_use]
    pub fn statuses_for(&self, id: OrderId) -> Vec<OrderStatus> {
        self.outbox
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.order_id == id)
            .map(|n| n.status)
            .collect()
    }
}

impl Mailer for RecordingMailer {
    async fn send(&self, notification: &OrderNotification) -> Result<(), MailError> {
        self.outbox.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Fails every send and counts the attempts.
#[derive(Clone, Debug, Default)]
pub struct FailingMailer {
    attempts: Arc<AtomicUsize>,
    permanent: bool,
}

impl FailingMailer {
    /// A mailer whose failures look like an unreachable relay and are retried.
    #[must_use]
    pub fn unreachable() -> Self {
        Self::default()
    }

    /// A mailer whose failures are permanent and never retried.
    #[must_use]
    pub fn rejecting() -> Self {
        Self {
            permanent: true,
            ..Self::default()
        }
    }

    /// Sends attempted so far, retries included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Mailer for FailingMailer {
    async fn send(&self, notification: &OrderNotification) -> Result<(), MailError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.permanent {
            Err(MailError::InvalidAddress {
                address: notification.to.clone(),
                reason: "mailbox rejected".to_string(),
            })
        } else {
            Err(MailError::Transport("connection refused".to_string()))
        }
    }
}
