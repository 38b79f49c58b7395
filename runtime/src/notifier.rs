//! Notification dispatcher: keeps the status index current and emails the
//! customer on every transition.

use crate::config::PipelineConfig;
use crate::consumer::{ConsumerHandle, EventConsumer, OrderHandler};
use crate::error::PipelineError;
use crate::mail::{Mailer, OrderNotification};
use crate::metrics::NotificationMetrics;
use crate::retry::{RetryPolicy, retry_transient};
use crate::status_index::StatusIndex;
use order_lifecycle_core::{EventBus, NOTIFICATIONS_TOPIC, Order};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Consumer name of the dispatcher.
pub const NOTIFIER_CONSUMER: &str = "notifier";

/// Records each announced status and emails it to the customer.
///
/// The index is updated before the email is attempted and is never rolled
/// back. A send that still fails after retries is logged and counted.
pub struct NotificationDispatcher<M> {
    index: StatusIndex,
    mailer: M,
    mail_retry: RetryPolicy,
}

impl<M: Mailer + 'static> NotificationDispatcher<M> {
    /// Create a dispatcher writing to `index` and sending through `mailer`.
    #[must_use]
    pub const fn new(index: StatusIndex, mailer: M, mail_retry: RetryPolicy) -> Self {
        Self {
            index,
            mailer,
            mail_retry,
        }
    }

    /// The index this dispatcher writes to.
    #[must_use]
    pub const fn index(&self) -> &StatusIndex {
        &self.index
    }

    /// Process one notification event.
    ///
    /// Returns whether the email was delivered.
    pub async fn dispatch(&self, order: &Order) -> bool {
        if let Some(previous) = self.index.record(order.id, order.status) {
            tracing::debug!(order_id = %order.id, from = %previous, to = %order.status, "Status index updated");
        }

        let notification = OrderNotification::for_order(order);
        match retry_transient(&self.mail_retry, "send_email", || self.mailer.send(&notification)).await {
            Ok(()) => {
                NotificationMetrics::record_sent();
                tracing::info!(order_id = %order.id, status = %order.status, "Customer notified");
                true
            }
            Err(e) => {
                NotificationMetrics::record_failed();
                tracing::error!(
                    order_id = %order.id,
                    status = %order.status,
                    error = %e,
                    "Failed to notify customer, status index kept"
                );
                false
            }
        }
    }

    /// Spawn the `notifications` consumer.
    #[must_use]
    pub fn spawn(
        self,
        event_bus: Arc<dyn EventBus>,
        config: &PipelineConfig,
        shutdown: &broadcast::Sender<()>,
    ) -> ConsumerHandle {
        EventConsumer::new(
            NOTIFIER_CONSUMER,
            vec![NOTIFICATIONS_TOPIC],
            event_bus,
            Arc::new(self),
            config.max_in_flight,
            shutdown.subscribe(),
        )
        .with_resubscribe_delay(config.resubscribe_delay)
        .with_drain_timeout(config.drain_timeout)
        .spawn()
    }
}

impl<M: Mailer + 'static> OrderHandler for NotificationDispatcher<M> {
    async fn handle(&self, order: Order) -> Result<(), PipelineError> {
        self.dispatch(&order).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MailError;
    use order_lifecycle_core::{OrderId, OrderStatus};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct FlakyMailer {
        failures_left: AtomicUsize,
        delivered: Mutex<Vec<OrderNotification>>,
    }

    impl FlakyMailer {
        fn failing(times: usize) -> Self {
            Self {
                failures_left: AtomicUsize::new(times),
                ..Self::default()
            }
        }
    }

    impl Mailer for FlakyMailer {
        async fn send(&self, notification: &OrderNotification) -> Result<(), MailError> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(MailError::Transport("greylisted".into()));
            }
            self.delivered.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(2)
            .initial_delay(Duration::from_millis(1))
            .jitter(0.0)
            .build()
    }

    fn order(status: OrderStatus) -> Order {
        Order::new(OrderId::new(3), "Widget", 1500, "a@example.com").with_status(status)
    }

    #[tokio::test]
    async fn records_status_then_emails() {
        let dispatcher = NotificationDispatcher::new(StatusIndex::new(), FlakyMailer::default(), policy());

        assert!(dispatcher.dispatch(&order(OrderStatus::Received)).await);
        assert_eq!(dispatcher.index().get(OrderId::new(3)), Some(OrderStatus::Received));

        let delivered = dispatcher.mailer.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].to, "a@example.com");
    }

    #[tokio::test]
    async fn transient_mail_failures_are_retried() {
        let dispatcher = NotificationDispatcher::new(StatusIndex::new(), FlakyMailer::failing(2), policy());
        assert!(dispatcher.dispatch(&order(OrderStatus::Preparing)).await);
    }

    #[tokio::test]
    async fn failed_email_keeps_index_update() {
        let dispatcher = NotificationDispatcher::new(StatusIndex::new(), FlakyMailer::failing(10), policy());

        assert!(!dispatcher.dispatch(&order(OrderStatus::Delivering)).await);
        assert_eq!(dispatcher.index().get(OrderId::new(3)), Some(OrderStatus::Delivering));
    }

    #[tokio::test]
    async fn later_notification_wins() {
        let dispatcher = NotificationDispatcher::new(StatusIndex::new(), FlakyMailer::default(), policy());
        dispatcher.dispatch(&order(OrderStatus::Received)).await;
        dispatcher.dispatch(&order(OrderStatus::Preparing)).await;

        assert_eq!(dispatcher.index().get(OrderId::new(3)), Some(OrderStatus::Preparing));
    }
}
