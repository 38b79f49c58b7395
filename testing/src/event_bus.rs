//! In-memory event bus for fast, deterministic pipeline tests.
//!
//! Every subscriber receives every record published to its topics after it
//! subscribed, as if each subscriber were its own consumer group. Records are
//! delivered in publish order. Everything published is also kept in a
//! per-topic history for assertions, and so is every acknowledged delivery.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use order_lifecycle_core::{Acknowledgement, Delivery, EventBus, EventBusError, EventRecord, EventStream};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};

type Subscriber = mpsc::UnboundedSender<Result<EventRecord, EventBusError>>;

/// In-memory [`EventBus`] with history and failure injection.
///
/// # Example
///
/// ```
/// use order_lifecycle_core::{EventBus, EventRecord, ORDERS_TOPIC};
/// use order_lifecycle_testing::InMemoryEventBus;
///
/// # tokio_test::block_on(async {
/// let bus = InMemoryEventBus::new();
/// bus.publish(ORDERS_TOPIC, &EventRecord::new(ORDERS_TOPIC, "1", b"{}".to_vec()))
///     .await
///     .unwrap();
/// assert_eq!(bus.published(ORDERS_TOPIC).len(), 1);
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventBus {
    subscribers: Arc<Mutex<HashMap<String, Vec<Subscriber>>>>,
    history: Arc<Mutex<HashMap<String, Vec<EventRecord>>>>,
    acknowledged: Arc<Mutex<HashMap<String, Vec<EventRecord>>>>,
    failing_publishes: Arc<AtomicUsize>,
    subscribed: Arc<Notify>,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record published to `topic` so far, in order.
    #[must_use]
    pub fn published(&self, topic: &str) -> Vec<EventRecord> {
        self.history.lock().unwrap().get(topic).cloned().unwrap_or_default()
    }

    /// Every delivery on `topic` a consumer acknowledged, in ack order.
    ///
    /// A record delivered to several subscribers shows up once per ack.
    #[must_use]
    pub fn acknowledged(&self, topic: &str) -> Vec<EventRecord> {
        self.acknowledged.lock().unwrap().get(topic).cloned().unwrap_or_default()
    }

    /// Make the next `count` publishes fail with a transient error.
    ///
    /// Failed publishes are neither delivered nor recorded.
    pub fn fail_next_publishes(&self, count: usize) {
        self.failing_publishes.store(count, Ordering::SeqCst);
    }

    /// Live subscriptions to `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .get(topic)
            .map_or(0, |subs| subs.iter().filter(|tx| !tx.is_closed()).count())
    }

    /// Wait until `topic` has at least `count` live subscriptions.
    ///
    /// Records published before a consumer subscribes are not replayed to
    /// it, so tests call this before publishing.
    pub async fn wait_for_subscribers(&self, topic: &str, count: usize) {
        loop {
            let notified = self.subscribed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.subscriber_count(topic) >= count {
                return;
            }
            notified.await;
        }
    }

    /// End every open subscription stream.
    ///
    /// Consumers see their stream finish and resubscribe.
    pub fn close_subscriptions(&self) {
        self.subscribers.lock().unwrap().clear();
    }

    fn take_failure(&self) -> bool {
        self.failing_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        record: &EventRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let record = record.clone();

        Box::pin(async move {
            if self.take_failure() {
                return Err(EventBusError::PublishFailed {
                    topic,
                    reason: "injected failure".to_string(),
                });
            }

            self.history
                .lock()
                .unwrap()
                .entry(topic.clone())
                .or_default()
                .push(record.clone());

            if let Some(subs) = self.subscribers.lock().unwrap().get_mut(&topic) {
                subs.retain(|tx| tx.send(Ok(record.clone())).is_ok());
            }
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(ToString::to_string).collect();

        Box::pin(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();
            {
                let mut subscribers = self.subscribers.lock().unwrap();
                for topic in topics {
                    subscribers.entry(topic).or_default().push(tx.clone());
                }
            }
            self.subscribed.notify_waiters();

            let acknowledged = Arc::clone(&self.acknowledged);
            let stream = async_stream::stream! {
                while let Some(item) = rx.recv().await {
                    yield item.map(|record| {
                        let acknowledged = Arc::clone(&acknowledged);
                        let acked = record.clone();
                        Delivery::new(
                            record,
                            Acknowledgement::new(move || {
                                acknowledged.lock().unwrap().entry(acked.topic.clone()).or_default().push(acked);
                            }),
                        )
                    });
                }
            };
            Ok(Box::pin(stream) as EventStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn record(key: &str) -> EventRecord {
        EventRecord::new("status", key, b"{}".to_vec())
    }

    #[tokio::test]
    async fn subscribers_receive_in_publish_order() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe(&["status"]).await.unwrap();

        bus.publish("status", &record("1")).await.unwrap();
        bus.publish("status", &record("2")).await.unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap().record().key, "1");
        assert_eq!(stream.next().await.unwrap().unwrap().record().key, "2");
    }

    #[tokio::test]
    async fn only_acked_deliveries_are_recorded() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe(&["status"]).await.unwrap();

        bus.publish("status", &record("1")).await.unwrap();
        bus.publish("status", &record("2")).await.unwrap();

        drop(stream.next().await.unwrap().unwrap());
        stream.next().await.unwrap().unwrap().ack();

        let acked: Vec<String> = bus.acknowledged("status").into_iter().map(|r| r.key).collect();
        assert_eq!(acked, ["2"]);
    }

    #[tokio::test]
    async fn injected_failures_are_transient_and_not_recorded() {
        let bus = InMemoryEventBus::new();
        bus.fail_next_publishes(1);

        let err = bus.publish("status", &record("1")).await.unwrap_err();
        assert!(err.is_transient());
        assert!(bus.published("status").is_empty());

        bus.publish("status", &record("1")).await.unwrap();
        assert_eq!(bus.published("status").len(), 1);
    }

    #[tokio::test]
    async fn closing_ends_streams() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe(&["status"]).await.unwrap();
        bus.wait_for_subscribers("status", 1).await;

        bus.close_subscriptions();
        assert!(stream.next().await.is_none());
        assert_eq!(bus.subscriber_count("status"), 0);
    }
}
