//! Event bus abstraction over the partitioned broker.
//!
//! The [`EventBus`] trait is the only way components talk to each other. The
//! intake service publishes creation events, the state machine consumes and
//! re-publishes, and the notification dispatcher consumes.
//!
//! # Key Principles
//!
//! - **At-least-once delivery**: Records may be delivered more than once
//! - **Explicit acknowledgement**: A [`Delivery`] is only marked consumed
//!   once its handler calls [`Acknowledgement::ack`]; dropping it unacked
//!   leaves the record to be redelivered
//! - **Ordered within partition**: Records sharing a key keep their order
//! - **Consumer groups**: Subscribers in one group split the partitions
//!
//! # Implementations
//!
//! - `InMemoryEventBus` in `order-lifecycle-testing` - For tests
//! - `RedpandaEventBus` in `order-lifecycle-redpanda` - For production (Kafka-compatible)
//!
//! # Example
//!
//! ```rust,ignore
//! use order_lifecycle_core::{EventBus, EventRecord, ORDERS_TOPIC};
//! use futures::StreamExt;
//!
//! async fn example(event_bus: &dyn EventBus, order: &Order) -> Result<(), Box<dyn std::error::Error>> {
//!     event_bus.publish(ORDERS_TOPIC, &EventRecord::encode(ORDERS_TOPIC, order)?).await?;
//!
//!     let mut stream = event_bus.subscribe(&[ORDERS_TOPIC]).await?;
//!     while let Some(result) = stream.next().await {
//!         match result {
//!             Ok(delivery) => {
//!                 println!("Received key {}", delivery.record().key);
//!                 delivery.ack();
//!             }
//!             Err(e) => eprintln!("Error: {e}"),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use crate::event::EventRecord;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a record to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// A received message could not be turned into a record
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Generic error for other failures
    #[error("Event bus error: {0}")]
    Other(String),
}

impl EventBusError {
    /// Whether retrying the same operation may succeed.
    ///
    /// Broker unavailability and failed sends are transient. A message that
    /// cannot be read will not become readable by retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_)
                | Self::PublishFailed { .. }
                | Self::SubscriptionFailed { .. }
                | Self::TransportError(_)
        )
    }
}

/// Marks one delivered record as consumed.
///
/// Dropping it without calling [`ack`](Self::ack) leaves the record
/// unconsumed, so the broker hands it out again after a restart.
pub struct Acknowledgement(Option<Box<dyn FnOnce() + Send>>);

impl Acknowledgement {
    /// Acknowledgement that runs `on_ack` when the record is consumed.
    #[must_use]
    pub fn new(on_ack: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(on_ack)))
    }

    /// Acknowledgement for transports that track nothing.
    #[must_use]
    pub const fn noop() -> Self {
        Self(None)
    }

    /// Mark the record consumed.
    pub fn ack(mut self) {
        if let Some(on_ack) = self.0.take() {
            on_ack();
        }
    }
}

impl std::fmt::Debug for Acknowledgement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acknowledgement")
            .field("tracked", &self.0.is_some())
            .finish()
    }
}

/// A record read from a subscription, together with its acknowledgement.
#[derive(Debug)]
pub struct Delivery {
    record: EventRecord,
    ack: Acknowledgement,
}

impl Delivery {
    /// Pair `record` with `ack`.
    #[must_use]
    pub const fn new(record: EventRecord, ack: Acknowledgement) -> Self {
        Self { record, ack }
    }

    /// The delivered record.
    #[must_use]
    pub const fn record(&self) -> &EventRecord {
        &self.record
    }

    /// Acknowledge right away.
    pub fn ack(self) {
        self.ack.ack();
    }

    /// Split into the record and its acknowledgement, so the acknowledgement
    /// can travel with the work that handles the record.
    #[must_use]
    pub fn into_parts(self) -> (EventRecord, Acknowledgement) {
        (self.record, self.ack)
    }
}

/// Stream of deliveries from a subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Delivery, EventBusError>> + Send>>;

/// Publish/subscribe access to the broker.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; every component holds an
/// `Arc<dyn EventBus>` and publishes from many tasks at once.
///
/// # Dyn Compatibility
///
/// Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the
/// trait can be used as a trait object.
pub trait EventBus: Send + Sync {
    /// Publish a record to a topic, partitioned by `record.key`.
    ///
    /// Resolves only once the broker accepted the record.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the broker rejects or
    /// times out the send.
    fn publish(
        &self,
        topic: &str,
        record: &EventRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics.
    ///
    /// The returned stream yields deliveries with at-least-once semantics:
    /// a record counts as consumed only once its [`Delivery`] is
    /// acknowledged. Errors on individual messages are yielded in-band and
    /// the stream keeps going; the stream only ends when the underlying
    /// connection is gone.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if the subscription
    /// cannot be established.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}
