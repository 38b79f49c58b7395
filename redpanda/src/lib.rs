//! Redpanda-backed [`EventBus`] for the order lifecycle pipeline.
//!
//! Uses rdkafka, so any Kafka-compatible broker works (Redpanda, Apache
//! Kafka, MSK).
//!
//! # Wire Format
//!
//! Records travel as-is: the Kafka message key is [`EventRecord::key`] (the
//! order id in decimal) and the value is [`EventRecord::payload`] (the JSON
//! order snapshot). Keying by order id puts every event of one order on the
//! same partition, which is what keeps an order's transitions in sequence.
//!
//! # Delivery Semantics
//!
//! At-least-once, with manual offset commits:
//! - every record is forwarded as a [`Delivery`]; its offset counts as done
//!   only once the subscriber acknowledges it
//! - handlers finish out of order, so each partition commits its low
//!   watermark: the lowest offset still unacknowledged, or one past the
//!   highest offset seen when nothing is outstanding
//! - a delivery dropped without an ack pins its partition's watermark, so it
//!   and everything after it are redelivered once the process restarts
//! - after the subscriber drops its stream, acknowledgements from work still
//!   draining are committed before the consumer closes
//! - a record with an empty value is still forwarded, so the consumer can
//!   report and skip it
//!
//! Every bus instance is bound to one consumer group. Run one bus per service
//! (`process-order`, `process-notifications`) so each service sees every
//! record once.
//!
//! # Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use order_lifecycle_core::{EventBus, ORDERS_TOPIC};
//! use order_lifecycle_redpanda::RedpandaEventBus;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("process-order")
//!     .build()?;
//!
//! let mut stream = event_bus.subscribe(&[ORDERS_TOPIC]).await?;
//! while let Some(result) = stream.next().await {
//!     let delivery = result?;
//!     println!("order {} on {}", delivery.record().key, delivery.record().topic);
//!     delivery.ack();
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use futures::StreamExt;
use order_lifecycle_core::{Acknowledgement, Delivery, EventBus, EventBusError, EventRecord, EventStream};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;

const DEFAULT_BUFFER_SIZE: usize = 1000;
const DEFAULT_OFFSET_RESET: &str = "earliest";
const OFFSET_RESET_POLICIES: [&str; 3] = ["earliest", "latest", "error"];

/// Kafka-compatible event bus.
///
/// Holds one producer, shared by every publish, and creates a fresh consumer
/// in the configured group for each [`subscribe`](EventBus::subscribe).
///
/// # Example
///
/// ```no_run
/// use order_lifecycle_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")
///     .consumer_group("process-notifications")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
    consumer_group: Option<String>,
    buffer_size: usize,
    auto_offset_reset: String,
}

impl RedpandaEventBus {
    /// Connect with default settings and no explicit consumer group.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be
    /// created from `brokers`.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Start configuring a bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Bootstrap servers this bus talks to.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Consumer group used by subscriptions.
    ///
    /// Without an explicit group, one is derived from the subscribed topics.
    #[must_use]
    pub fn consumer_group_for(&self, topics: &[String]) -> String {
        self.consumer_group.clone().unwrap_or_else(|| {
            let mut sorted = topics.to_vec();
            sorted.sort();
            format!("order-lifecycle-{}", sorted.join("-"))
        })
    }
}

/// Builder for [`RedpandaEventBus`].
#[derive(Debug, Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Comma-separated bootstrap servers, e.g. `localhost:9092`. Required.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Producer acknowledgment mode: `"0"`, `"1"` or `"all"`.
    ///
    /// Default: `"all"`, so an accepted intake survives a leader failover.
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Compression codec: `"none"`, `"gzip"`, `"snappy"`, `"lz4"` or `"zstd"`.
    ///
    /// Default: `"none"`
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// How long a publish may wait for the broker.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Consumer group shared by every subscription of this bus.
    ///
    /// Instances of one service must use the same group so partitions are
    /// split between them instead of every instance processing every order.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Records buffered between the Kafka consumer and the subscriber.
    ///
    /// Default: 1000. Zero is raised to one.
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Where a new consumer group starts: `"earliest"`, `"latest"` or `"error"`.
    ///
    /// Default: `"earliest"`, so orders accepted before the processor first
    /// joined are not skipped.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Create the producer and finish configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers are missing,
    /// the offset reset policy is unknown, or the producer cannot be created.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;

        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| DEFAULT_OFFSET_RESET.to_string());
        if !OFFSET_RESET_POLICIES.contains(&auto_offset_reset.as_str()) {
            return Err(EventBusError::ConnectionFailed(format!(
                "Unknown auto.offset.reset policy {auto_offset_reset:?}"
            )));
        }

        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));
        let acks = self.producer_acks.as_deref().unwrap_or("all");
        let compression = self.compression.as_deref().unwrap_or("none");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", acks)
            .set("compression.type", compression)
            .create()
            .map_err(|e| EventBusError::ConnectionFailed(format!("Failed to create producer: {e}")))?;

        let buffer_size = self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        tracing::info!(
            brokers = %brokers,
            acks,
            compression,
            consumer_group = ?self.consumer_group,
            buffer_size,
            auto_offset_reset = %auto_offset_reset,
            "Redpanda event bus ready"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout,
            consumer_group: self.consumer_group,
            buffer_size,
            auto_offset_reset,
        })
    }
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        topic: &str,
        record: &EventRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let record = record.clone();

        Box::pin(async move {
            let message = FutureRecord::to(&topic).key(&record.key).payload(&record.payload);

            match self.producer.send(message, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(topic = %topic, key = %record.key, partition, offset, "Record published");
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::warn!(topic = %topic, key = %record.key, error = %kafka_error, "Failed to publish record");
                    Err(EventBusError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();

        Box::pin(async move {
            let group = self.consumer_group_for(&topics);
            let subscription_failed = |reason: String| EventBusError::SubscriptionFailed {
                topics: topics.clone(),
                reason,
            };

            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &self.brokers)
                .set("group.id", &group)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &self.auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| subscription_failed(format!("Failed to create consumer: {e}")))?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| subscription_failed(format!("Failed to subscribe: {e}")))?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %group,
                auto_offset_reset = %self.auto_offset_reset,
                "Subscribed to topics"
            );

            let (tx, mut rx) = mpsc::channel(self.buffer_size);
            tokio::spawn(forward_messages(consumer, tx));

            let stream = async_stream::stream! {
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };
            Ok(Box::pin(stream) as EventStream)
        })
    }
}

/// Topic and partition of a consumed message.
type Partition = (String, i32);

/// Offsets handed out on one partition and not yet acknowledged.
#[derive(Debug, Default)]
struct PartitionOffsets {
    outstanding: BTreeSet<i64>,
    next: i64,
    committed: Option<i64>,
}

/// Per-partition low watermarks for one consumer.
#[derive(Debug, Default)]
struct CommitTracker {
    partitions: HashMap<Partition, PartitionOffsets>,
}

impl CommitTracker {
    /// Record that `offset` was handed to the subscriber.
    fn track(&mut self, partition: &Partition, offset: i64) {
        let offsets = self.partitions.entry(partition.clone()).or_default();
        offsets.outstanding.insert(offset);
        offsets.next = offsets.next.max(offset + 1);
    }

    /// Mark `offset` acknowledged.
    ///
    /// Returns the offset to commit when the partition's watermark moved.
    fn complete(&mut self, partition: &Partition, offset: i64) -> Option<i64> {
        let offsets = self.partitions.get_mut(partition)?;
        offsets.outstanding.remove(&offset);

        let watermark = offsets.outstanding.first().copied().unwrap_or(offsets.next);
        if offsets.committed.is_some_and(|committed| committed >= watermark) {
            return None;
        }
        offsets.committed = Some(watermark);
        Some(watermark)
    }
}

/// Own `consumer`, forward its messages to `tx` and commit acknowledged
/// offsets.
///
/// Stops reading when the subscriber drops its stream or the consumer ends,
/// then keeps committing until every outstanding delivery was acknowledged
/// or dropped.
async fn forward_messages(consumer: StreamConsumer, tx: mpsc::Sender<Result<Delivery, EventBusError>>) {
    let (ack_tx, mut ack_rx) = mpsc::unbounded_channel::<(Partition, i64)>();
    let mut tracker = CommitTracker::default();

    {
        let mut messages = consumer.stream();
        loop {
            tokio::select! {
                Some((partition, offset)) = ack_rx.recv() => commit(&consumer, &mut tracker, &partition, offset),
                () = tx.closed() => {
                    tracing::debug!("Subscriber dropped, stopping consumer");
                    break;
                }
                next = messages.next() => {
                    let message = match next {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => {
                            let err = EventBusError::TransportError(format!("Failed to receive message: {e}"));
                            if tx.send(Err(err)).await.is_err() {
                                break;
                            }
                            continue;
                        }
                        None => break,
                    };

                    let partition = (message.topic().to_string(), message.partition());
                    let offset = message.offset();
                    tracker.track(&partition, offset);

                    let ack_tx = ack_tx.clone();
                    let ack = Acknowledgement::new(move || {
                        // Closed only once the consumer is gone, and then nothing can be committed.
                        let _ = ack_tx.send((partition, offset));
                    });
                    if tx.send(Ok(Delivery::new(to_record(&message), ack))).await.is_err() {
                        // Never acknowledged: the next member of the group gets it again.
                        tracing::debug!("Subscriber dropped, stopping consumer");
                        break;
                    }
                }
            }
        }
    }

    // Deliveries still buffered in the channel hold acknowledgements; release them.
    drop(tx);
    drop(ack_tx);
    while let Some((partition, offset)) = ack_rx.recv().await {
        commit(&consumer, &mut tracker, &partition, offset);
    }

    tracing::debug!("Consumer task exiting");
}

fn commit(consumer: &StreamConsumer, tracker: &mut CommitTracker, partition: &Partition, offset: i64) {
    let Some(watermark) = tracker.complete(partition, offset) else {
        return;
    };

    let (topic, number) = partition;
    let mut offsets = TopicPartitionList::new();
    let result = offsets
        .add_partition_offset(topic, *number, Offset::Offset(watermark))
        .and_then(|()| consumer.commit(&offsets, CommitMode::Async));

    match result {
        Ok(()) => tracing::trace!(topic = %topic, partition = number, offset = watermark, "Offset committed"),
        Err(e) => tracing::warn!(
            topic = %topic,
            partition = number,
            offset = watermark,
            error = %e,
            "Failed to commit offset, records may be redelivered"
        ),
    }
}

fn to_record(message: &BorrowedMessage<'_>) -> EventRecord {
    let key = message
        .key()
        .map(|key| String::from_utf8_lossy(key).into_owned())
        .unwrap_or_default();
    let payload = message.payload().map(<[u8]>::to_vec).unwrap_or_default();

    tracing::trace!(
        topic = message.topic(),
        partition = message.partition(),
        offset = message.offset(),
        key = %key,
        "Received record"
    );
    EventRecord::new(message.topic(), key, payload)
}
