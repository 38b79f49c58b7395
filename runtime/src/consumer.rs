//! Subscribe-decode-dispatch loop shared by every pipeline stage.
//!
//! ```text
//! loop {
//!     subscribe(topics)
//!     for each delivery:
//!         decode          -- malformed: log, count, ack, skip
//!         dispatch by key -- handler runs on its own task, acks when done
//!     stream ended or subscribe failed: wait, resubscribe
//! }
//! ```
//!
//! Handler outcomes are classified by [`PipelineError::is_fatal`]. Codec and
//! domain failures are logged and the loop keeps going. A fatal failure (a
//! publish that kept failing after retries) is reported back to the loop,
//! which stops reading, drains what it already admitted, and returns
//! [`ConsumerError::Fatal`] to its owner.
//!
//! A delivery is acknowledged only after its handler returned something other
//! than a fatal error. The record that stopped the loop stays unacknowledged
//! and is redelivered once the process restarts.

use crate::dispatcher::KeyedDispatcher;
use crate::error::PipelineError;
use crate::metrics::LifecycleMetrics;
use futures::StreamExt;
use order_lifecycle_core::{Delivery, EventBus, EventStream, Order};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

/// Processes one decoded order snapshot.
///
/// Implementations hold whatever they need behind `&self`; the consumer shares
/// a single handler across all dispatched tasks.
pub trait OrderHandler: Send + Sync + 'static {
    /// Handle one snapshot.
    ///
    /// # Errors
    ///
    /// Return a [`PipelineError`]. Only errors for which
    /// [`is_fatal`](PipelineError::is_fatal) is `true` stop the consumer.
    fn handle(&self, order: Order) -> impl Future<Output = Result<(), PipelineError>> + Send;
}

/// Why a consumer loop stopped without being asked to.
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// A handler failed in a way the loop cannot recover from.
    #[error("consumer {consumer} stopped: {source}")]
    Fatal {
        /// Consumer name.
        consumer: &'static str,
        /// The failure that stopped it.
        #[source]
        source: PipelineError,
    },
}

/// Handle of a spawned consumer loop.
pub type ConsumerHandle = tokio::task::JoinHandle<Result<(), ConsumerError>>;

enum StreamOutcome {
    Shutdown,
    Ended,
    Fatal(PipelineError),
}

/// Long-running consumer for one or more topics.
pub struct EventConsumer<H> {
    name: &'static str,
    topics: Vec<&'static str>,
    event_bus: Arc<dyn EventBus>,
    handler: Arc<H>,
    dispatcher: KeyedDispatcher,
    shutdown: broadcast::Receiver<()>,
    fatal_tx: mpsc::Sender<PipelineError>,
    fatal_rx: mpsc::Receiver<PipelineError>,
    resubscribe_delay: Duration,
    drain_timeout: Duration,
}

impl<H: OrderHandler> EventConsumer<H> {
    /// Create a consumer named `name` reading `topics`.
    ///
    /// `max_in_flight` bounds how many snapshots are handled concurrently.
    /// Resubscribe delay and drain timeout default to 5 and 30 seconds.
    #[must_use]
    pub fn new(
        name: &'static str,
        topics: Vec<&'static str>,
        event_bus: Arc<dyn EventBus>,
        handler: Arc<H>,
        max_in_flight: usize,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let (fatal_tx, fatal_rx) = mpsc::channel(1);
        Self {
            name,
            topics,
            event_bus,
            handler,
            dispatcher: KeyedDispatcher::new(max_in_flight),
            shutdown,
            fatal_tx,
            fatal_rx,
            resubscribe_delay: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(30),
        }
    }

    /// Set how long to wait before resubscribing.
    #[must_use]
    pub const fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = delay;
        self
    }

    /// Set how long shutdown waits for in-flight work.
    #[must_use]
    pub const fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Spawn the loop on the runtime.
    pub fn spawn(self) -> ConsumerHandle {
        tokio::spawn(self.run())
    }

    /// Run until shutdown is signalled or a handler fails fatally.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::Fatal`] with the handler failure that stopped
    /// the loop.
    pub async fn run(mut self) -> Result<(), ConsumerError> {
        info!(consumer = self.name, topics = ?self.topics, "Consumer started");

        let outcome = loop {
            let subscription = tokio::select! {
                _ = self.shutdown.recv() => break Ok(()),
                result = self.event_bus.subscribe(&self.topics) => result,
            };

            match subscription {
                Ok(stream) => {
                    info!(consumer = self.name, topics = ?self.topics, "Subscribed");
                    match self.process_stream(stream).await {
                        StreamOutcome::Shutdown => break Ok(()),
                        StreamOutcome::Fatal(source) => {
                            error!(consumer = self.name, error = %source, "Handler failed fatally, stopping consumer");
                            break Err(ConsumerError::Fatal {
                                consumer: self.name,
                                source,
                            });
                        }
                        StreamOutcome::Ended => {
                            warn!(
                                consumer = self.name,
                                delay_ms = self.resubscribe_delay.as_millis(),
                                "Event stream ended, resubscribing"
                            );
                        }
                    }
                }
                Err(e) => {
                    error!(
                        consumer = self.name,
                        error = %e,
                        delay_ms = self.resubscribe_delay.as_millis(),
                        "Failed to subscribe, retrying"
                    );
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => break Ok(()),
                () = tokio::time::sleep(self.resubscribe_delay) => {}
            }
        };

        if self.dispatcher.drain(self.drain_timeout).await {
            info!(consumer = self.name, "Consumer stopped");
        } else {
            warn!(
                consumer = self.name,
                in_flight = self.dispatcher.in_flight(),
                "Consumer stopped before in-flight messages finished"
            );
        }
        outcome
    }

    async fn process_stream(&mut self, mut stream: EventStream) -> StreamOutcome {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.recv() => {
                    info!(consumer = self.name, "Shutdown signal received");
                    return StreamOutcome::Shutdown;
                }
                Some(failure) = self.fatal_rx.recv() => return StreamOutcome::Fatal(failure),
                next = stream.next() => match next {
                    Some(Ok(delivery)) => self.accept(delivery).await,
                    Some(Err(e)) => {
                        warn!(consumer = self.name, error = %e, "Skipping unreadable message");
                        LifecycleMetrics::record_skipped("transport");
                    }
                    None => return StreamOutcome::Ended,
                },
            }
        }
    }

    async fn accept(&self, delivery: Delivery) {
        let (record, ack) = delivery.into_parts();
        let order = match record.decode() {
            Ok(order) => order,
            Err(e) => {
                warn!(consumer = self.name, key = %record.key, error = %e, "Skipping malformed message");
                LifecycleMetrics::record_skipped("decode");
                ack.ack();
                return;
            }
        };

        let name = self.name;
        let handler = Arc::clone(&self.handler);
        let fatal_tx = self.fatal_tx.clone();
        let key = order.id.partition_key();

        self.dispatcher
            .dispatch(key, async move {
                let order_id = order.id;
                let started = Instant::now();
                let result = handler.handle(order).await;
                LifecycleMetrics::record_handled(name, started.elapsed());

                match result {
                    Ok(()) => ack.ack(),
                    Err(e) if e.is_fatal() => {
                        // Left unacked. Capacity one: the first fatal failure is enough to stop the loop.
                        let _ = fatal_tx.try_send(e);
                    }
                    Err(e) => {
                        warn!(consumer = name, order_id = %order_id, kind = e.kind(), error = %e, "Dropping message");
                        LifecycleMetrics::record_skipped(e.kind());
                        ack.ack();
                    }
                }
            })
            .await;
    }
}

impl<H> std::fmt::Debug for EventConsumer<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventConsumer")
            .field("name", &self.name)
            .field("topics", &self.topics)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use order_lifecycle_core::{EventBusError, EventRecord, OrderId, OrderStatus, STATUS_TOPIC, TransitionError};
    use order_lifecycle_testing::InMemoryEventBus;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<OrderId>>,
    }

    impl OrderHandler for Recorder {
        async fn handle(&self, order: Order) -> Result<(), PipelineError> {
            if order.status == OrderStatus::Finalized {
                return Err(PipelineError::Domain {
                    order_id: order.id,
                    status: order.status,
                    source: TransitionError::Terminal,
                });
            }
            if order.product_name == "explode" {
                return Err(PipelineError::Transport {
                    order_id: order.id,
                    source: EventBusError::TransportError("down".into()),
                });
            }
            self.seen.lock().unwrap().push(order.id);
            Ok(())
        }
    }

    fn snapshot(id: i64, status: OrderStatus) -> Order {
        Order::new(OrderId::new(id), "Widget", 100, "a@example.com").with_status(status)
    }

    async fn publish(bus: &InMemoryEventBus, order: &Order) {
        let record = EventRecord::encode(STATUS_TOPIC, order).unwrap();
        bus.publish(STATUS_TOPIC, &record).await.unwrap();
    }

    #[tokio::test]
    async fn malformed_and_domain_failures_do_not_stop_the_loop() {
        let bus = Arc::new(InMemoryEventBus::new());
        let handler = Arc::new(Recorder::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let consumer = EventConsumer::new(
            "status",
            vec![STATUS_TOPIC],
            bus.clone(),
            Arc::clone(&handler),
            8,
            shutdown_rx,
        );
        let task = consumer.spawn();
        bus.wait_for_subscribers(STATUS_TOPIC, 1).await;

        bus.publish(STATUS_TOPIC, &EventRecord::new(STATUS_TOPIC, "1", b"{oops".to_vec()))
            .await
            .unwrap();
        publish(&bus, &snapshot(2, OrderStatus::Finalized)).await;
        publish(&bus, &snapshot(3, OrderStatus::Received)).await;

        tokio::time::timeout(Duration::from_secs(5), async {
            while handler.seen.lock().unwrap().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(()).unwrap();
        assert!(task.await.unwrap().is_ok());
        assert_eq!(*handler.seen.lock().unwrap(), vec![OrderId::new(3)]);

        // Skipped messages are consumed too, so they are not redelivered forever.
        let mut acked: Vec<String> = bus.acknowledged(STATUS_TOPIC).into_iter().map(|r| r.key).collect();
        acked.sort();
        assert_eq!(acked, ["1", "2", "3"]);
    }

    #[tokio::test]
    async fn fatal_failure_stops_the_loop() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let consumer = EventConsumer::new(
            "status",
            vec![STATUS_TOPIC],
            bus.clone(),
            Arc::new(Recorder::default()),
            8,
            shutdown_rx,
        );
        let task = consumer.spawn();
        bus.wait_for_subscribers(STATUS_TOPIC, 1).await;

        let mut doomed = snapshot(4, OrderStatus::Received);
        doomed.product_name = "explode".to_string();
        publish(&bus, &doomed).await;

        let result = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert!(matches!(result, Err(ConsumerError::Fatal { consumer: "status", .. })));
        assert!(bus.acknowledged(STATUS_TOPIC).is_empty());
    }
}
