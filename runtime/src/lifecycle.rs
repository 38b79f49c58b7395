//! The order lifecycle state machine.
//!
//! The processor keeps no state of its own. Every event carries the full
//! order snapshot, and progress is made by re-publishing that snapshot:
//!
//! ```text
//! orders ──► [creation] ──► recibido ─┬─► notifications
//!                                     └─► (delay) ─► status
//!
//! status ──► [advance] ──► next(status) ─┬─► notifications
//!    ▲                                   └─► (delay) ─► status, unless finalizado
//!    └───────────────────────────────────────────────┘
//! ```
//!
//! Both stages run in the same consumer group, so adding processor instances
//! spreads partitions without handling any order twice.

use crate::config::PipelineConfig;
use crate::consumer::{ConsumerHandle, EventConsumer, OrderHandler};
use crate::error::PipelineError;
use crate::metrics::LifecycleMetrics;
use crate::publisher::EventPublisher;
use order_lifecycle_core::{EventBus, NOTIFICATIONS_TOPIC, ORDERS_TOPIC, Order, OrderStatus, STATUS_TOPIC};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Consumer name of the creation stage.
pub const CREATION_CONSUMER: &str = "creation";
/// Consumer name of the advance stage.
pub const ADVANCE_CONSUMER: &str = "advance";

/// Result of handling one lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// The snapshot after the transition, as announced.
    pub order: Order,
    /// Whether a status-advance event was scheduled for it.
    pub advance_scheduled: bool,
}

/// Applies lifecycle transitions and publishes their consequences.
#[derive(Debug, Clone)]
pub struct LifecycleProcessor {
    publisher: EventPublisher,
    processing_delay: Duration,
}

impl LifecycleProcessor {
    /// Create a processor publishing through `publisher`.
    #[must_use]
    pub const fn new(publisher: EventPublisher, processing_delay: Duration) -> Self {
        Self {
            publisher,
            processing_delay,
        }
    }

    /// Create a processor from pipeline tuning.
    #[must_use]
    pub fn from_config(event_bus: Arc<dyn EventBus>, config: &PipelineConfig) -> Self {
        Self::new(
            EventPublisher::new(event_bus, config.publish_retry.clone()),
            config.processing_delay,
        )
    }

    /// Handle a creation event: force `recibido`, announce it, and schedule
    /// the first advance.
    ///
    /// The incoming status is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Transport`] if either publish kept failing.
    pub async fn on_created(&self, order: Order) -> Result<Transition, PipelineError> {
        let order = order.with_status(OrderStatus::Received);
        self.announce_and_schedule(order).await
    }

    /// Handle a status-advance event: move to the next status, announce it,
    /// and schedule another advance unless the order is now `finalizado`.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Domain`] if the snapshot cannot advance (already
    ///   `finalizado`, or still `creado`)
    /// - [`PipelineError::Transport`] if a publish kept failing
    pub async fn on_advance(&self, order: Order) -> Result<Transition, PipelineError> {
        let (order_id, status) = (order.id, order.status);
        let order = order.advanced().map_err(|source| PipelineError::Domain {
            order_id,
            status,
            source,
        })?;
        self.announce_and_schedule(order).await
    }

    async fn announce_and_schedule(&self, order: Order) -> Result<Transition, PipelineError> {
        self.publisher.publish(NOTIFICATIONS_TOPIC, &order).await?;
        LifecycleMetrics::record_transition(order.status);
        tracing::info!(order_id = %order.id, status = %order.status, "Order transitioned");

        tokio::time::sleep(self.processing_delay).await;

        let advance_scheduled = !order.status.is_terminal();
        if advance_scheduled {
            self.publisher.publish(STATUS_TOPIC, &order).await?;
        } else {
            tracing::info!(order_id = %order.id, "Order finalized, lifecycle complete");
        }

        Ok(Transition {
            order,
            advance_scheduled,
        })
    }

    /// Spawn both stages as consumers in the same group.
    ///
    /// Returns the creation and advance consumer handles, in that order.
    /// Each resolves when shutdown is signalled on `shutdown` or when its
    /// stage fails fatally.
    #[must_use]
    pub fn spawn(
        self,
        event_bus: Arc<dyn EventBus>,
        config: &PipelineConfig,
        shutdown: &broadcast::Sender<()>,
    ) -> (ConsumerHandle, ConsumerHandle) {
        let processor = Arc::new(self);
        let creation = EventConsumer::new(
            CREATION_CONSUMER,
            vec![ORDERS_TOPIC],
            Arc::clone(&event_bus),
            Arc::new(CreationStage(Arc::clone(&processor))),
            config.max_in_flight,
            shutdown.subscribe(),
        );
        let advance = EventConsumer::new(
            ADVANCE_CONSUMER,
            vec![STATUS_TOPIC],
            event_bus,
            Arc::new(AdvanceStage(processor)),
            config.max_in_flight,
            shutdown.subscribe(),
        );

        (
            creation
                .with_resubscribe_delay(config.resubscribe_delay)
                .with_drain_timeout(config.drain_timeout)
                .spawn(),
            advance
                .with_resubscribe_delay(config.resubscribe_delay)
                .with_drain_timeout(config.drain_timeout)
                .spawn(),
        )
    }
}

/// Handler for the `orders` topic.
#[derive(Debug, Clone)]
pub struct CreationStage(pub Arc<LifecycleProcessor>);

impl OrderHandler for CreationStage {
    async fn handle(&self, order: Order) -> Result<(), PipelineError> {
        self.0.on_created(order).await.map(|_| ())
    }
}

/// Handler for the `status` topic.
#[derive(Debug, Clone)]
pub struct AdvanceStage(pub Arc<LifecycleProcessor>);

impl OrderHandler for AdvanceStage {
    async fn handle(&self, order: Order) -> Result<(), PipelineError> {
        self.0.on_advance(order).await.map(|_| ())
    }
}
