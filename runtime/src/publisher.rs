//! Publishing order snapshots from inside a consumer loop.

use crate::error::PipelineError;
use crate::retry::{RetryPolicy, retry_transient};
use order_lifecycle_core::{EventBus, EventRecord, Order};
use std::sync::Arc;

/// Encodes order snapshots and publishes them with bounded retry.
///
/// Unlike intake, which reports a failed publish straight to the client,
/// consumer loops have nobody to hand the failure to. Transient broker errors
/// are retried under the configured policy; once it is exhausted the failure
/// surfaces as [`PipelineError::Transport`], which is fatal for the loop.
#[derive(Clone)]
pub struct EventPublisher {
    event_bus: Arc<dyn EventBus>,
    retry: RetryPolicy,
}

impl EventPublisher {
    /// Create a publisher over `event_bus`.
    #[must_use]
    pub fn new(event_bus: Arc<dyn EventBus>, retry: RetryPolicy) -> Self {
        Self { event_bus, retry }
    }

    /// Publish `order` to `topic`, keyed by its id.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Codec`] if the snapshot cannot be encoded
    /// - [`PipelineError::Transport`] if the broker kept failing, or failed
    ///   with a non-transient error
    pub async fn publish(&self, topic: &'static str, order: &Order) -> Result<(), PipelineError> {
        let record = EventRecord::encode(topic, order)?;

        retry_transient(&self.retry, topic, || self.event_bus.publish(topic, &record))
            .await
            .map_err(|source| PipelineError::Transport {
                order_id: order.id,
                source,
            })?;

        tracing::debug!(order_id = %order.id, status = %order.status, topic, "Published order snapshot");
        Ok(())
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher").field("retry", &self.retry).finish_non_exhaustive()
    }
}
