//! Order intake: turn a purchase request into an `orders` event.

use crate::error::IntakeError;
use crate::metrics::ORDERS_SUBMITTED;
use order_lifecycle_core::{EventBus, EventRecord, ORDERS_TOPIC, Order, OrderId, OrderIdGenerator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A purchase request as received from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    /// Display name of the product.
    pub product_name: String,
    /// Price in minor currency units.
    pub price: i64,
    /// Notification destination.
    pub email: String,
}

impl NewOrder {
    /// Check that the request describes an order that can be processed.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::Invalid`] for a blank product name, a negative
    /// price, or an email without a local part and a domain.
    pub fn validate(&self) -> Result<(), IntakeError> {
        if self.product_name.trim().is_empty() {
            return Err(IntakeError::Invalid("productName must not be blank".to_string()));
        }
        if self.price < 0 {
            return Err(IntakeError::Invalid("price must not be negative".to_string()));
        }
        match self.email.trim().split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
            _ => Err(IntakeError::Invalid(format!("email {:?} is not an address", self.email))),
        }
    }
}

/// Accepts new orders and publishes their creation events.
///
/// Publishing is attempted once. If the broker does not accept the event the
/// caller gets an error and is expected to resubmit.
#[derive(Clone)]
pub struct IntakeService {
    event_bus: Arc<dyn EventBus>,
    ids: Arc<dyn OrderIdGenerator>,
}

impl IntakeService {
    /// Create an intake service publishing to `event_bus`.
    #[must_use]
    pub fn new(event_bus: Arc<dyn EventBus>, ids: Arc<dyn OrderIdGenerator>) -> Self {
        Self { event_bus, ids }
    }

    /// Validate, assign an id, and publish the order to `orders`.
    ///
    /// Returns the new id only after the broker accepted the event.
    ///
    /// # Errors
    ///
    /// - [`IntakeError::Invalid`] if the request fails validation (no id is consumed)
    /// - [`IntakeError::Publish`] if the broker rejected the event
    pub async fn submit(&self, request: NewOrder) -> Result<OrderId, IntakeError> {
        request.validate()?;

        let order = Order::new(self.ids.next_id(), request.product_name, request.price, request.email);
        let record = EventRecord::encode(ORDERS_TOPIC, &order)?;

        self.event_bus.publish(ORDERS_TOPIC, &record).await.map_err(|e| {
            tracing::error!(order_id = %order.id, error = %e, "Failed to publish new order");
            IntakeError::Publish(e)
        })?;

        metrics::counter!(ORDERS_SUBMITTED).increment(1);
        tracing::info!(
            order_id = %order.id,
            product = %order.product_name,
            price = order.price,
            "Order accepted"
        );
        Ok(order.id)
    }
}
