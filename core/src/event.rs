//! Lifecycle events on the wire.
//!
//! Every topic carries the same payload: the JSON-encoded [`Order`] snapshot,
//! keyed by the decimal order id so that the broker routes all events of one
//! order to the same partition.
//!
//! ```json
//! {"id":17,"productName":"Widget","price":1500,"email":"a@example.com","status":"recibido"}
//! ```
//!
//! JSON rather than a binary format is used because the intake client, the
//! broker tooling and any external consumer read these payloads directly.

use crate::order::Order;
use thiserror::Error;

/// Creation events published by the intake service.
pub const ORDERS_TOPIC: &str = "orders";

/// Status-advance events. Re-entrant: the state machine both consumes and
/// produces them until an order is finalized.
pub const STATUS_TOPIC: &str = "status";

/// Notification events, one per status transition.
pub const NOTIFICATIONS_TOPIC: &str = "notifications";

/// Errors converting between [`Order`] and an [`EventRecord`].
#[derive(Error, Debug)]
pub enum CodecError {
    /// The record carried no payload at all.
    #[error("event on topic '{topic}' has an empty payload")]
    EmptyPayload {
        /// Topic the record came from.
        topic: String,
    },

    /// The payload is not a valid order snapshot.
    #[error("malformed order event on topic '{topic}': {source}")]
    Malformed {
        /// Topic the record came from.
        topic: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The snapshot could not be serialized.
    #[error("failed to encode order {order_id}: {source}")]
    Encode {
        /// Order being encoded.
        order_id: i64,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// A message as it travels through the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Topic the record was published to or read from.
    pub topic: String,
    /// Partition key, the decimal order id.
    pub key: String,
    /// JSON payload.
    pub payload: Vec<u8>,
}

impl EventRecord {
    /// Build a record from raw parts.
    #[must_use]
    pub fn new(topic: impl Into<String>, key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            payload,
        }
    }

    /// Encode an order snapshot for `topic`, keyed by its id.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if serialization fails.
    pub fn encode(topic: &str, order: &Order) -> Result<Self, CodecError> {
        let payload = serde_json::to_vec(order).map_err(|source| CodecError::Encode {
            order_id: order.id.get(),
            source,
        })?;
        Ok(Self::new(topic, order.id.partition_key(), payload))
    }

    /// Decode the order snapshot carried by this record.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::EmptyPayload`] or [`CodecError::Malformed`] if
    /// the payload is not an order snapshot, including one whose status is
    /// outside the lifecycle table.
    pub fn decode(&self) -> Result<Order, CodecError> {
        if self.payload.is_empty() {
            return Err(CodecError::EmptyPayload {
                topic: self.topic.clone(),
            });
        }
        serde_json::from_slice(&self.payload).map_err(|source| CodecError::Malformed {
            topic: self.topic.clone(),
            source,
        })
    }
}
