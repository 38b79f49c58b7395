//! The order aggregate and its lifecycle.
//!
//! An [`Order`] travels through the pipeline as a full snapshot. Only `status`
//! ever changes, and it changes one step at a time along a fixed line:
//!
//! ```text
//! creado ─► recibido ─► preparando ─► entregando ─► finalizado
//! ```
//!
//! `finalizado` is terminal. The status strings are part of the wire contract
//! and are served verbatim by the status query endpoint.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Unique identifier of an order.
///
/// Assigned once by the intake service and never changed. Its decimal form is
/// the partition key of every event that concerns the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(i64);

impl OrderId {
    /// Wrap a raw identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw 64-bit value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Partition key used on every topic: the decimal string form.
    #[must_use]
    pub fn partition_key(self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OrderId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}

/// Position of an order in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Accepted by intake, not yet seen by the state machine.
    #[default]
    #[serde(rename = "creado")]
    Created,
    /// First forced transition, applied when the creation event is consumed.
    #[serde(rename = "recibido")]
    Received,
    /// Being prepared.
    #[serde(rename = "preparando")]
    Preparing,
    /// Out for delivery.
    #[serde(rename = "entregando")]
    Delivering,
    /// Delivered. Terminal.
    #[serde(rename = "finalizado")]
    Finalized,
}

impl OrderStatus {
    /// Every status in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Created,
        Self::Received,
        Self::Preparing,
        Self::Delivering,
        Self::Finalized,
    ];

    /// Wire representation of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "creado",
            Self::Received => "recibido",
            Self::Preparing => "preparando",
            Self::Delivering => "entregando",
            Self::Finalized => "finalizado",
        }
    }

    /// Whether no further transition may leave this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized)
    }

    /// The status that follows `self` on the status-advance stream.
    ///
    /// Only `recibido`, `preparando` and `entregando` advance here. `creado`
    /// leaves through the forced hop on the creation stream, and `finalizado`
    /// never leaves.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when `self` is `creado` or `finalizado`.
    pub const fn next(self) -> Result<Self, TransitionError> {
        match self {
            Self::Received => Ok(Self::Preparing),
            Self::Preparing => Ok(Self::Delivering),
            Self::Delivering => Ok(Self::Finalized),
            Self::Finalized => Err(TransitionError::Terminal),
            Self::Created => Err(TransitionError::NotAdvanceable(self)),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transition that the lifecycle table does not allow.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// The order already reached `finalizado`.
    #[error("order is already finalized")]
    Terminal,

    /// The status does not advance on the status stream.
    #[error("status {0} cannot be advanced")]
    NotAdvanceable(OrderStatus),
}

/// Snapshot of an order at one point in its lifecycle.
///
/// Every lifecycle event carries a complete snapshot rather than a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Identity, immutable after creation.
    pub id: OrderId,
    /// Display name of the purchased product.
    pub product_name: String,
    /// Price in minor currency units.
    pub price: i64,
    /// Notification destination.
    pub email: String,
    /// Current lifecycle position.
    #[serde(default)]
    pub status: OrderStatus,
}

impl Order {
    /// Create a new order in the `creado` status.
    #[must_use]
    pub fn new(id: OrderId, product_name: impl Into<String>, price: i64, email: impl Into<String>) -> Self {
        Self {
            id,
            product_name: product_name.into(),
            price,
            email: email.into(),
            status: OrderStatus::Created,
        }
    }

    /// Same order, with the given status.
    #[must_use]
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    /// Snapshot after one step on the status stream.
    ///
    /// # Errors
    ///
    /// Propagates [`TransitionError`] from [`OrderStatus::next`].
    pub fn advanced(self) -> Result<Self, TransitionError> {
        let next = self.status.next()?;
        Ok(self.with_status(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn widget() -> Order {
        Order::new(OrderId::new(7), "Widget", 1500, "a@example.com")
    }

    #[test]
    fn new_order_starts_created() {
        assert_eq!(widget().status, OrderStatus::Created);
    }

    #[test]
    fn advance_walks_the_table() {
        let order = widget().with_status(OrderStatus::Received);
        let order = order.advanced().unwrap();
        assert_eq!(order.status, OrderStatus::Preparing);
        let order = order.advanced().unwrap();
        assert_eq!(order.status, OrderStatus::Delivering);
        let order = order.advanced().unwrap();
        assert_eq!(order.status, OrderStatus::Finalized);
        assert!(order.status.is_terminal());
    }

    #[test]
    fn finalized_does_not_advance() {
        let order = widget().with_status(OrderStatus::Finalized);
        assert_eq!(order.advanced(), Err(TransitionError::Terminal));
    }

    #[test]
    fn created_does_not_advance_on_status_stream() {
        assert_eq!(
            OrderStatus::Created.next(),
            Err(TransitionError::NotAdvanceable(OrderStatus::Created))
        );
    }

    #[test]
    fn display_matches_wire_string() {
        for status in OrderStatus::ALL {
            let wire = serde_json::to_string(&status).unwrap();
            assert_eq!(wire, format!("\"{status}\""));
            assert_eq!(serde_json::from_str::<OrderStatus>(&wire).unwrap(), status);
        }
        assert!(serde_json::from_str::<OrderStatus>("\"enviado\"").is_err());
    }

    #[test]
    fn order_id_parses_decimal() {
        assert_eq!("42".parse::<OrderId>(), Ok(OrderId::new(42)));
        assert!("abc".parse::<OrderId>().is_err());
        assert_eq!(OrderId::new(42).partition_key(), "42");
    }

    proptest! {
        #[test]
        fn advancing_never_skips_or_repeats(start in 1usize..4) {
            let mut status = OrderStatus::ALL[start];
            let mut seen = vec![status];
            while let Ok(next) = status.next() {
                prop_assert!(next > status);
                status = next;
                seen.push(status);
            }
            prop_assert_eq!(status, OrderStatus::Finalized);
            prop_assert_eq!(&seen[..], &OrderStatus::ALL[start..]);
        }
    }
}
