//! Latest known status per order.
//!
//! Written by the notification dispatcher, read by the status query endpoint.
//! Each write touches exactly one key; there is no multi-key transaction.
//! Entries live for the lifetime of the process.

use dashmap::DashMap;
use order_lifecycle_core::{OrderId, OrderStatus};
use std::sync::Arc;

/// Concurrent map from order id to the status of the most recently processed
/// notification for it.
///
/// Cloning is cheap and clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct StatusIndex {
    entries: Arc<DashMap<OrderId, OrderStatus>>,
}

impl StatusIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `status` for `id`, replacing any previous value.
    ///
    /// Last write wins. Returns the status that was replaced, if any.
    pub fn record(&self, id: OrderId, status: OrderStatus) -> Option<OrderStatus> {
        self.entries.insert(id, status)
    }

    /// Latest status seen for `id`, or `None` if no notification for it has
    /// been processed yet.
    #[must_use]
    pub fn get(&self, id: OrderId) -> Option<OrderStatus> {
        self.entries.get(&id).map(|entry| *entry.value())
    }

    /// Number of orders tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no order has been seen yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
