//! Order identity generation.

use crate::order::OrderId;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of order identifiers.
///
/// Implementations must hand out strictly increasing, never repeating ids and
/// must be safe to call from any number of concurrent requests.
pub trait OrderIdGenerator: Send + Sync {
    /// Issue the next identifier.
    fn next_id(&self) -> OrderId;
}

/// Process-local counter.
///
/// Uniqueness holds only for the lifetime of the process. Callers that restart
/// should seed the counter past every id issued before, e.g. from the clock
/// with [`AtomicOrderIdGenerator::starting_after`].
#[derive(Debug, Default)]
pub struct AtomicOrderIdGenerator {
    last: AtomicI64,
}

impl AtomicOrderIdGenerator {
    /// Counter whose first id is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self::starting_after(0)
    }

    /// Counter whose first id is `last + 1`.
    #[must_use]
    pub const fn starting_after(last: i64) -> Self {
        Self {
            last: AtomicI64::new(last),
        }
    }
}

impl OrderIdGenerator for AtomicOrderIdGenerator {
    fn next_id(&self) -> OrderId {
        OrderId::new(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }
}
