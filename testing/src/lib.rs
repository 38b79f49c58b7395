//! # Order Lifecycle Testing
//!
//! Testing utilities for the order lifecycle pipeline.
//!
//! This crate provides:
//! - [`InMemoryEventBus`]: a broker double with history and failure injection
//! - Mail doubles that record or fail deliveries
//! - Fixtures and fast pipeline tuning for scenario tests
//! - proptest strategies for domain types
//!
//! ## Example
//!
//! ```ignore
//! use order_lifecycle_testing::{InMemoryEventBus, RecordingMailer, helpers};
//!
//! #[tokio::test(start_paused = true)]
//! async fn order_reaches_finalized() {
//!     let bus = Arc::new(InMemoryEventBus::new());
//!     let mailer = RecordingMailer::new();
//!     let config = helpers::fast_config();
//!     // spawn processor and notifier, submit helpers::widget_request() ...
//! }
//! ```

mod event_bus;
mod mailer;

/// Broker and mail doubles.
pub mod mocks {
    pub use crate::event_bus::InMemoryEventBus;
    pub use crate::mailer::{FailingMailer, RecordingMailer};
}

/// Fixtures and setup shared by scenario tests.
pub mod helpers {
    use order_lifecycle_core::{Order, OrderId};
    use order_lifecycle_runtime::{NewOrder, PipelineConfig, RetryPolicy};
    use std::time::Duration;

    /// The purchase used throughout the scenarios.
    #[must_use]
    pub fn widget_request() -> NewOrder {
        NewOrder {
            product_name: "Widget".to_string(),
            price: 1500,
            email: "a@example.com".to_string(),
        }
    }

    /// [`widget_request`] as a freshly created order with id `id`.
    #[must_use]
    pub fn widget_order(id: i64) -> Order {
        let request = widget_request();
        Order::new(OrderId::new(id), request.product_name, request.price, request.email)
    }

    /// Pipeline tuning with deterministic retries and short pauses.
    ///
    /// The processing delay stays at 5 seconds so paused-clock tests can reason
    /// in delay intervals.
    #[must_use]
    pub fn fast_config() -> PipelineConfig {
        let retry = RetryPolicy::builder()
            .max_retries(2)
            .initial_delay(Duration::from_millis(10))
            .jitter(0.0)
            .build();

        PipelineConfig::default()
            .with_publish_retry(retry.clone())
            .with_mail_retry(retry)
            .with_resubscribe_delay(Duration::from_millis(50))
            .with_drain_timeout(Duration::from_secs(1))
    }

    /// Route `tracing` output to the test harness.
    ///
    /// Safe to call from every test; only the first call installs.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("order_lifecycle=debug")
            .with_test_writer()
            .try_init();
    }
}

/// proptest strategies for domain types.
pub mod properties {
    use order_lifecycle_core::{Order, OrderId, OrderStatus};
    use proptest::prelude::*;

    /// Any status, terminal ones included.
    pub fn any_status() -> impl Strategy<Value = OrderStatus> {
        proptest::sample::select(OrderStatus::ALL.to_vec())
    }

    /// Orders with arbitrary ids, names, prices and statuses.
    pub fn any_order() -> impl Strategy<Value = Order> {
        (any::<i64>(), "[A-Za-z ]{1,24}", 0..1_000_000i64, any_status()).prop_map(
            |(id, name, price, status)| {
                Order::new(OrderId::new(id), name, price, "a@example.com").with_status(status)
            },
        )
    }
}

pub use mocks::{FailingMailer, InMemoryEventBus, RecordingMailer};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widget_fixture_is_valid() {
        assert!(helpers::widget_request().validate().is_ok());
        assert_eq!(helpers::widget_order(9).id.get(), 9);
    }
}
