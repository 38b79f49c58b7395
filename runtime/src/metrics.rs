//! Prometheus metrics for the pipeline.
//!
//! Components record through the `metrics` facade. Nothing is exported until a
//! binary calls [`install_recorder`] and serves the returned handle.
//!
//! # Example
//!
//! ```rust,no_run
//! use order_lifecycle_runtime::metrics::install_recorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handle = install_recorder()?;
//! println!("{}", handle.render());
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use order_lifecycle_core::OrderStatus;
use std::time::Duration;
use thiserror::Error;

/// Orders accepted by intake.
pub const ORDERS_SUBMITTED: &str = "orders_submitted_total";
/// Transitions applied by the state machine, labelled by resulting status.
pub const LIFECYCLE_TRANSITIONS: &str = "lifecycle_transitions_total";
/// Messages skipped by a consumer loop, labelled by reason.
pub const MESSAGES_SKIPPED: &str = "lifecycle_messages_skipped_total";
/// Time spent handling one lifecycle message, processing delay included.
pub const HANDLER_DURATION: &str = "lifecycle_handler_duration_seconds";
/// Notification emails delivered.
pub const NOTIFICATIONS_SENT: &str = "notifications_sent_total";
/// Notification emails given up on.
pub const NOTIFICATIONS_FAILED: &str = "notifications_failed_total";
/// Retries of transient failures, labelled by operation.
pub const PIPELINE_RETRIES: &str = "pipeline_retries_total";

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Install the global Prometheus recorder and describe every pipeline metric.
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if a recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, MetricsError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.01, 0.1, 0.5, 1.0, 2.5, 5.0, 5.5, 6.0, 7.5, 10.0, 30.0],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    describe_metrics();
    tracing::info!("Prometheus metrics recorder installed");
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!(ORDERS_SUBMITTED, "Orders accepted by the intake service");
    describe_counter!(LIFECYCLE_TRANSITIONS, "Status transitions applied by the state machine");
    describe_counter!(MESSAGES_SKIPPED, "Lifecycle messages skipped without processing");
    describe_histogram!(HANDLER_DURATION, "Time taken to handle a lifecycle message");
    describe_counter!(NOTIFICATIONS_SENT, "Notification emails delivered");
    describe_counter!(NOTIFICATIONS_FAILED, "Notification emails dropped after retries");
    describe_counter!(PIPELINE_RETRIES, "Retries of transient broker or mail failures");
}

/// Lifecycle state machine metrics recorder.
pub struct LifecycleMetrics;

impl LifecycleMetrics {
    /// Record a transition into `status`.
    pub fn record_transition(status: OrderStatus) {
        counter!(LIFECYCLE_TRANSITIONS, "status" => status.as_str()).increment(1);
    }

    /// Record a skipped message.
    pub fn record_skipped(reason: &'static str) {
        counter!(MESSAGES_SKIPPED, "reason" => reason).increment(1);
    }

    /// Record how long a handler ran.
    pub fn record_handled(consumer: &'static str, duration: Duration) {
        histogram!(HANDLER_DURATION, "consumer" => consumer).record(duration.as_secs_f64());
    }
}

/// Notification delivery metrics recorder.
pub struct NotificationMetrics;

impl NotificationMetrics {
    /// Record a delivered email.
    pub fn record_sent() {
        counter!(NOTIFICATIONS_SENT).increment(1);
    }

    /// Record an email given up on.
    pub fn record_failed() {
        counter!(NOTIFICATIONS_FAILED).increment(1);
    }
}
