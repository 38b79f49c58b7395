//! Pipeline tuning.
//!
//! Values should be provided by the application, not hardcoded. The server
//! crate fills this from the environment.

use crate::retry::RetryPolicy;
use std::time::Duration;

/// Tuning shared by the lifecycle state machine and the notification dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Simulated fulfillment time between a transition and the next
    /// status-advance event.
    ///
    /// Default: 5 seconds
    pub processing_delay: Duration,

    /// Upper bound on messages handled concurrently by one consumer loop.
    ///
    /// Default: 256
    pub max_in_flight: usize,

    /// Backoff for publishing notification and status-advance events.
    pub publish_retry: RetryPolicy,

    /// Backoff for delivering notification emails.
    pub mail_retry: RetryPolicy,

    /// Pause before resubscribing after the event stream ends or the
    /// subscription fails.
    ///
    /// Default: 5 seconds
    pub resubscribe_delay: Duration,

    /// How long shutdown waits for in-flight messages to finish.
    ///
    /// Default: 30 seconds
    pub drain_timeout: Duration,
}

impl PipelineConfig {
    /// Set the processing delay.
    #[must_use]
    pub const fn with_processing_delay(mut self, delay: Duration) -> Self {
        self.processing_delay = delay;
        self
    }

    /// Set the in-flight bound. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Set the publish retry policy.
    #[must_use]
    pub fn with_publish_retry(mut self, policy: RetryPolicy) -> Self {
        self.publish_retry = policy;
        self
    }

    /// Set the mail retry policy.
    #[must_use]
    pub fn with_mail_retry(mut self, policy: RetryPolicy) -> Self {
        self.mail_retry = policy;
        self
    }

    /// Set the resubscribe delay.
    #[must_use]
    pub const fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = delay;
        self
    }

    /// Set the drain timeout.
    #[must_use]
    pub const fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            processing_delay: Duration::from_secs(5),
            max_in_flight: 256,
            publish_retry: RetryPolicy::default(),
            mail_retry: RetryPolicy::builder()
                .max_retries(3)
                .initial_delay(Duration::from_secs(1))
                .max_delay(Duration::from_secs(30))
                .build(),
            resubscribe_delay: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timing() {
        let config = PipelineConfig::default();
        assert_eq!(config.processing_delay, Duration::from_secs(5));
        assert_eq!(config.max_in_flight, 256);
    }

    #[test]
    fn in_flight_bound_is_at_least_one() {
        let config = PipelineConfig::default().with_max_in_flight(0);
        assert_eq!(config.max_in_flight, 1);
    }
}
