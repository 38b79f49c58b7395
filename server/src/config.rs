//! Configuration for the pipeline processes.
//!
//! Loaded from environment variables with sensible defaults. Every binary
//! reads the same [`Config`] and uses the parts it needs.

use order_lifecycle_core::{AtomicOrderIdGenerator, EventBusError};
use order_lifecycle_redpanda::RedpandaEventBus;
use order_lifecycle_runtime::{PipelineConfig, SmtpConfig};
use std::env;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Broker connection and consumer groups
    pub redpanda: RedpandaConfig,
    /// HTTP listen addresses
    pub server: ServerConfig,
    /// Lifecycle and notification tuning
    pub pipeline: PipelineConfig,
    /// First order id issued by this intake process, if pinned
    pub order_id_start: Option<i64>,
    /// SMTP relay; notifications are only logged when absent
    pub smtp: Option<SmtpConfig>,
    /// Seed replayer settings
    pub seed: SeedConfig,
}

/// Redpanda/Kafka configuration
#[derive(Debug, Clone)]
pub struct RedpandaConfig {
    /// Broker addresses (comma-separated)
    pub brokers: String,
    /// Consumer group shared by the two lifecycle stages
    pub processor_group: String,
    /// Consumer group of the notification dispatcher
    pub notifier_group: String,
    /// Where a new group starts reading: earliest, latest or error
    pub auto_offset_reset: String,
}

/// HTTP listen addresses
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Intake boundary (default: 0.0.0.0:8080)
    pub intake_addr: String,
    /// Status query boundary (default: 0.0.0.0:8081)
    pub status_addr: String,
    /// Prometheus scrape endpoint; disabled when unset
    pub metrics_addr: Option<String>,
}

/// Seed replayer settings
#[derive(Debug, Clone)]
pub struct SeedConfig {
    /// JSON array of purchase requests
    pub dataset: PathBuf,
    /// Intake endpoint the requests are posted to
    pub target: String,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Variables that are set but do not parse fall back to their default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its
    /// value.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        let defaults = PipelineConfig::default();
        let pipeline = defaults
            .clone()
            .with_processing_delay(
                parsed("PROCESSING_DELAY_MS").map_or(defaults.processing_delay, Duration::from_millis),
            )
            .with_max_in_flight(
                parsed("MAX_IN_FLIGHT")
                    .and_then(|n| usize::try_from(n).ok())
                    .unwrap_or(defaults.max_in_flight),
            )
            .with_drain_timeout(parsed("SHUTDOWN_TIMEOUT").map_or(defaults.drain_timeout, Duration::from_secs));

        let smtp = lookup("SMTP_HOST")
            .filter(|host| !host.trim().is_empty())
            .map(|host| SmtpConfig {
                host,
                port: lookup("SMTP_PORT").and_then(|s| s.parse().ok()).unwrap_or(587),
                username: lookup("SMTP_USERNAME"),
                password: lookup("SMTP_PASSWORD"),
                from: lookup("MAIL_FROM").unwrap_or_else(|| "pedidos@example.com".to_string()),
            });

        Self {
            redpanda: RedpandaConfig {
                brokers: lookup("REDPANDA_BROKERS").unwrap_or_else(|| "localhost:9092".to_string()),
                processor_group: lookup("PROCESSOR_CONSUMER_GROUP").unwrap_or_else(|| "process-order".to_string()),
                notifier_group: lookup("NOTIFIER_CONSUMER_GROUP")
                    .unwrap_or_else(|| "process-notifications".to_string()),
                auto_offset_reset: lookup("AUTO_OFFSET_RESET").unwrap_or_else(|| "earliest".to_string()),
            },
            server: ServerConfig {
                intake_addr: lookup("INTAKE_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
                status_addr: lookup("STATUS_ADDR").unwrap_or_else(|| "0.0.0.0:8081".to_string()),
                metrics_addr: lookup("METRICS_ADDR").filter(|addr| !addr.trim().is_empty()),
            },
            pipeline,
            order_id_start: lookup("ORDER_ID_START").and_then(|s| s.trim().parse().ok()),
            smtp,
            seed: SeedConfig {
                dataset: lookup("SEED_DATASET").map_or_else(|| PathBuf::from("dataset.json"), PathBuf::from),
                target: lookup("SEED_TARGET").unwrap_or_else(|| "http://localhost:8080/".to_string()),
            },
        }
    }

    /// Event bus joined to `consumer_group`.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError`] if the producer cannot be created or the
    /// offset reset policy is invalid.
    pub fn event_bus(&self, consumer_group: &str) -> Result<RedpandaEventBus, EventBusError> {
        RedpandaEventBus::builder()
            .brokers(&self.redpanda.brokers)
            .consumer_group(consumer_group)
            .auto_offset_reset(&self.redpanda.auto_offset_reset)
            .build()
    }

    /// Id counter for the intake process.
    ///
    /// Starts at `ORDER_ID_START` when set, otherwise one past the current
    /// unix time in milliseconds so that a restarted intake does not reissue
    /// ids.
    #[must_use]
    pub fn order_ids(&self) -> AtomicOrderIdGenerator {
        match self.order_id_start {
            Some(first) => AtomicOrderIdGenerator::starting_after(first.saturating_sub(1)),
            None => AtomicOrderIdGenerator::starting_after(unix_millis()),
        }
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|elapsed| i64::try_from(elapsed.as_millis()).ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use order_lifecycle_core::{OrderId, OrderIdGenerator};
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config(&[]);

        assert_eq!(config.redpanda.brokers, "localhost:9092");
        assert_eq!(config.redpanda.processor_group, "process-order");
        assert_eq!(config.redpanda.notifier_group, "process-notifications");
        assert_eq!(config.redpanda.auto_offset_reset, "earliest");
        assert_eq!(config.server.intake_addr, "0.0.0.0:8080");
        assert_eq!(config.server.status_addr, "0.0.0.0:8081");
        assert!(config.server.metrics_addr.is_none());
        assert_eq!(config.pipeline, PipelineConfig::default());
        assert!(config.smtp.is_none());
        assert_eq!(config.seed.dataset, PathBuf::from("dataset.json"));
        assert_eq!(config.seed.target, "http://localhost:8080/");
    }

    #[test]
    fn pipeline_tuning_is_read() {
        let config = config(&[
            ("PROCESSING_DELAY_MS", "250"),
            ("MAX_IN_FLIGHT", "8"),
            ("SHUTDOWN_TIMEOUT", "3"),
        ]);

        assert_eq!(config.pipeline.processing_delay, Duration::from_millis(250));
        assert_eq!(config.pipeline.max_in_flight, 8);
        assert_eq!(config.pipeline.drain_timeout, Duration::from_secs(3));
    }

    #[test]
    fn unparsable_values_fall_back() {
        let config = config(&[("PROCESSING_DELAY_MS", "soon"), ("MAX_IN_FLIGHT", "-1")]);

        assert_eq!(config.pipeline.processing_delay, Duration::from_secs(5));
        assert_eq!(config.pipeline.max_in_flight, 256);
    }

    #[test]
    fn smtp_is_enabled_by_host() {
        let config = config(&[("SMTP_HOST", "smtp.example.com"), ("SMTP_USERNAME", "bot")]);

        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.host, "smtp.example.com");
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.username.as_deref(), Some("bot"));
        assert!(smtp.password.is_none());
    }

    #[test]
    fn pinned_order_ids_start_at_the_given_value() {
        let ids = config(&[("ORDER_ID_START", "1000")]).order_ids();
        assert_eq!(ids.next_id(), OrderId::new(1000));
        assert_eq!(ids.next_id(), OrderId::new(1001));
    }

    #[test]
    fn clock_seeded_ids_are_past_the_epoch() {
        let ids = config(&[]).order_ids();
        assert!(ids.next_id().get() > 1_600_000_000_000);
    }
}
