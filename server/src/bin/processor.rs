//! Lifecycle processor.
//!
//! Consumes `orders` and `status`, moves each order one step through
//! `recibido -> preparando -> entregando -> finalizado`, and publishes a
//! notification for every transition.
//!
//! # Usage
//!
//! ```bash
//! REDPANDA_BROKERS=localhost:9092 PROCESSING_DELAY_MS=5000 \
//!   cargo run -p order-lifecycle-server --bin processor
//! ```

use order_lifecycle_core::EventBus;
use order_lifecycle_runtime::LifecycleProcessor;
use order_lifecycle_runtime::lifecycle::{ADVANCE_CONSUMER, CREATION_CONSUMER};
use order_lifecycle_server::{Config, DEFAULT_LOG_DIRECTIVES, Supervisor, init_tracing, serve_metrics};
use std::sync::Arc;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing(DEFAULT_LOG_DIRECTIVES);

    let config = Config::from_env();
    tracing::info!(
        brokers = %config.redpanda.brokers,
        group = %config.redpanda.processor_group,
        processing_delay_ms = config.pipeline.processing_delay.as_millis(),
        max_in_flight = config.pipeline.max_in_flight,
        "Starting lifecycle processor"
    );

    let (shutdown, _) = broadcast::channel(1);
    let mut supervisor = Supervisor::new(shutdown, config.pipeline.drain_timeout);
    serve_metrics(&config, &mut supervisor).await?;

    let event_bus: Arc<dyn EventBus> = Arc::new(config.event_bus(&config.redpanda.processor_group)?);
    let processor = LifecycleProcessor::from_config(Arc::clone(&event_bus), &config.pipeline);
    let (creation, advance) = processor.spawn(event_bus, &config.pipeline, supervisor.shutdown());
    supervisor.consumer(CREATION_CONSUMER, creation);
    supervisor.consumer(ADVANCE_CONSUMER, advance);

    supervisor.run().await
}
