//! Intake server.
//!
//! Accepts purchase requests over HTTP and publishes them to `orders`.
//!
//! # Usage
//!
//! ```bash
//! REDPANDA_BROKERS=localhost:9092 cargo run -p order-lifecycle-server --bin intake
//!
//! curl -i -X POST http://localhost:8080/ \
//!   -H "Content-Type: application/json" \
//!   -d '{"productName": "Widget", "price": 1500, "email": "a@example.com"}'
//! ```

use order_lifecycle_runtime::IntakeService;
use order_lifecycle_server::{Config, DEFAULT_LOG_DIRECTIVES, Supervisor, bind, init_tracing, serve_metrics};
use order_lifecycle_web::intake_router;
use std::sync::Arc;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing(DEFAULT_LOG_DIRECTIVES);

    let config = Config::from_env();
    tracing::info!(
        brokers = %config.redpanda.brokers,
        address = %config.server.intake_addr,
        "Starting intake server"
    );

    let (shutdown, _) = broadcast::channel(1);
    let mut supervisor = Supervisor::new(shutdown, config.pipeline.drain_timeout);
    serve_metrics(&config, &mut supervisor).await?;

    // Intake only publishes; the group is never joined.
    let event_bus = Arc::new(config.event_bus("order-intake")?);
    let intake = IntakeService::new(event_bus, Arc::new(config.order_ids()));

    let listener = bind(&config.server.intake_addr).await?;
    supervisor.serve("intake", listener, intake_router(intake));
    tracing::info!("Intake server listening on POST /");

    supervisor.run().await
}
