//! Notification dispatcher and status query server.
//!
//! Consumes `notifications`, records the latest status of each order and
//! emails the customer. Serves `GET /order?id={id}` from the same process.
//!
//! Without `SMTP_HOST` notifications are logged instead of sent.
//!
//! # Usage
//!
//! ```bash
//! REDPANDA_BROKERS=localhost:9092 SMTP_HOST=smtp.example.com \
//!   SMTP_USERNAME=bot SMTP_PASSWORD=secret MAIL_FROM=pedidos@example.com \
//!   cargo run -p order-lifecycle-server --bin notifier
//!
//! curl http://localhost:8081/order?id=1700000000001
//! ```

use order_lifecycle_core::EventBus;
use order_lifecycle_runtime::notifier::NOTIFIER_CONSUMER;
use order_lifecycle_runtime::{ConsoleMailer, Mailer, NotificationDispatcher, SmtpMailer, StatusIndex};
use order_lifecycle_server::{Config, DEFAULT_LOG_DIRECTIVES, Supervisor, bind, init_tracing, serve_metrics};
use order_lifecycle_web::status_router;
use std::sync::Arc;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing(DEFAULT_LOG_DIRECTIVES);

    let config = Config::from_env();
    tracing::info!(
        brokers = %config.redpanda.brokers,
        group = %config.redpanda.notifier_group,
        address = %config.server.status_addr,
        smtp = config.smtp.is_some(),
        "Starting notifier"
    );

    let (shutdown, _) = broadcast::channel(1);
    let mut supervisor = Supervisor::new(shutdown, config.pipeline.drain_timeout);
    serve_metrics(&config, &mut supervisor).await?;

    let event_bus: Arc<dyn EventBus> = Arc::new(config.event_bus(&config.redpanda.notifier_group)?);
    let index = StatusIndex::new();

    match &config.smtp {
        Some(smtp) => {
            tracing::info!(host = %smtp.host, port = smtp.port, "Sending notifications over SMTP");
            start_dispatcher(SmtpMailer::new(smtp)?, index.clone(), event_bus, &config, &mut supervisor);
        }
        None => {
            tracing::info!("SMTP_HOST not set, notifications will be logged only");
            start_dispatcher(ConsoleMailer::new(), index.clone(), event_bus, &config, &mut supervisor);
        }
    }

    let listener = bind(&config.server.status_addr).await?;
    supervisor.serve("status", listener, status_router(index));
    tracing::info!("Status server listening on GET /order");

    supervisor.run().await
}

fn start_dispatcher<M: Mailer + 'static>(
    mailer: M,
    index: StatusIndex,
    event_bus: Arc<dyn EventBus>,
    config: &Config,
    supervisor: &mut Supervisor,
) {
    let dispatcher = NotificationDispatcher::new(index, mailer, config.pipeline.mail_retry.clone());
    let handle = dispatcher.spawn(event_bus, &config.pipeline, supervisor.shutdown());
    supervisor.consumer(NOTIFIER_CONSUMER, handle);
}
