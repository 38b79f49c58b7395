//! # Order Lifecycle Server
//!
//! Deployable processes of the order lifecycle pipeline:
//!
//! | Binary | Role | Consumer group |
//! |---|---|---|
//! | `intake` | `POST /` publishes new orders to `orders` | none |
//! | `processor` | lifecycle state machine on `orders` and `status` | `process-order` |
//! | `notifier` | emails + status index on `notifications`, `GET /order` | `process-notifications` |
//! | `seed` | replays a JSON dataset against `intake` | none |
//!
//! All of them read [`Config`] from the environment (a `.env` file is loaded
//! first when present) and stop gracefully on Ctrl+C or SIGTERM.

pub mod config;
pub mod lifecycle;
pub mod seed;
pub mod telemetry;

pub use config::Config;
pub use lifecycle::{Supervisor, bind, shutdown_signal};
pub use seed::{SeedReport, load_dataset, replay};
pub use telemetry::init_tracing;

use order_lifecycle_runtime::metrics::install_recorder;
use order_lifecycle_web::metrics_router;

/// Default log directives when `RUST_LOG` is unset.
pub const DEFAULT_LOG_DIRECTIVES: &str = "info,rdkafka=warn,tower_http=info";

/// Install the Prometheus recorder and serve `/metrics` when
/// `METRICS_ADDR` is set.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed or the address
/// cannot be bound.
pub async fn serve_metrics(config: &Config, supervisor: &mut Supervisor) -> anyhow::Result<()> {
    let Some(addr) = config.server.metrics_addr.as_deref() else {
        return Ok(());
    };

    let handle = install_recorder()?;
    let listener = bind(addr).await?;
    tracing::info!(address = %addr, "Serving Prometheus metrics on /metrics");
    supervisor.serve("metrics", listener, metrics_router(handle));
    Ok(())
}
