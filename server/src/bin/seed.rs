//! Seed replayer.
//!
//! Posts every request of a JSON dataset to the intake server.
//!
//! # Usage
//!
//! ```bash
//! SEED_DATASET=dataset.json SEED_TARGET=http://localhost:8080/ \
//!   cargo run -p order-lifecycle-server --bin seed
//! ```
//!
//! The dataset is an array of purchase requests:
//!
//! ```json
//! [{"productName": "Widget", "price": 1500, "email": "a@example.com"}]
//! ```

use order_lifecycle_server::{Config, DEFAULT_LOG_DIRECTIVES, init_tracing, load_dataset, replay};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing(DEFAULT_LOG_DIRECTIVES);

    let config = Config::from_env();
    let orders = load_dataset(&config.seed.dataset)?;
    tracing::info!(
        dataset = %config.seed.dataset.display(),
        target = %config.seed.target,
        orders = orders.len(),
        "Replaying dataset"
    );

    let report = replay(&reqwest::Client::new(), &config.seed.target, &orders).await;
    tracing::info!(accepted = report.accepted, failed = report.failed, "Replay finished");
    Ok(())
}
