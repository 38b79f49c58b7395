//! Dataset replayer for the intake endpoint.

use anyhow::Context;
use order_lifecycle_runtime::NewOrder;
use std::path::Path;
use tracing::{info, warn};

/// Outcome of one replay.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    /// Requests the intake answered with a success status.
    pub accepted: usize,
    /// Requests that failed to send or were rejected.
    pub failed: usize,
}

/// Read a JSON array of purchase requests.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not an array of
/// `{productName, price, email}` objects.
pub fn load_dataset(path: &Path) -> anyhow::Result<Vec<NewOrder>> {
    let content = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&content).with_context(|| format!("failed to parse {}", path.display()))
}

/// POST every request to `target`, one at a time.
///
/// A failed request is logged and the replay moves on to the next one.
pub async fn replay(client: &reqwest::Client, target: &str, orders: &[NewOrder]) -> SeedReport {
    let mut report = SeedReport::default();

    for (position, order) in orders.iter().enumerate() {
        let response = match client.post(target).json(order).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(position, error = %e, "Failed to send order");
                report.failed += 1;
                continue;
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_success() {
            info!(position, status = %status, response = %body, "Order submitted");
            report.accepted += 1;
        } else {
            warn!(position, status = %status, response = %body, "Order rejected");
            report.failed += 1;
        }
    }

    report
}
