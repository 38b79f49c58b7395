//! Liveness endpoint.

use axum::http::StatusCode;

/// Liveness check.
///
/// Returns 200 while the process is serving requests. Broker connectivity is
/// not checked.
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}
