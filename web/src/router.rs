//! Routers for the two HTTP boundaries and the metrics scrape endpoint.

use crate::handlers;
use axum::{
    Router,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use order_lifecycle_runtime::{IntakeService, StatusIndex};
use tower_http::trace::TraceLayer;

/// Intake boundary.
///
/// # Routes
///
/// - `POST /` - submit an order (any other method on `/` gets 405)
/// - `GET /health` - liveness
///
/// # Example
///
/// ```rust,ignore
/// let app = intake_router(IntakeService::new(event_bus, ids));
/// axum::serve(listener, app).await?;
/// ```
pub fn intake_router(intake: IntakeService) -> Router {
    Router::new()
        .route("/", post(handlers::submit_order))
        .route("/health", get(handlers::health_check))
        .with_state(intake)
        .layer(TraceLayer::new_for_http())
}

/// Status query boundary.
///
/// # Routes
///
/// - `GET /order?id={id}` - latest status of an order
/// - `GET /health` - liveness
pub fn status_router(index: StatusIndex) -> Router {
    Router::new()
        .route("/order", get(handlers::order_status))
        .route("/health", get(handlers::health_check))
        .with_state(index)
        .layer(TraceLayer::new_for_http())
}

/// Prometheus scrape endpoint at `GET /metrics`.
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route("/metrics", get(move || async move { handle.render() }))
}
