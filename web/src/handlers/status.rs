//! Status query boundary.

use crate::{AppError, WebResult};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use order_lifecycle_core::OrderId;
use order_lifecycle_runtime::StatusIndex;
use serde::Deserialize;

/// Query string of the status endpoint.
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    /// Order id in decimal. Kept as text so a bad value is our 400, not a
    /// generic extractor rejection.
    pub id: Option<String>,
}

/// Latest known status of an order.
///
/// ```text
/// GET /order?id=42
/// ```
///
/// # Responses
///
/// - `200 OK` with the raw status string, e.g. `recibido`
/// - `400 Bad Request` if `id` is missing, repeated or not an integer
/// - `404 Not Found` if no notification for `id` has been processed
///
/// # Errors
///
/// Returns [`AppError`] for the 400 and 404 cases above.
#[allow(clippy::unused_async)]
pub async fn order_status(
    State(index): State<StatusIndex>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> WebResult<&'static str> {
    let Query(query) = query.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let raw = query
        .id
        .ok_or_else(|| AppError::bad_request("Query parameter id is required"))?;
    let id: OrderId = raw
        .trim()
        .parse()
        .map_err(|_| AppError::bad_request(format!("Order id {raw:?} is not an integer")))?;

    index
        .get(id)
        .map(|status| status.as_str())
        .ok_or_else(|| AppError::not_found("Order", id))
}
