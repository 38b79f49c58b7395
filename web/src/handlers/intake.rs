//! Intake boundary.

use crate::{AppError, WebResult};
use axum::{
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use order_lifecycle_runtime::{IntakeService, NewOrder};

/// Acknowledgment sent with every accepted order.
pub const ACKNOWLEDGMENT: &str = "Su compra fue recibida y enviada al sistema";

/// Accept a purchase and publish it to the pipeline.
///
/// The body is parsed by hand so that every malformed payload, whatever the
/// content type, is a 400.
///
/// ```text
/// POST /
/// Content-Type: application/json
///
/// {"productName": "Widget", "price": 1500, "email": "a@example.com"}
/// ```
///
/// # Responses
///
/// - `201 Created`, `Location: /order?id={id}`, plain-text acknowledgment
/// - `400 Bad Request` for malformed JSON or an invalid order
/// - `500 Internal Server Error` if the broker did not accept the order
///
/// # Errors
///
/// Returns [`AppError`] for the 400 and 500 cases above.
pub async fn submit_order(State(intake): State<IntakeService>, body: Bytes) -> WebResult<impl IntoResponse> {
    let request: NewOrder = serde_json::from_slice(&body)
        .map_err(|e| AppError::bad_request(format!("Malformed order request: {e}")))?;

    let id = intake.submit(request).await?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/order?id={id}"))],
        format!("{ACKNOWLEDGMENT} (pedido {id})"),
    ))
}
