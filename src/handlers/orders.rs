//! Order lookup endpoints, including the post-payment reconciliation poller.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::services::orders::OrderResponse;
use crate::AppState;

/// Returned when the completion event has not arrived within the poll budget.
/// "Processing" is deliberately distinct from 404: the order may still appear.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProcessingResponse {
    pub status: String,
    pub payment_reference: String,
}

/// Polls for the order materialized from a completed payment.
///
/// The storefront calls this right after payment confirmation, racing the
/// processor's webhook delivery. The handler retries the lookup within a
/// bounded budget; exhaustion answers 202 so the client knows to try again.
#[utoipa::path(
    get,
    path = "/api/v1/orders/by-reference/{payment_reference}",
    params(("payment_reference" = String, Path, description = "Processor-issued payment reference")),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 202, description = "Order not yet materialized", body = ProcessingResponse)
    ),
    tag = "orders"
)]
#[instrument(skip(state))]
pub async fn get_order_by_reference(
    State(state): State<AppState>,
    Path(payment_reference): Path<String>,
) -> Result<Response, ServiceError> {
    let policy = state.config.poller_retry.policy();
    match state
        .services
        .orders
        .await_by_reference(&payment_reference, policy)
        .await?
    {
        Some(order) => Ok(Json(order).into_response()),
        None => Ok((
            StatusCode::ACCEPTED,
            Json(ProcessingResponse {
                status: "processing".to_string(),
                payment_reference,
            }),
        )
            .into_response()),
    }
}

/// Fetches an order by its order number.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_number}",
    params(("order_number" = String, Path, description = "Order number")),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 404, description = "No such order")
    ),
    tag = "orders"
)]
#[instrument(skip(state))]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<Json<OrderResponse>, ServiceError> {
    state
        .services
        .orders
        .get_by_order_number(&order_number)
        .await?
        .map(Json)
        .ok_or_else(|| ServiceError::NotFound(format!("Order {order_number} not found")))
}

/// Downloads the PDF receipt for an order, rendering it on demand when
/// fulfillment has not stored one yet.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_number}/receipt",
    params(("order_number" = String, Path, description = "Order number")),
    responses(
        (status = 200, description = "PDF receipt", content_type = "application/pdf"),
        (status = 404, description = "No such order")
    ),
    tag = "orders"
)]
#[instrument(skip(state))]
pub async fn get_order_receipt(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let (order, items) = state
        .services
        .orders
        .find_model_by_order_number(&order_number)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {order_number} not found")))?;

    let receipt = state.services.fulfillment.ensure_receipt(&order, &items).await?;

    let headers = [
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"receipt-{}.pdf\"", receipt.order_number),
        ),
    ];
    Ok((headers, receipt.pdf))
}
