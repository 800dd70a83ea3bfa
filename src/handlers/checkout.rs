//! Checkout: payment-intent initiation.
//!
//! The server recomputes all amounts from the submitted cart; client-supplied
//! totals are never trusted. The frozen cart travels to the processor as
//! intent metadata and comes back on the completion event, so no local state
//! is written here.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServiceError;
use crate::money::{self, Cents};
use crate::snapshot::{
    CartLine, CartSnapshot, Contact, Lines, ShippingAddress, ShippingSelection,
};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckoutItem {
    #[validate(length(min = 1))]
    pub name: String,
    /// Unit price as a decimal string, e.g. "19.99"
    pub unit_price: String,
    #[validate(range(min = 1))]
    pub quantity: u32,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CustomerInfo {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddressInfo {
    #[validate(length(min = 1))]
    pub line1: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ShippingChoice {
    #[validate(length(min = 1))]
    pub carrier: String,
    pub service: Option<String>,
    /// Quoted rate as a decimal string, e.g. "7.50"
    pub rate: String,
    pub delivery_days: Option<u32>,
    pub estimated_delivery: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, message = "cart must contain at least one item"))]
    pub items: Vec<CheckoutItem>,
    #[validate]
    pub customer: CustomerInfo,
    #[validate]
    pub address: AddressInfo,
    #[validate]
    pub shipping: ShippingChoice,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TotalsResponse {
    pub subtotal: String,
    pub tax: String,
    pub shipping: String,
    pub total: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    /// Secret the browser uses to complete payment authorization
    pub client_secret: String,
    /// Processor-issued reference to poll the order by once payment completes
    pub payment_reference: String,
    pub totals: TotalsResponse,
}

/// Creates a payment intent for the submitted cart.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/payment-intent",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Payment intent created", body = CheckoutResponse),
        (status = 422, description = "Invalid cart"),
        (status = 502, description = "Payment processor rejected the request")
    ),
    tag = "checkout"
)]
#[instrument(skip(state, payload), fields(items = payload.items.len()))]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let lines = parse_lines(&payload.items)?;
    let shipping_rate = money::parse_cents(&payload.shipping.rate)
        .map_err(|e| ServiceError::InvalidInput(format!("shipping rate: {e}")))?;

    let totals = money::compute_totals(&lines, state.config.tax_rate, shipping_rate)
        .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;

    let snapshot = CartSnapshot {
        lines: Lines::Itemized(lines),
        contact: Contact {
            name: payload.customer.name,
            email: payload.customer.email.clone(),
            phone: payload.customer.phone,
        },
        address: ShippingAddress {
            line1: payload.address.line1,
            city: payload.address.city,
            state: payload.address.state,
            postal_code: payload.address.postal_code,
            country: payload.address.country,
        },
        shipping: ShippingSelection {
            carrier: payload.shipping.carrier,
            service: payload.shipping.service,
            rate: shipping_rate,
            delivery_days: payload.shipping.delivery_days,
            estimated_delivery: payload.shipping.estimated_delivery,
        },
        tax_rate: state.config.tax_rate,
        totals,
    };

    let metadata = snapshot.encode()?;
    let intent = state
        .services
        .payments
        .create_intent(totals.total, &payload.customer.email, &metadata)
        .await?;

    Ok(Json(CheckoutResponse {
        client_secret: intent.client_secret,
        payment_reference: intent.payment_reference,
        totals: TotalsResponse {
            subtotal: money::format_cents(totals.subtotal),
            tax: money::format_cents(totals.tax),
            shipping: money::format_cents(totals.shipping),
            total: money::format_cents(totals.total),
        },
    }))
}

fn parse_lines(items: &[CheckoutItem]) -> Result<Vec<CartLine>, ServiceError> {
    items
        .iter()
        .map(|item| {
            let unit_price: Cents = money::parse_cents(&item.unit_price)
                .map_err(|e| ServiceError::InvalidInput(format!("item '{}': {e}", item.name)))?;
            Ok(CartLine {
                name: item.name.clone(),
                unit_price,
                quantity: item.quantity,
            })
        })
        .collect()
}
