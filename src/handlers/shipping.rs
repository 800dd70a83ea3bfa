//! Shipping rate quotes for the checkout page.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServiceError;
use crate::handlers::checkout::AddressInfo;
use crate::services::shipping::RateQuote;
use crate::snapshot::ShippingAddress;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct RateRequest {
    #[validate(length(min = 1))]
    pub name: String,
    pub phone: Option<String>,
    #[validate]
    pub address: AddressInfo,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RatesResponse {
    /// Available options, cheapest first
    pub rates: Vec<RateQuote>,
}

/// Quotes shipping options for a destination address.
#[utoipa::path(
    post,
    path = "/api/v1/shipping/rates",
    request_body = RateRequest,
    responses(
        (status = 200, description = "Available rates", body = RatesResponse),
        (status = 404, description = "No rates available for the destination"),
        (status = 502, description = "Carrier API failure")
    ),
    tag = "shipping"
)]
#[instrument(skip(state, payload), fields(city = %payload.address.city))]
pub async fn quote_shipping_rates(
    State(state): State<AppState>,
    Json(payload): Json<RateRequest>,
) -> Result<Json<RatesResponse>, ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let destination = ShippingAddress {
        line1: payload.address.line1,
        city: payload.address.city,
        state: payload.address.state,
        postal_code: payload.address.postal_code,
        country: payload.address.country,
    };

    let rates = state
        .services
        .shipping
        .quote_rates(&destination, &payload.name, payload.phone.as_deref())
        .await?;

    Ok(Json(RatesResponse { rates }))
}
