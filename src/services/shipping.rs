//! Carrier rate-quote collaborator.
//!
//! The storefront quotes from a fixed origin and parcel (configuration); the
//! shopper's chosen option travels into the cart snapshot and its rate is
//! carried unchanged onto the order.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;
use utoipa::ToSchema;

use crate::config::ShippingConfig;
use crate::errors::ServiceError;
use crate::money;
use crate::snapshot::ShippingAddress;

/// One quoted shipping option.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RateQuote {
    /// Carrier-side identifier for the quote
    pub id: String,
    pub carrier: String,
    pub service: String,
    /// Decimal string, e.g. "7.50"
    pub rate: String,
    pub delivery_days: Option<u32>,
    pub estimated_delivery: Option<String>,
}

#[async_trait]
pub trait RateLookup: Send + Sync {
    /// Returns available options for the destination, cheapest first.
    async fn quote_rates(
        &self,
        destination: &ShippingAddress,
        recipient_name: &str,
        recipient_phone: Option<&str>,
    ) -> Result<Vec<RateQuote>, ServiceError>;
}

#[derive(Deserialize)]
struct ShipmentResponse {
    #[serde(default)]
    rates: Vec<ApiRate>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiRate {
    id: String,
    carrier: String,
    service: String,
    rate: String,
    delivery_days: Option<u32>,
    est_delivery_date: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// HTTP client for the carrier rate API.
pub struct CarrierRateClient {
    http: reqwest::Client,
    config: ShippingConfig,
}

impl CarrierRateClient {
    pub fn new(config: ShippingConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl RateLookup for CarrierRateClient {
    #[instrument(skip(self, destination, recipient_phone), fields(city = %destination.city))]
    async fn quote_rates(
        &self,
        destination: &ShippingAddress,
        recipient_name: &str,
        recipient_phone: Option<&str>,
    ) -> Result<Vec<RateQuote>, ServiceError> {
        let body = json!({
            "shipment": {
                "to_address": {
                    "name": recipient_name,
                    "phone": recipient_phone.unwrap_or(""),
                    "street1": destination.line1,
                    "city": destination.city,
                    "state": destination.state,
                    "zip": destination.postal_code,
                    "country": destination.country,
                },
                "from_address": {
                    "name": self.config.origin_name,
                    "street1": self.config.origin_line1,
                    "city": self.config.origin_city,
                    "state": self.config.origin_state,
                    "zip": self.config.origin_postal_code,
                    "country": self.config.origin_country,
                    "phone": self.config.origin_phone,
                },
                "parcel": {
                    "length": self.config.parcel_length,
                    "width": self.config.parcel_width,
                    "height": self.config.parcel_height,
                    "weight": self.config.parcel_weight_oz,
                },
                "options": { "currency": "USD" },
            }
        });

        let response = self
            .http
            .post(format!(
                "{}/shipments",
                self.config.api_base.trim_end_matches('/')
            ))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalService(format!("carrier rate api: {e}")))?;

        let shipment: ShipmentResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalService(format!("carrier rate api: {e}")))?;

        if let Some(err) = shipment.error {
            return Err(ServiceError::ExternalService(err.message));
        }
        if shipment.rates.is_empty() {
            return Err(ServiceError::NotFound("No shipping rates found".to_string()));
        }

        let mut quotes: Vec<RateQuote> = shipment
            .rates
            .into_iter()
            .map(|r| RateQuote {
                id: r.id,
                carrier: r.carrier,
                service: r.service,
                rate: r.rate,
                delivery_days: r.delivery_days,
                estimated_delivery: r.est_delivery_date,
            })
            .collect();

        // Cheapest first; unparseable rates sort last rather than vanish.
        quotes.sort_by_key(|q| money::parse_cents(&q.rate).unwrap_or(i64::MAX));
        Ok(quotes)
    }
}
