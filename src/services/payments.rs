//! Payment processor client: authorization-intent creation.
//!
//! The initiator writes nothing locally; until the completion event arrives
//! the processor's intent (and the snapshot riding in its metadata) is the
//! only record of the attempted purchase, so caller-side retries are safe.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::config::PaymentConfig;
use crate::errors::ServiceError;
use crate::money::Cents;

/// Client-side authorization handle returned to the storefront.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentIntent {
    /// Opaque processor-issued reference; the idempotency key for
    /// materialization.
    pub payment_reference: String,
    /// Secret the shopper's browser uses to complete authorization.
    pub client_secret: String,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Creates an authorization request for `amount` minor units, attaching
    /// the encoded cart snapshot as opaque metadata.
    async fn create_intent(
        &self,
        amount: Cents,
        receipt_email: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<PaymentIntent, ServiceError>;
}

#[derive(Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// HTTP gateway to the external processor (form-encoded API, basic auth with
/// the secret key, explicit request timeout).
pub struct HttpPaymentGateway {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
    currency: String,
}

impl HttpPaymentGateway {
    pub fn new(config: &PaymentConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            currency: config.currency.clone(),
        })
    }
}

#[async_trait]
impl PaymentProcessor for HttpPaymentGateway {
    #[instrument(skip(self, metadata), fields(amount = amount))]
    async fn create_intent(
        &self,
        amount: Cents,
        receipt_email: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<PaymentIntent, ServiceError> {
        let mut params: Vec<(String, String)> = vec![
            ("amount".to_string(), amount.to_string()),
            ("currency".to_string(), self.currency.clone()),
            ("receipt_email".to_string(), receipt_email.to_string()),
        ];
        for (key, value) in metadata {
            params.push((format!("metadata[{key}]"), value.clone()));
        }

        let response = self
            .http
            .post(format!("{}/payment_intents", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&params)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalService(format!("payment processor: {e}")))?;

        if !response.status().is_success() {
            // Surface the processor's own message to the caller unchanged.
            let status = response.status();
            let message = match response.json::<ApiErrorBody>().await {
                Ok(body) => body.error.message,
                Err(_) => format!("processor returned {status}"),
            };
            return Err(ServiceError::PaymentFailed(message));
        }

        let intent: IntentResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalService(format!("payment processor: {e}")))?;

        info!(payment_reference = %intent.id, "payment intent created");
        Ok(PaymentIntent {
            payment_reference: intent.id,
            client_secret: intent.client_secret,
        })
    }
}
