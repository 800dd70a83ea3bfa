//! Payment completion webhook.
//!
//! The processor signs each event with a shared secret: the signature header
//! carries a unix timestamp and one or more HMAC-SHA256 digests computed over
//! `"{timestamp}.{raw_body}"`. Verification runs against the raw bytes before
//! any JSON parsing, and stale timestamps are rejected to bound replays.

use std::collections::BTreeMap;

use axum::{extract::State, http::HeaderMap, Json};
use bytes::Bytes;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
pub struct ProcessorEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: EventObject,
}

/// The payment intent embedded in a completion event. `metadata` is the cart
/// snapshot the checkout handler attached at intent-creation time.
#[derive(Debug, Deserialize)]
pub struct EventObject {
    pub id: String,
    #[serde(default)]
    pub amount_received: Option<i64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

/// Receives signed completion events from the payment processor.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Event accepted", body = WebhookAck),
        (status = 400, description = "Signature verification failed"),
        (status = 500, description = "Reconciliation anomaly; processor should redeliver")
    ),
    tag = "payments"
)]
#[instrument(skip(state, headers, body))]
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ServiceError::WebhookSignature("missing signature header".to_string())
        })?;

    verify_signature(
        &state.config.payment.webhook_secret,
        signature,
        &body,
        state.config.payment.webhook_tolerance_secs,
        Utc::now().timestamp(),
    )?;

    let event: ProcessorEvent = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::InvalidInput(format!("malformed event payload: {e}")))?;

    match event.event_type.as_str() {
        "payment_intent.succeeded" => {
            let object = event.data.object;
            state
                .services
                .orders
                .materialize_paid_order(&object.id, &object.metadata, object.amount_received)
                .await?;
        }
        other => {
            // Acknowledged so the processor stops redelivering it.
            info!(event_id = %event.id, event_type = other, "ignoring unhandled event type");
        }
    }

    Ok(Json(WebhookAck { received: true }))
}

/// Verifies the `t=...,v1=...` signature header against the raw payload.
///
/// Accepts when any `v1` digest matches; comparison is constant-time via the
/// MAC verifier. `now_unix` is a parameter so the tolerance window is
/// testable.
pub fn verify_signature(
    secret: &str,
    header: &str,
    payload: &[u8],
    tolerance_secs: u64,
    now_unix: i64,
) -> Result<(), ServiceError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in header.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(value)) => timestamp = value.parse().ok(),
            (Some("v1"), Some(value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        ServiceError::WebhookSignature("missing or malformed timestamp".to_string())
    })?;
    if candidates.is_empty() {
        return Err(ServiceError::WebhookSignature(
            "missing v1 signature".to_string(),
        ));
    }

    if now_unix.abs_diff(timestamp) > tolerance_secs {
        return Err(ServiceError::WebhookSignature(
            "timestamp outside tolerance".to_string(),
        ));
    }

    for candidate in candidates {
        let Ok(digest) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| {
            ServiceError::WebhookSignature("invalid webhook secret".to_string())
        })?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(&digest).is_ok() {
            return Ok(());
        }
    }

    Err(ServiceError::WebhookSignature(
        "no matching v1 signature".to_string(),
    ))
}
