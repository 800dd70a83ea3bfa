//! Checkout endpoint: totals computation and intent initiation.

mod common;

use axum::http::StatusCode;
use common::{expect_status, get, json_body, post_json, spawn_app};
use serde_json::json;

const CHECKOUT_URI: &str = "/api/v1/checkout/payment-intent";

fn sample_request() -> serde_json::Value {
    json!({
        "items": [
            { "name": "Widget", "unit_price": "19.99", "quantity": 2 }
        ],
        "customer": {
            "name": "Ada Lovelace",
            "email": "ada@example.com",
            "phone": "801-555-0100"
        },
        "address": {
            "line1": "1 Analytical Way",
            "city": "Magna",
            "state": "UT",
            "postal_code": "84044",
            "country": "US"
        },
        "shipping": {
            "carrier": "USPS",
            "service": "Priority",
            "rate": "7.50",
            "delivery_days": 3,
            "estimated_delivery": "2026-09-02"
        }
    })
}

#[tokio::test]
async fn checkout_computes_totals_and_creates_an_intent() {
    let app = spawn_app().await;

    let response = post_json(&app.router, CHECKOUT_URI, sample_request()).await;
    let body = expect_status(response, StatusCode::OK).await;

    assert_eq!(body["totals"]["subtotal"], "39.98");
    assert_eq!(body["totals"]["tax"], "2.90");
    assert_eq!(body["totals"]["shipping"], "7.50");
    assert_eq!(body["totals"]["total"], "50.38");
    assert_eq!(body["payment_reference"], "pi_mock_0");
    assert!(body["client_secret"].as_str().unwrap().contains("secret"));

    let intents = app.payments.intents.lock().unwrap();
    assert_eq!(intents.len(), 1);
    // The processor is charged in minor units and carries the frozen cart.
    assert_eq!(intents[0].amount, 5038);
    assert_eq!(intents[0].receipt_email, "ada@example.com");
    assert_eq!(intents[0].metadata.get("v").unwrap(), "1");
    assert_eq!(intents[0].metadata.get("total_amount").unwrap(), "50.38");
    assert!(intents[0].metadata.get("items").unwrap().contains("Widget"));
}

#[tokio::test]
async fn empty_carts_are_rejected() {
    let app = spawn_app().await;
    let mut request = sample_request();
    request["items"] = json!([]);

    let response = post_json(&app.router, CHECKOUT_URI, request).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(app.payments.intents.lock().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_prices_are_rejected() {
    let app = spawn_app().await;
    let mut request = sample_request();
    request["items"][0]["unit_price"] = json!("19.999");

    let response = post_json(&app.router, CHECKOUT_URI, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_email_is_rejected() {
    let app = spawn_app().await;
    let mut request = sample_request();
    request["customer"]["email"] = json!("not-an-email");

    let response = post_json(&app.router, CHECKOUT_URI, request).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn shipping_rates_come_from_the_carrier_lookup() {
    let app = spawn_app().await;
    let request = json!({
        "name": "Ada Lovelace",
        "phone": "801-555-0100",
        "address": {
            "line1": "1 Analytical Way",
            "city": "Magna",
            "state": "UT",
            "postal_code": "84044",
            "country": "US"
        }
    });

    let response = post_json(&app.router, "/api/v1/shipping/rates", request).await;
    let body = expect_status(response, StatusCode::OK).await;
    let rates = body["rates"].as_array().unwrap();
    assert_eq!(rates.len(), 2);
    assert_eq!(rates[0]["rate"], "7.50");
}

#[tokio::test]
async fn status_and_health_endpoints_respond() {
    let app = spawn_app().await;

    let response = get(&app.router, "/api/v1/status").await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(body["status"], "ok");

    let response = get(&app.router, "/health").await;
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
}
