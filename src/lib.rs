//! Storefront payment-to-order API.
//!
//! Checkout freezes the cart into a payment-intent snapshot, the processor's
//! completion webhook materializes the order exactly once, and fulfillment
//! (receipt rendering, email) runs decoupled behind an in-process event
//! channel.

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod money;
pub mod openapi;
pub mod retry;
pub mod services;
pub mod snapshot;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use sea_orm::DatabaseConnection;
use serde_json::json;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::services::fulfillment::FulfillmentService;
use crate::services::orders::OrderService;
use crate::services::payments::PaymentProcessor;
use crate::services::shipping::RateLookup;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The service graph handlers dispatch into. External collaborators sit
/// behind trait objects so tests can substitute doubles.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub fulfillment: Arc<FulfillmentService>,
    pub payments: Arc<dyn PaymentProcessor>,
    pub shipping: Arc<dyn RateLookup>,
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub services: AppServices,
}

/// Builds the versioned API router.
pub fn api_v1_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/checkout/payment-intent",
            post(handlers::checkout::create_payment_intent),
        )
        .route(
            "/api/v1/payments/webhook",
            post(handlers::payment_webhooks::handle_payment_webhook),
        )
        .route(
            "/api/v1/orders/by-reference/:payment_reference",
            get(handlers::orders::get_order_by_reference),
        )
        .route(
            "/api/v1/orders/:order_number",
            get(handlers::orders::get_order),
        )
        .route(
            "/api/v1/orders/:order_number/receipt",
            get(handlers::orders::get_order_receipt),
        )
        .route(
            "/api/v1/shipping/rates",
            post(handlers::shipping::quote_shipping_rates),
        )
        .route("/api/v1/status", get(api_status))
        .route("/api/v1/health", get(health_check))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Full application: API routes, API docs and the middleware stack.
pub fn app(state: AppState) -> Router {
    api_v1_routes(state)
        .merge(openapi::swagger_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
}

async fn api_status() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Liveness plus a database ping.
async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "healthy" }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unhealthy", "error": e.to_string() })),
        ),
    }
}
