#![allow(dead_code)]

//! Shared test fixture: in-memory database, mocked external collaborators
//! and a fully wired router.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use chrono::Utc;
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use sha2::Sha256;
use tokio::sync::mpsc;
use tower::ServiceExt;

use storefront_api::config::{
    AppConfig, PaymentConfig, RetryConfig, ShippingConfig, SmtpConfig,
};
use storefront_api::db::{self, DbConfig};
use storefront_api::errors::ServiceError;
use storefront_api::events::{Event, EventSender};
use storefront_api::money::{compute_totals, Cents};
use storefront_api::services::email::{EmailError, Mailer};
use storefront_api::services::fulfillment::FulfillmentService;
use storefront_api::services::orders::OrderService;
use storefront_api::services::payments::{PaymentIntent, PaymentProcessor};
use storefront_api::services::shipping::{RateLookup, RateQuote};
use storefront_api::snapshot::{
    CartLine, CartSnapshot, Contact, Lines, ShippingAddress, ShippingSelection,
};
use storefront_api::{AppServices, AppState};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

pub struct RecordedIntent {
    pub amount: Cents,
    pub receipt_email: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Default)]
pub struct MockPaymentProcessor {
    pub intents: Mutex<Vec<RecordedIntent>>,
    counter: AtomicU32,
}

#[async_trait]
impl PaymentProcessor for MockPaymentProcessor {
    async fn create_intent(
        &self,
        amount: Cents,
        receipt_email: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<PaymentIntent, ServiceError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.intents.lock().unwrap().push(RecordedIntent {
            amount,
            receipt_email: receipt_email.to_string(),
            metadata: metadata.clone(),
        });
        Ok(PaymentIntent {
            payment_reference: format!("pi_mock_{n}"),
            client_secret: format!("pi_mock_{n}_secret"),
        })
    }
}

pub struct SentMail {
    pub to: String,
    pub order_number: String,
    pub pdf_len: usize,
}

#[derive(Default)]
pub struct MockMailer {
    /// Number of sends to fail before succeeding.
    pub fail_first: AtomicU32,
    pub sent: Mutex<Vec<SentMail>>,
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_receipt(
        &self,
        to: &str,
        order_number: &str,
        pdf: Vec<u8>,
    ) -> Result<(), EmailError> {
        if self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(EmailError::InvalidAddress("injected failure".to_string()));
        }
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            order_number: order_number.to_string(),
            pdf_len: pdf.len(),
        });
        Ok(())
    }
}

pub struct MockRateLookup {
    pub quotes: Vec<RateQuote>,
}

#[async_trait]
impl RateLookup for MockRateLookup {
    async fn quote_rates(
        &self,
        _destination: &ShippingAddress,
        _recipient_name: &str,
        _recipient_phone: Option<&str>,
    ) -> Result<Vec<RateQuote>, ServiceError> {
        Ok(self.quotes.clone())
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        environment: "test".to_string(),
        log_level: "debug".to_string(),
        log_json: false,
        auto_migrate: true,
        db_max_connections: 1,
        db_min_connections: 1,
        db_connect_timeout_secs: 5,
        db_acquire_timeout_secs: 5,
        db_idle_timeout_secs: 60,
        tax_rate: dec!(0.0725),
        payment: PaymentConfig {
            secret_key: "sk_test".to_string(),
            api_base: "http://localhost:9".to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            webhook_tolerance_secs: 300,
            request_timeout_secs: 2,
            currency: "usd".to_string(),
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            username: String::new(),
            password: String::new(),
            from_address: "orders@example.com".to_string(),
            enabled: false,
        },
        shipping: ShippingConfig {
            api_key: "ep_test".to_string(),
            api_base: "http://localhost:9".to_string(),
            request_timeout_secs: 2,
            origin_name: "Storefront Warehouse".to_string(),
            origin_line1: "1 Warehouse Road".to_string(),
            origin_city: "Magna".to_string(),
            origin_state: "UT".to_string(),
            origin_postal_code: "84044".to_string(),
            origin_country: "US".to_string(),
            origin_phone: String::new(),
            parcel_length: 10.0,
            parcel_width: 8.0,
            parcel_height: 4.0,
            parcel_weight_oz: 16.0,
        },
        poller_retry: RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 20,
            max_delay_ms: 20,
            multiplier: 1,
        },
        store_retry: RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 4,
            multiplier: 2,
        },
        email_retry: RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 4,
            multiplier: 2,
        },
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub payments: Arc<MockPaymentProcessor>,
    pub mailer: Arc<MockMailer>,
    /// Fulfillment events emitted by the materializer; pass to
    /// `events::process_events` in tests that exercise fulfillment.
    pub receiver: mpsc::Receiver<Event>,
}

pub async fn spawn_app() -> TestApp {
    // A single connection keeps every query on the same in-memory database.
    let db = Arc::new(
        db::establish_connection_with_config(&DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            acquire_timeout: Duration::from_secs(5),
        })
        .await
        .expect("sqlite connection"),
    );
    db::run_migrations(&db).await.expect("schema creation");

    let config = Arc::new(test_config());
    let (sender, receiver) = mpsc::channel(64);

    let payments = Arc::new(MockPaymentProcessor::default());
    let mailer = Arc::new(MockMailer::default());

    let fulfillment = Arc::new(FulfillmentService::new(
        db.clone(),
        Some(mailer.clone() as Arc<dyn Mailer>),
        config.email_retry.policy(),
    ));
    let orders = Arc::new(OrderService::new(
        db.clone(),
        EventSender::new(sender),
        config.store_retry.policy(),
    ));
    let shipping: Arc<dyn RateLookup> = Arc::new(MockRateLookup {
        quotes: vec![
            RateQuote {
                id: "rate_priority".to_string(),
                carrier: "USPS".to_string(),
                service: "Priority".to_string(),
                rate: "7.50".to_string(),
                delivery_days: Some(3),
                estimated_delivery: Some("2026-09-02".to_string()),
            },
            RateQuote {
                id: "rate_express".to_string(),
                carrier: "USPS".to_string(),
                service: "Express".to_string(),
                rate: "24.10".to_string(),
                delivery_days: Some(1),
                estimated_delivery: Some("2026-08-31".to_string()),
            },
        ],
    });

    let state = AppState {
        db,
        config,
        services: AppServices {
            orders,
            fulfillment,
            payments: payments.clone(),
            shipping,
        },
    };
    let router = storefront_api::app(state.clone());

    TestApp {
        state,
        router,
        payments,
        mailer,
        receiver,
    }
}

/// Reference snapshot: Widget $19.99 x2, 7.25% tax, $7.50 shipping.
pub fn sample_snapshot() -> CartSnapshot {
    let lines = vec![CartLine {
        name: "Widget".to_string(),
        unit_price: 1999,
        quantity: 2,
    }];
    let totals = compute_totals(&lines, dec!(0.0725), 750).unwrap();
    CartSnapshot {
        lines: Lines::Itemized(lines),
        contact: Contact {
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: Some("801-555-0100".to_string()),
        },
        address: ShippingAddress {
            line1: "1 Analytical Way".to_string(),
            city: "Magna".to_string(),
            state: "UT".to_string(),
            postal_code: "84044".to_string(),
            country: "US".to_string(),
        },
        shipping: ShippingSelection {
            carrier: "USPS".to_string(),
            service: Some("Priority".to_string()),
            rate: 750,
            delivery_days: Some(3),
            estimated_delivery: Some("2026-09-02".to_string()),
        },
        tax_rate: dec!(0.0725),
        totals,
    }
}

pub fn webhook_body(
    payment_reference: &str,
    metadata: &BTreeMap<String, String>,
    amount_received: Cents,
) -> String {
    serde_json::json!({
        "id": "evt_test_1",
        "type": "payment_intent.succeeded",
        "data": {
            "object": {
                "id": payment_reference,
                "amount_received": amount_received,
                "receipt_email": "ada@example.com",
                "metadata": metadata,
            }
        }
    })
    .to_string()
}

pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

pub fn signature_header(payload: &str) -> String {
    let timestamp = Utc::now().timestamp();
    format!(
        "t={timestamp},v1={}",
        sign_payload(WEBHOOK_SECRET, timestamp, payload.as_bytes())
    )
}

pub async fn post_json(router: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn get(router: &Router, uri: &str) -> Response<Body> {
    router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn expect_status(response: Response<Body>, status: StatusCode) -> serde_json::Value {
    assert_eq!(response.status(), status);
    json_body(response).await
}
