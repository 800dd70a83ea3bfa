use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;

use storefront_api::config;
use storefront_api::db;
use storefront_api::events::{self, EventSender};
use storefront_api::services::email::{Mailer, SmtpMailer};
use storefront_api::services::fulfillment::FulfillmentService;
use storefront_api::services::orders::OrderService;
use storefront_api::services::payments::{HttpPaymentGateway, PaymentProcessor};
use storefront_api::services::shipping::{CarrierRateClient, RateLookup};
use storefront_api::{AppServices, AppState};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load_config().context("failed to load configuration")?;
    config::init_tracing(config.log_level(), config.log_json);
    info!(
        environment = %config.environment,
        "starting storefront api"
    );

    let db = Arc::new(
        db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to the database")?,
    );
    if config.auto_migrate {
        db::run_migrations(&db)
            .await
            .context("failed to run database migrations")?;
    }

    let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let event_sender = EventSender::new(sender);

    let mailer: Option<Arc<dyn Mailer>> = if config.smtp.enabled {
        Some(Arc::new(
            SmtpMailer::new(&config.smtp).context("failed to build SMTP transport")?,
        ))
    } else {
        info!("email dispatch disabled by configuration");
        None
    };

    let fulfillment = Arc::new(FulfillmentService::new(
        db.clone(),
        mailer,
        config.email_retry.policy(),
    ));
    let orders = Arc::new(OrderService::new(
        db.clone(),
        event_sender,
        config.store_retry.policy(),
    ));
    let payments: Arc<dyn PaymentProcessor> = Arc::new(
        HttpPaymentGateway::new(&config.payment).context("failed to build payment client")?,
    );
    let shipping: Arc<dyn RateLookup> = Arc::new(
        CarrierRateClient::new(config.shipping.clone())
            .context("failed to build shipping client")?,
    );

    tokio::spawn(events::process_events(receiver, fulfillment.clone()));

    let config = Arc::new(config);
    let state = AppState {
        db,
        config: config.clone(),
        services: AppServices {
            orders,
            fulfillment,
            payments,
            shipping,
        },
    };

    let app = storefront_api::app(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
