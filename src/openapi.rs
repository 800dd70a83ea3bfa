//! OpenAPI documentation, served at `/swagger-ui`.

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::errors::ErrorResponse;
use crate::handlers::checkout::{
    AddressInfo, CheckoutItem, CheckoutRequest, CheckoutResponse, CustomerInfo, ShippingChoice,
    TotalsResponse,
};
use crate::handlers::orders::ProcessingResponse;
use crate::handlers::payment_webhooks::WebhookAck;
use crate::handlers::shipping::{RateRequest, RatesResponse};
use crate::services::orders::{OrderItemResponse, OrderResponse};
use crate::services::payments::PaymentIntent;
use crate::services::shipping::RateQuote;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::checkout::create_payment_intent,
        crate::handlers::payment_webhooks::handle_payment_webhook,
        crate::handlers::orders::get_order_by_reference,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_order_receipt,
        crate::handlers::shipping::quote_shipping_rates,
    ),
    components(schemas(
        CheckoutRequest,
        CheckoutItem,
        CustomerInfo,
        AddressInfo,
        ShippingChoice,
        CheckoutResponse,
        TotalsResponse,
        WebhookAck,
        OrderResponse,
        OrderItemResponse,
        ProcessingResponse,
        RateRequest,
        RatesResponse,
        RateQuote,
        PaymentIntent,
        ErrorResponse,
    )),
    tags(
        (name = "checkout", description = "Cart totals and payment-intent initiation"),
        (name = "payments", description = "Payment processor completion events"),
        (name = "orders", description = "Order lookup and receipts"),
        (name = "shipping", description = "Carrier rate quotes")
    ),
    info(
        title = "Storefront API",
        description = "Payment-to-order reconciliation pipeline for the storefront"
    )
)]
pub struct ApiDoc;

pub fn swagger_router() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
