pub mod checkout;
pub mod orders;
pub mod payment_webhooks;
pub mod shipping;
