pub mod email;
pub mod fulfillment;
pub mod orders;
pub mod payments;
pub mod receipts;
pub mod shipping;
