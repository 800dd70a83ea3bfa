pub mod order;
pub mod order_item;
pub mod receipt;

pub use order::OrderStatus;
