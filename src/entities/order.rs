use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Durable order record, materialized exactly once per payment reference.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human-readable order number, e.g. "ORD-1756368000000-X4J2"
    #[sea_orm(unique)]
    #[validate(length(min = 1, max = 50))]
    pub order_number: String,

    /// Identifier issued by the payment processor at intent-creation time.
    /// Sole join key between authorization and order; the unique constraint
    /// here is what makes materialization idempotent under races.
    #[sea_orm(unique)]
    pub payment_reference: String,

    pub customer_name: String,
    #[validate(email)]
    pub email: String,
    pub phone: Option<String>,

    pub address_line1: String,
    pub address_city: String,
    pub address_state: String,
    pub address_postal_code: String,
    pub address_country: String,

    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping_carrier: String,
    pub shipping_rate: Decimal,
    pub shipping_delivery_days: Option<i32>,
    pub shipping_estimated_delivery: Option<String>,
    pub total: Decimal,

    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Order lifecycle status. `Paid` is the terminal marker the materializer
/// sets; the remaining transitions belong to order management.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum OrderStatus {
    Pending,
    Accepted,
    #[strum(serialize = "In Progress")]
    InProgress,
    Completed,
    Paid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_round_trips_through_its_display_form() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Accepted,
            OrderStatus::InProgress,
            OrderStatus::Completed,
            OrderStatus::Paid,
        ] {
            let text = status.to_string();
            assert_eq!(OrderStatus::from_str(&text).unwrap(), status);
        }
        assert_eq!(OrderStatus::InProgress.to_string(), "In Progress");
    }
}
