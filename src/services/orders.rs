//! Order materialization and lookup.
//!
//! Materialization turns a completed payment into a durable order exactly
//! once. The unique constraint on `payment_reference` is the idempotency
//! mechanism: duplicate completion events and concurrent deliveries both
//! collapse onto the single row the first writer created.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::order::{self, Entity as OrderEntity, OrderStatus};
use crate::entities::order_item::{self, Entity as OrderItemEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::money::{self, Cents, Totals};
use crate::retry::RetryPolicy;
use crate::snapshot::{CartSnapshot, Lines};

/// Result of one materialization attempt.
#[derive(Debug, Clone)]
pub enum MaterializationOutcome {
    /// This call created the order.
    Created(order::Model),
    /// An order for the payment reference already existed; nothing written.
    AlreadyExists(order::Model),
}

impl MaterializationOutcome {
    pub fn order(&self) -> &order::Model {
        match self {
            MaterializationOutcome::Created(order)
            | MaterializationOutcome::AlreadyExists(order) => order,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, MaterializationOutcome::Created(_))
    }
}

/// Order line as returned to API clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub name: String,
    pub quantity: i32,
    /// Formatted unit price as it was frozen in the cart, e.g. "$19.99"
    pub unit_price: String,
}

/// Order as returned to API clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub order_number: String,
    pub payment_reference: String,
    pub customer_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address_line1: String,
    pub address_city: String,
    pub address_state: String,
    pub address_postal_code: String,
    pub address_country: String,
    pub items: Vec<OrderItemResponse>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping_carrier: String,
    pub shipping_rate: Decimal,
    pub shipping_delivery_days: Option<i32>,
    pub shipping_estimated_delivery: Option<String>,
    pub total: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl OrderResponse {
    pub fn from_parts(order: order::Model, items: Vec<order_item::Model>) -> Self {
        Self {
            order_number: order.order_number,
            payment_reference: order.payment_reference,
            customer_name: order.customer_name,
            email: order.email,
            phone: order.phone,
            address_line1: order.address_line1,
            address_city: order.address_city,
            address_state: order.address_state,
            address_postal_code: order.address_postal_code,
            address_country: order.address_country,
            items: items
                .into_iter()
                .map(|item| OrderItemResponse {
                    name: item.name,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
            subtotal: order.subtotal,
            tax: order.tax,
            shipping_carrier: order.shipping_carrier,
            shipping_rate: order.shipping_rate,
            shipping_delivery_days: order.shipping_delivery_days,
            shipping_estimated_delivery: order.shipping_estimated_delivery,
            total: order.total,
            status: order.status,
            created_at: order.created_at,
        }
    }
}

pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    store_retry: RetryPolicy,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        store_retry: RetryPolicy,
    ) -> Self {
        Self {
            db,
            event_sender,
            store_retry,
        }
    }

    /// Materializes the order for a completed payment.
    ///
    /// Decodes the cart snapshot out of the event metadata, verifies the
    /// carried totals against a fresh computation (and against the charged
    /// amount when the event reports one), then inserts the order behind the
    /// unique payment-reference constraint. Transient store failures are
    /// retried within the configured budget; every path through here is safe
    /// to call again with the same payment reference.
    #[instrument(skip(self, metadata), fields(payment_reference = %payment_reference))]
    pub async fn materialize_paid_order(
        &self,
        payment_reference: &str,
        metadata: &BTreeMap<String, String>,
        charged_amount: Option<Cents>,
    ) -> Result<MaterializationOutcome, ServiceError> {
        let snapshot = CartSnapshot::decode(metadata)?;
        verify_carried_totals(payment_reference, &snapshot)?;

        if let Some(charged) = charged_amount {
            if charged != snapshot.totals.total {
                return Err(ServiceError::ReconciliationAnomaly {
                    payment_reference: payment_reference.to_string(),
                    carried: format!("total={}", money::format_cents(snapshot.totals.total)),
                    recomputed: format!("charged={}", money::format_cents(charged)),
                });
            }
        }

        let outcome = self
            .store_retry
            .run(|| self.insert_or_fetch(payment_reference, &snapshot))
            .await?;

        match &outcome {
            MaterializationOutcome::Created(order) => {
                info!(
                    order_number = %order.order_number,
                    total = %order.total,
                    "order materialized"
                );
                if let Err(e) = self
                    .event_sender
                    .send(Event::OrderMaterialized {
                        order_id: order.id,
                        payment_reference: order.payment_reference.clone(),
                    })
                    .await
                {
                    // The order itself is durable; the on-demand receipt
                    // endpoint covers any fulfillment gap.
                    warn!(error = %e, "failed to queue fulfillment event");
                }
            }
            MaterializationOutcome::AlreadyExists(order) => {
                info!(
                    order_number = %order.order_number,
                    "order already materialized, skipping"
                );
            }
        }

        Ok(outcome)
    }

    async fn insert_or_fetch(
        &self,
        payment_reference: &str,
        snapshot: &CartSnapshot,
    ) -> Result<MaterializationOutcome, ServiceError> {
        if let Some(existing) = self.find_by_reference(payment_reference).await? {
            return Ok(MaterializationOutcome::AlreadyExists(existing));
        }

        let order_id = Uuid::new_v4();
        let model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(generate_order_number()),
            payment_reference: Set(payment_reference.to_string()),
            customer_name: Set(snapshot.contact.name.clone()),
            email: Set(snapshot.contact.email.clone()),
            phone: Set(snapshot.contact.phone.clone()),
            address_line1: Set(snapshot.address.line1.clone()),
            address_city: Set(snapshot.address.city.clone()),
            address_state: Set(snapshot.address.state.clone()),
            address_postal_code: Set(snapshot.address.postal_code.clone()),
            address_country: Set(snapshot.address.country.clone()),
            subtotal: Set(money::cents_to_decimal(snapshot.totals.subtotal)),
            tax: Set(money::cents_to_decimal(snapshot.totals.tax)),
            shipping_carrier: Set(snapshot.shipping.carrier.clone()),
            shipping_rate: Set(money::cents_to_decimal(snapshot.totals.shipping)),
            shipping_delivery_days: Set(snapshot.shipping.delivery_days.map(|d| d as i32)),
            shipping_estimated_delivery: Set(snapshot.shipping.estimated_delivery.clone()),
            total: Set(money::cents_to_decimal(snapshot.totals.total)),
            status: Set(OrderStatus::Paid.to_string()),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };

        let txn = self.db.begin().await?;

        let inserted = match model.insert(&txn).await {
            Ok(order) => order,
            Err(err) => {
                if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                    // Lost the race to a concurrent delivery; the winner's
                    // row is the order.
                    let existing =
                        self.find_by_reference(payment_reference)
                            .await?
                            .ok_or_else(|| {
                                ServiceError::InternalError(format!(
                                    "order for {payment_reference} missing after unique violation"
                                ))
                            })?;
                    return Ok(MaterializationOutcome::AlreadyExists(existing));
                }
                return Err(err.into());
            }
        };

        if let Lines::Itemized(lines) = &snapshot.lines {
            for line in lines {
                let quantity = i32::try_from(line.quantity).map_err(|_| {
                    ServiceError::ValidationError(format!(
                        "line '{}' quantity {} is out of range",
                        line.name, line.quantity
                    ))
                })?;
                order_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order_id),
                    name: Set(line.name.clone()),
                    quantity: Set(quantity),
                    unit_price: Set(money::format_dollars(line.unit_price)),
                }
                .insert(&txn)
                .await?;
            }
        }

        txn.commit().await?;
        Ok(MaterializationOutcome::Created(inserted))
    }

    pub async fn find_by_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        Ok(OrderEntity::find()
            .filter(order::Column::PaymentReference.eq(payment_reference))
            .one(&*self.db)
            .await?)
    }

    pub async fn get_by_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Option<OrderResponse>, ServiceError> {
        match self.find_by_reference(payment_reference).await? {
            Some(order) => Ok(Some(self.with_items(order).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<OrderResponse>, ServiceError> {
        let order = OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?;
        match order {
            Some(order) => Ok(Some(self.with_items(order).await?)),
            None => Ok(None),
        }
    }

    pub async fn find_model_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<(order::Model, Vec<order_item::Model>)>, ServiceError> {
        let order = OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?;
        match order {
            Some(order) => {
                let items = order.find_related(OrderItemEntity).all(&*self.db).await?;
                Ok(Some((order, items)))
            }
            None => Ok(None),
        }
    }

    /// Polls for the order a completion event should have materialized.
    ///
    /// `Ok(None)` means "not yet available within the budget", not "does not
    /// exist": the event may simply not have been delivered yet.
    #[instrument(skip(self, policy), fields(payment_reference = %payment_reference))]
    pub async fn await_by_reference(
        &self,
        payment_reference: &str,
        policy: RetryPolicy,
    ) -> Result<Option<OrderResponse>, ServiceError> {
        policy
            .poll(|| self.get_by_reference(payment_reference))
            .await
    }

    async fn with_items(&self, order: order::Model) -> Result<OrderResponse, ServiceError> {
        let items = order.find_related(OrderItemEntity).all(&*self.db).await?;
        Ok(OrderResponse::from_parts(order, items))
    }
}

/// Verifies that the totals carried in the snapshot match a fresh computation
/// from its own line items.
///
/// When per-line detail was lost to summary degradation only the additive
/// invariant can be checked; that weaker check is logged.
fn verify_carried_totals(
    payment_reference: &str,
    snapshot: &CartSnapshot,
) -> Result<(), ServiceError> {
    match &snapshot.lines {
        Lines::Itemized(lines) => {
            let recomputed =
                money::compute_totals(lines, snapshot.tax_rate, snapshot.totals.shipping)
                    .map_err(|e| {
                        ServiceError::ValidationError(format!(
                            "carried cart cannot be recomputed: {e}"
                        ))
                    })?;
            if recomputed != snapshot.totals {
                return Err(ServiceError::ReconciliationAnomaly {
                    payment_reference: payment_reference.to_string(),
                    carried: describe_totals(&snapshot.totals),
                    recomputed: describe_totals(&recomputed),
                });
            }
        }
        Lines::Summarized(_) => {
            warn!(
                payment_reference,
                "snapshot items were summarized; verifying additive invariant only"
            );
            let t = &snapshot.totals;
            if t.total != t.subtotal + t.tax + t.shipping {
                return Err(ServiceError::ReconciliationAnomaly {
                    payment_reference: payment_reference.to_string(),
                    carried: describe_totals(t),
                    recomputed: format!(
                        "total={}",
                        money::format_cents(t.subtotal + t.tax + t.shipping)
                    ),
                });
            }
        }
    }
    Ok(())
}

fn describe_totals(t: &Totals) -> String {
    format!(
        "subtotal={} tax={} shipping={} total={}",
        money::format_cents(t.subtotal),
        money::format_cents(t.tax),
        money::format_cents(t.shipping),
        money::format_cents(t.total)
    )
}

fn generate_order_number() -> String {
    // Alphabet skips easily confused characters (0/O, 1/I/L).
    const ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..4)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("ORD-{}-{}", Utc::now().timestamp_millis(), suffix)
}
