//! Post-materialization fulfillment: receipt rendering and email dispatch.
//!
//! Runs on the event-processor task, after the order row is committed.
//! Receipt persistence is idempotent per payment reference; email failures
//! are retried within a budget and then logged, never propagated into the
//! materialization path.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    Set, SqlErr,
};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::entities::order::{self, Entity as OrderEntity};
use crate::entities::order_item::{self, Entity as OrderItemEntity};
use crate::entities::receipt::{self, Entity as ReceiptEntity};
use crate::errors::ServiceError;
use crate::retry::RetryPolicy;
use crate::services::email::Mailer;
use crate::services::receipts;

pub struct FulfillmentService {
    db: Arc<DatabaseConnection>,
    mailer: Option<Arc<dyn Mailer>>,
    email_retry: RetryPolicy,
}

impl FulfillmentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        mailer: Option<Arc<dyn Mailer>>,
        email_retry: RetryPolicy,
    ) -> Self {
        Self {
            db,
            mailer,
            email_retry,
        }
    }

    /// Renders and stores the receipt for a freshly materialized order, then
    /// emails it to the customer.
    #[instrument(skip(self))]
    pub async fn fulfill_order(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {order_id} not found for fulfillment"))
            })?;
        let items = order.find_related(OrderItemEntity).all(&*self.db).await?;

        let receipt = self.ensure_receipt(&order, &items).await?;
        self.dispatch_receipt_email(&order, receipt.pdf).await;
        Ok(())
    }

    /// Returns the stored receipt for the order, rendering and persisting it
    /// first if none exists yet. At most one receipt ever exists per payment
    /// reference.
    pub async fn ensure_receipt(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> Result<receipt::Model, ServiceError> {
        if let Some(existing) = self.find_receipt(&order.payment_reference).await? {
            debug!(
                order_number = %order.order_number,
                "receipt already stored, skipping render"
            );
            return Ok(existing);
        }

        let pdf = receipts::render_receipt_pdf(order, items)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;

        let model = receipt::ActiveModel {
            id: Set(Uuid::new_v4()),
            payment_reference: Set(order.payment_reference.clone()),
            order_number: Set(order.order_number.clone()),
            pdf: Set(pdf),
            created_at: Set(Utc::now()),
        };

        match model.insert(&*self.db).await {
            Ok(stored) => {
                info!(order_number = %order.order_number, "receipt rendered and stored");
                Ok(stored)
            }
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                // A concurrent fulfillment run stored it first; reuse that one.
                self.find_receipt(&order.payment_reference)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError(format!(
                            "receipt for {} missing after unique violation",
                            order.payment_reference
                        ))
                    })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_receipt(
        &self,
        payment_reference: &str,
    ) -> Result<Option<receipt::Model>, ServiceError> {
        Ok(ReceiptEntity::find()
            .filter(receipt::Column::PaymentReference.eq(payment_reference))
            .one(&*self.db)
            .await?)
    }

    async fn dispatch_receipt_email(&self, order: &order::Model, pdf: Vec<u8>) {
        let Some(mailer) = &self.mailer else {
            info!(
                order_number = %order.order_number,
                "email dispatch disabled, skipping receipt mail"
            );
            return;
        };

        let result = self
            .email_retry
            .run(|| {
                let pdf = pdf.clone();
                async move {
                    mailer
                        .send_receipt(&order.email, &order.order_number, pdf)
                        .await
                }
            })
            .await;

        if let Err(e) = result {
            // The receipt stays downloadable through the API either way.
            error!(
                order_number = %order.order_number,
                error = %e,
                "receipt email failed after retries"
            );
        }
    }
}
