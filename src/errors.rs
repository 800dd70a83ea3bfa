use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::snapshot::SnapshotError;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Webhook signature verification failed: {0}")]
    WebhookSignature(String),

    #[error("Payment processor error: {0}")]
    PaymentFailed(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Reconciliation anomaly for {payment_reference}: carried {carried}, recomputed {recomputed}")]
    ReconciliationAnomaly {
        payment_reference: String,
        carried: String,
        recomputed: String,
    },

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<SnapshotError> for ServiceError {
    fn from(err: SnapshotError) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::InvalidInput(_) | ServiceError::WebhookSignature(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::PaymentFailed(_) | ServiceError::ExternalService(_) => {
                StatusCode::BAD_GATEWAY
            }
            ServiceError::DatabaseError(_)
            | ServiceError::ReconciliationAnomaly { .. }
            | ServiceError::EventError(_)
            | ServiceError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_label(status: StatusCode) -> String {
        status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string()
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            ServiceError::ReconciliationAnomaly { .. } | ServiceError::DatabaseError(_) => {
                tracing::error!(error = %self, "request failed");
            }
            ServiceError::InternalError(_) | ServiceError::EventError(_) => {
                tracing::error!(error = %self, "request failed");
            }
            _ => {
                tracing::warn!(error = %self, "request rejected");
            }
        }

        let body = ErrorResponse {
            error: Self::error_label(status),
            message: self.to_string(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}
