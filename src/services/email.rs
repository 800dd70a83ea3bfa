//! Receipt email delivery over SMTP.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment, MultiPart, SinglePart},
    transport::smtp::{authentication::Credentials, Error as SmtpError},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;
use tracing::info;

use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Invalid content type: {0}")]
    ContentType(String),
}

/// Outbound mail seam. The production implementation talks SMTP; tests plug
/// in a recording double.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_receipt(
        &self,
        to: &str,
        order_number: &str,
        pdf: Vec<u8>,
    ) -> Result<(), EmailError>;
}

/// SMTP mailer for transactional receipt mail.
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(config.username.clone(), config.password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_receipt(
        &self,
        to: &str,
        order_number: &str,
        pdf: Vec<u8>,
    ) -> Result<(), EmailError> {
        let pdf_type = ContentType::parse("application/pdf")
            .map_err(|e| EmailError::ContentType(e.to_string()))?;

        let message = Message::builder()
            .from(self
                .from_address
                .parse()
                .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?)
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(format!("Your Receipt for Order {order_number}"))
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(
                        "Attached is your receipt. Thank you for shopping with us!".to_string(),
                    ))
                    .singlepart(
                        Attachment::new(format!("receipt-{order_number}.pdf"))
                            .body(pdf, pdf_type),
                    ),
            )?;

        self.mailer.send(message).await?;
        info!(order_number, to, "receipt email sent");
        Ok(())
    }
}
