//! Receipt PDF rendering.
//!
//! One deterministic layout shared by the fulfillment path and the on-demand
//! download endpoint: the same order fields always produce the same document.

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use thiserror::Error;

use crate::entities::{order, order_item};

const PAGE_WIDTH_MM: f32 = 215.9;
const PAGE_HEIGHT_MM: f32 = 279.4;
const LEFT_MARGIN_MM: f32 = 20.0;
const LINE_HEIGHT_MM: f32 = 7.0;

#[derive(Debug, Error)]
pub enum ReceiptError {
    #[error("Failed to render receipt: {0}")]
    Render(String),
}

struct Cursor {
    layer: PdfLayerReference,
    y: f32,
}

impl Cursor {
    fn text(&mut self, text: impl Into<String>, size: f32, font: &IndirectFontRef) {
        self.layer
            .use_text(text, size, Mm(LEFT_MARGIN_MM), Mm(self.y), font);
        self.y -= LINE_HEIGHT_MM;
    }

    fn blank(&mut self) {
        self.y -= LINE_HEIGHT_MM / 2.0;
    }
}

/// Renders the receipt for a materialized order.
pub fn render_receipt_pdf(
    order: &order::Model,
    items: &[order_item::Model],
) -> Result<Vec<u8>, ReceiptError> {
    let (doc, page, layer) = PdfDocument::new(
        format!("Receipt {}", order.order_number),
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        "receipt",
    );

    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ReceiptError::Render(e.to_string()))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ReceiptError::Render(e.to_string()))?;

    let mut cursor = Cursor {
        layer: doc.get_page(page).get_layer(layer),
        y: 260.0,
    };

    cursor.text(format!("Order #: {}", order.order_number), 12.0, &bold);
    cursor.text(
        format!("Date: {}", order.created_at.format("%Y-%m-%d %H:%M UTC")),
        12.0,
        &font,
    );
    cursor.blank();

    cursor.text("Customer Information", 14.0, &bold);
    cursor.text(format!("Name: {}", order.customer_name), 12.0, &font);
    cursor.text(format!("Email: {}", order.email), 12.0, &font);
    cursor.text(
        format!("Phone: {}", order.phone.as_deref().unwrap_or("N/A")),
        12.0,
        &font,
    );
    cursor.text(
        format!(
            "Address: {}, {}, {} {}, {}",
            order.address_line1,
            order.address_city,
            order.address_state,
            order.address_postal_code,
            order.address_country
        ),
        12.0,
        &font,
    );
    cursor.blank();

    cursor.text("Items", 14.0, &bold);
    for item in items {
        cursor.text(
            format!("{} (x{}) - {} each", item.name, item.quantity, item.unit_price),
            12.0,
            &font,
        );
    }
    cursor.blank();

    cursor.text("Summary", 14.0, &bold);
    cursor.text(format!("Subtotal: ${}", order.subtotal), 12.0, &font);
    cursor.text(format!("Tax: ${}", order.tax), 12.0, &font);
    cursor.text(
        format!("Shipping ({}): ${}", order.shipping_carrier, order.shipping_rate),
        12.0,
        &font,
    );
    cursor.text(format!("Total: ${}", order.total), 13.0, &bold);
    cursor.blank();

    cursor.text("Thank you for your order!", 10.0, &font);

    doc.save_to_bytes()
        .map_err(|e| ReceiptError::Render(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn sample_order() -> (order::Model, Vec<order_item::Model>) {
        let order_id = Uuid::new_v4();
        let order = order::Model {
            id: order_id,
            order_number: "ORD-1756368000000-TEST".to_string(),
            payment_reference: "pi_receipt_test".to_string(),
            customer_name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
            address_line1: "1 Analytical Way".to_string(),
            address_city: "Magna".to_string(),
            address_state: "UT".to_string(),
            address_postal_code: "84044".to_string(),
            address_country: "US".to_string(),
            subtotal: dec!(39.98),
            tax: dec!(2.90),
            shipping_carrier: "USPS".to_string(),
            shipping_rate: dec!(7.50),
            shipping_delivery_days: Some(3),
            shipping_estimated_delivery: None,
            total: dec!(50.38),
            status: "Paid".to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 8, 28, 12, 0, 0).unwrap(),
            updated_at: None,
        };
        let items = vec![order_item::Model {
            id: Uuid::new_v4(),
            order_id,
            name: "Widget".to_string(),
            quantity: 2,
            unit_price: "$19.99".to_string(),
        }];
        (order, items)
    }

    #[test]
    fn renders_a_nonempty_pdf() {
        let (order, items) = sample_order();
        let pdf = render_receipt_pdf(&order, &items).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
        assert!(pdf.len() > 500);
    }

    #[test]
    fn same_order_renders_the_same_layout() {
        let (order, items) = sample_order();
        let a = render_receipt_pdf(&order, &items).unwrap();
        let b = render_receipt_pdf(&order, &items).unwrap();
        assert_eq!(a.len(), b.len());
    }
}
