//! Deterministic monetary arithmetic for the checkout pipeline.
//!
//! Every amount is an integer count of minor currency units (cents). Tax is
//! rounded half-up per line and then summed, so the same cart snapshot always
//! produces the same totals no matter where the computation runs.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snapshot::CartLine;

/// Amount in minor currency units.
pub type Cents = i64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Malformed amount '{0}'")]
    Malformed(String),

    #[error("Amount '{0}' has more than two decimal places")]
    TooPrecise(String),

    #[error("Amount '{0}' is negative")]
    Negative(String),

    #[error("Monetary amount overflows the cents representation")]
    Overflow,
}

/// Computed cart totals, in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Cents,
    pub tax: Cents,
    pub shipping: Cents,
    pub total: Cents,
}

/// Computes subtotal, tax, shipping and total for a set of cart lines.
///
/// Pure function: no I/O, no clock, no configuration lookup. The caller
/// supplies the tax rate and the chosen shipping rate so that the intent
/// initiator and the order materializer run the exact same arithmetic.
/// Amounts that overflow the cents representation are an error, never a
/// wrapped or truncated charge.
pub fn compute_totals(
    lines: &[CartLine],
    tax_rate: Decimal,
    shipping: Cents,
) -> Result<Totals, MoneyError> {
    let mut subtotal: Cents = 0;
    let mut tax: Cents = 0;

    for line in lines {
        let line_total = line
            .unit_price
            .checked_mul(Cents::from(line.quantity))
            .ok_or(MoneyError::Overflow)?;
        subtotal = subtotal.checked_add(line_total).ok_or(MoneyError::Overflow)?;

        let line_tax = Decimal::from(line_total)
            .checked_mul(tax_rate)
            .ok_or(MoneyError::Overflow)
            .and_then(round_half_up)?;
        tax = tax.checked_add(line_tax).ok_or(MoneyError::Overflow)?;
    }

    let total = subtotal
        .checked_add(tax)
        .and_then(|t| t.checked_add(shipping))
        .ok_or(MoneyError::Overflow)?;

    Ok(Totals {
        subtotal,
        tax,
        shipping,
        total,
    })
}

fn round_half_up(amount: Decimal) -> Result<Cents, MoneyError> {
    amount
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(MoneyError::Overflow)
}

/// Parses a fixed-precision decimal string ("19.99", optionally "$19.99")
/// into cents. Malformed input is an error, never coerced to zero.
pub fn parse_cents(raw: &str) -> Result<Cents, MoneyError> {
    let trimmed = raw.trim().trim_start_matches('$');
    let amount =
        Decimal::from_str(trimmed).map_err(|_| MoneyError::Malformed(raw.to_string()))?;

    if amount.scale() > 2 {
        return Err(MoneyError::TooPrecise(raw.to_string()));
    }
    if amount.is_sign_negative() {
        return Err(MoneyError::Negative(raw.to_string()));
    }

    (amount * Decimal::new(100, 0))
        .to_i64()
        .ok_or_else(|| MoneyError::Malformed(raw.to_string()))
}

/// Parses a tax rate such as "0.0725". Rates carry four decimal places.
pub fn parse_rate(raw: &str) -> Result<Decimal, MoneyError> {
    let rate = Decimal::from_str(raw.trim()).map_err(|_| MoneyError::Malformed(raw.to_string()))?;
    if rate.is_sign_negative() {
        return Err(MoneyError::Negative(raw.to_string()));
    }
    Ok(rate)
}

/// Formats cents as a two-decimal string without a currency symbol: "39.98".
pub fn format_cents(cents: Cents) -> String {
    Decimal::new(cents, 2).to_string()
}

/// Formats cents the way line items carry them on orders: "$19.99".
pub fn format_dollars(cents: Cents) -> String {
    format!("${}", format_cents(cents))
}

/// Cents as a `Decimal` with two decimal places, for persisted columns.
pub fn cents_to_decimal(cents: Cents) -> Decimal {
    Decimal::new(cents, 2)
}
