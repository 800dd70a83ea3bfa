//! Cart snapshot codec.
//!
//! The authorization channel only carries a small set of short string fields,
//! so the frozen cart (lines, contact, address, shipping choice and the
//! computed totals) is flattened into a versioned key/value payload. Totals
//! are computed once at intent time and carried unchanged; the materializer
//! decodes the same payload and re-derives them for verification.
//!
//! Line items are serialized as compact JSON. When that form would exceed
//! [`METADATA_VALUE_CEILING`] the codec degrades to a human-readable summary,
//! truncated at a character boundary. This degradation is deliberate and
//! explicit: decode reports it as [`Lines::Summarized`] so callers know that
//! per-line detail was lost.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::{self, Cents, Totals};

/// Schema version written under the `v` key. Decode rejects anything else.
pub const SNAPSHOT_VERSION: &str = "1";

/// Upper bound, in bytes, for any single encoded metadata value.
pub const METADATA_VALUE_CEILING: usize = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("Required snapshot field '{0}' is missing")]
    MissingField(&'static str),

    #[error("Snapshot field '{field}' is malformed: {detail}")]
    MalformedField { field: &'static str, detail: String },

    #[error("Snapshot contains no line items")]
    EmptyCart,

    #[error("Unsupported snapshot version '{0}'")]
    UnsupportedVersion(String),

    #[error("Tax rate '{0}' carries more than four decimal places")]
    RateTooPrecise(String),
}

/// A single immutable cart line. Unit price is in cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub name: String,
    pub unit_price: Cents,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub line1: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

/// The shipping option the shopper chose from the carrier-rate quote.
/// `rate` is carried unchanged into the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingSelection {
    pub carrier: String,
    pub service: Option<String>,
    pub rate: Cents,
    pub delivery_days: Option<u32>,
    pub estimated_delivery: Option<String>,
}

/// Line items as they survived transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lines {
    /// Full per-line detail; totals can be independently recomputed.
    Itemized(Vec<CartLine>),
    /// Lossy fallback used when the itemized form exceeded the ceiling.
    Summarized(String),
}

impl Lines {
    pub fn is_itemized(&self) -> bool {
        matches!(self, Lines::Itemized(_))
    }
}

/// The frozen cart attached to a payment authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSnapshot {
    pub lines: Lines,
    pub contact: Contact,
    pub address: ShippingAddress,
    pub shipping: ShippingSelection,
    pub tax_rate: Decimal,
    pub totals: Totals,
}

/// Compact wire form of a cart line: `{"n":"Widget","q":2,"p":1999}`.
#[derive(Serialize, Deserialize)]
struct LineRepr {
    n: String,
    q: u32,
    p: Cents,
}

impl CartSnapshot {
    /// Flattens the snapshot into the transport payload.
    ///
    /// Fails when the tax rate cannot be carried at the declared four-decimal
    /// precision: rounding it here would make the materializer recompute tax
    /// with a different rate than the one the totals were built from, and
    /// every completion event for the intent would then be rejected.
    pub fn encode(&self) -> Result<BTreeMap<String, String>, SnapshotError> {
        let mut map = BTreeMap::new();
        map.insert("v".to_string(), SNAPSHOT_VERSION.to_string());

        map.insert("name".to_string(), self.contact.name.clone());
        map.insert("email".to_string(), self.contact.email.clone());
        if let Some(phone) = &self.contact.phone {
            map.insert("phone".to_string(), phone.clone());
        }

        map.insert("address_line1".to_string(), self.address.line1.clone());
        map.insert("address_city".to_string(), self.address.city.clone());
        map.insert("address_state".to_string(), self.address.state.clone());
        map.insert(
            "address_postal_code".to_string(),
            self.address.postal_code.clone(),
        );
        map.insert("address_country".to_string(), self.address.country.clone());

        match &self.lines {
            Lines::Itemized(lines) => {
                let reprs: Vec<LineRepr> = lines
                    .iter()
                    .map(|line| LineRepr {
                        n: line.name.clone(),
                        q: line.quantity,
                        p: line.unit_price,
                    })
                    .collect();
                // serializing Vec<LineRepr> cannot fail
                let json = serde_json::to_string(&reprs).unwrap_or_default();
                if json.len() <= METADATA_VALUE_CEILING {
                    map.insert("items".to_string(), json);
                } else {
                    map.insert("items_summary".to_string(), summarize_lines(lines));
                }
            }
            Lines::Summarized(summary) => {
                map.insert(
                    "items_summary".to_string(),
                    truncate_at_char_boundary(summary, METADATA_VALUE_CEILING).to_string(),
                );
            }
        }

        map.insert(
            "subtotal_amount".to_string(),
            money::format_cents(self.totals.subtotal),
        );
        map.insert(
            "tax_amount".to_string(),
            money::format_cents(self.totals.tax),
        );
        map.insert(
            "shipping_rate".to_string(),
            money::format_cents(self.totals.shipping),
        );
        map.insert(
            "total_amount".to_string(),
            money::format_cents(self.totals.total),
        );
        map.insert("tax_rate".to_string(), format_rate(self.tax_rate)?);

        map.insert(
            "shipping_carrier".to_string(),
            self.shipping.carrier.clone(),
        );
        if let Some(service) = &self.shipping.service {
            map.insert("shipping_service".to_string(), service.clone());
        }
        if let Some(days) = self.shipping.delivery_days {
            map.insert("shipping_delivery_days".to_string(), days.to_string());
        }
        if let Some(eta) = &self.shipping.estimated_delivery {
            map.insert("shipping_estimated_delivery".to_string(), eta.clone());
        }

        Ok(map)
    }

    /// Reconstructs a snapshot from the transport payload.
    ///
    /// Required fields (contact email, address line1, line items, carried
    /// totals and tax rate) produce an error when missing or malformed;
    /// optional fields fall back to defined defaults.
    pub fn decode(map: &BTreeMap<String, String>) -> Result<Self, SnapshotError> {
        let version = map.get("v").ok_or(SnapshotError::MissingField("v"))?;
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version.clone()));
        }

        let email = required_nonempty(map, "email")?;
        let line1 = required_nonempty(map, "address_line1")?;

        let lines = match map.get("items") {
            Some(json) => {
                let reprs: Vec<LineRepr> = serde_json::from_str(json).map_err(|e| {
                    SnapshotError::MalformedField {
                        field: "items",
                        detail: e.to_string(),
                    }
                })?;
                if reprs.is_empty() {
                    return Err(SnapshotError::EmptyCart);
                }
                Lines::Itemized(
                    reprs
                        .into_iter()
                        .map(|r| CartLine {
                            name: r.n,
                            unit_price: r.p,
                            quantity: r.q,
                        })
                        .collect(),
                )
            }
            None => match map.get("items_summary") {
                Some(summary) if !summary.is_empty() => Lines::Summarized(summary.clone()),
                _ => return Err(SnapshotError::MissingField("items")),
            },
        };

        let totals = Totals {
            subtotal: required_cents(map, "subtotal_amount")?,
            tax: required_cents(map, "tax_amount")?,
            shipping: required_cents(map, "shipping_rate")?,
            total: required_cents(map, "total_amount")?,
        };

        let tax_rate = money::parse_rate(
            map.get("tax_rate")
                .ok_or(SnapshotError::MissingField("tax_rate"))?,
        )
        .map_err(|e| SnapshotError::MalformedField {
            field: "tax_rate",
            detail: e.to_string(),
        })?;

        let delivery_days = match map.get("shipping_delivery_days") {
            Some(raw) if !raw.is_empty() => {
                Some(
                    raw.parse::<u32>()
                        .map_err(|e| SnapshotError::MalformedField {
                            field: "shipping_delivery_days",
                            detail: e.to_string(),
                        })?,
                )
            }
            _ => None,
        };

        Ok(CartSnapshot {
            lines,
            contact: Contact {
                name: optional(map, "name"),
                email,
                phone: nonempty(map, "phone"),
            },
            address: ShippingAddress {
                line1,
                city: optional(map, "address_city"),
                state: optional(map, "address_state"),
                postal_code: optional(map, "address_postal_code"),
                country: optional(map, "address_country"),
            },
            shipping: ShippingSelection {
                carrier: optional(map, "shipping_carrier"),
                service: nonempty(map, "shipping_service"),
                rate: totals.shipping,
                delivery_days,
                estimated_delivery: nonempty(map, "shipping_estimated_delivery"),
            },
            tax_rate,
            totals,
        })
    }
}

fn required_nonempty(
    map: &BTreeMap<String, String>,
    field: &'static str,
) -> Result<String, SnapshotError> {
    match map.get(field) {
        Some(value) if !value.trim().is_empty() => Ok(value.clone()),
        _ => Err(SnapshotError::MissingField(field)),
    }
}

fn required_cents(
    map: &BTreeMap<String, String>,
    field: &'static str,
) -> Result<Cents, SnapshotError> {
    let raw = map.get(field).ok_or(SnapshotError::MissingField(field))?;
    money::parse_cents(raw).map_err(|e| SnapshotError::MalformedField {
        field,
        detail: e.to_string(),
    })
}

fn optional(map: &BTreeMap<String, String>, field: &str) -> String {
    map.get(field).cloned().unwrap_or_default()
}

fn nonempty(map: &BTreeMap<String, String>, field: &str) -> Option<String> {
    map.get(field).filter(|v| !v.is_empty()).cloned()
}

fn format_rate(rate: Decimal) -> Result<String, SnapshotError> {
    if rate.normalize().scale() > 4 {
        return Err(SnapshotError::RateTooPrecise(rate.to_string()));
    }
    let mut fixed = rate;
    fixed.rescale(4);
    Ok(fixed.to_string())
}

fn summarize_lines(lines: &[CartLine]) -> String {
    let summary = lines
        .iter()
        .map(|line| format!("{} x{}", line.name, line.quantity))
        .collect::<Vec<_>>()
        .join(", ");
    truncate_at_char_boundary(&summary, METADATA_VALUE_CEILING).to_string()
}

fn truncate_at_char_boundary(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
