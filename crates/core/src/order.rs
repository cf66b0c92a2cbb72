//! Orders and payment-session metadata decoding.
//!
//! An order is created once per paid payment session. Its items come from
//! the metadata written at checkout, never from a fresh catalog read, so the
//! recorded unit price is the price the customer saw.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::money::from_minor_units;
use crate::types::{OrderId, OrderStatus, PaymentSessionId, UserId, VariantId};

/// Metadata that could not be decoded.
#[derive(thiserror::Error, Debug)]
pub enum MetadataError {
    #[error("metadata is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("metadata has unexpected shape: {0}")]
    Shape(&'static str),
}

/// A purchased variant with its price at purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub variant_id: VariantId,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl OrderItem {
    /// Unit price times quantity, saturating at `Decimal::MAX`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price
            .checked_mul(Decimal::from(self.quantity))
            .unwrap_or(Decimal::MAX)
    }
}

/// Decode the compact `[[variant_id, quantity, unit_price], ...]` list.
///
/// Absent metadata decodes to no items. Entries are read leniently: ids may
/// be numbers, prices may be strings, a missing quantity is 1 and a missing
/// price is 0. Quantities are floored at 1 and prices rounded to cents.
///
/// # Errors
///
/// Returns [`MetadataError`] if the value is not JSON or not a list of lists.
pub fn decode_items_metadata(raw: Option<&str>) -> Result<Vec<OrderItem>, MetadataError> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Ok(Vec::new());
    };

    let Value::Array(entries) = serde_json::from_str::<Value>(raw)? else {
        return Err(MetadataError::Shape("items must be a list"));
    };

    entries
        .iter()
        .map(|entry| {
            let Value::Array(fields) = entry else {
                return Err(MetadataError::Shape("item must be a list"));
            };
            let mut fields = fields.iter();

            let variant_id = match fields.next() {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => String::new(),
            };
            let quantity = fields.next().map_or(1, quantity_from_json);
            let unit_price = fields
                .next()
                .and_then(decimal_from_json)
                .unwrap_or(Decimal::ZERO)
                .round_dp(2);

            Ok(OrderItem {
                variant_id: VariantId::new(variant_id),
                quantity,
                unit_price,
            })
        })
        .collect()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quantity_from_json(value: &Value) -> u32 {
    value
        .as_f64()
        .map_or(1, |q| q.round().clamp(1.0, f64::from(u32::MAX)) as u32)
}

fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Decode the shipping-address metadata into a JSON object.
///
/// # Errors
///
/// Returns [`MetadataError`] if the value is not a JSON object.
pub fn decode_shipping_metadata(raw: Option<&str>) -> Result<Option<Value>, MetadataError> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(raw)? {
        value @ Value::Object(_) => Ok(Some(value)),
        _ => Err(MetadataError::Shape("shipping must be an object")),
    }
}

/// An order ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub payment_session_id: PaymentSessionId,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub shipping_address: Option<Value>,
    pub billing_address: Option<Value>,
    pub items: Vec<OrderItem>,
}

impl NewOrder {
    /// A paid order for a completed payment session.
    ///
    /// `amount_total` is the session's paid amount in minor units.
    #[must_use]
    pub fn paid(
        user_id: UserId,
        payment_session_id: PaymentSessionId,
        amount_total: i64,
        items: Vec<OrderItem>,
    ) -> Self {
        Self {
            user_id,
            payment_session_id,
            total_amount: from_minor_units(amount_total),
            status: OrderStatus::Paid,
            shipping_address: None,
            billing_address: None,
            items,
        }
    }

    #[must_use]
    pub fn with_shipping(mut self, shipping: Option<Value>) -> Self {
        self.shipping_address = shipping;
        self
    }

    #[must_use]
    pub fn with_billing(mut self, billing: Option<Value>) -> Self {
        self.billing_address = billing;
        self
    }
}

/// A stored order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub payment_session_id: Option<PaymentSessionId>,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub shipping_address: Option<Value>,
    pub billing_address: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

/// Whether an insert created the order or found it already recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(OrderId),
    Existing(OrderId),
}

impl InsertOutcome {
    #[must_use]
    pub const fn id(&self) -> &OrderId {
        match self {
            Self::Created(id) | Self::Existing(id) => id,
        }
    }

    #[must_use]
    pub fn into_id(self) -> OrderId {
        match self {
            Self::Created(id) | Self::Existing(id) => id,
        }
    }
}
