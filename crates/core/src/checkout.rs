//! Checkout request building.
//!
//! Turns the shopper's cart lines, contact details and shipping address into
//! a [`CheckoutSessionRequest`] for the payment provider. The original
//! `(variant, quantity, unit price)` tuples and the shipping address ride
//! along as session metadata so the order can be rebuilt after payment
//! without trusting live catalog prices.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::types::money::to_minor_units;
use crate::types::{CurrencyCode, Email, EmailError};

/// Maximum length of one serialized metadata value.
pub const MAX_METADATA_VALUE_LENGTH: usize = 500;

/// Metadata key holding the owning user id.
pub const METADATA_USER_ID: &str = "userId";
/// Metadata key holding the compact `[[variant, quantity, unit price]]` list.
pub const METADATA_ITEMS: &str = "items";
/// Metadata key holding the shipping address.
pub const METADATA_SHIPPING: &str = "shipping";

/// Name used for line items without one.
pub const DEFAULT_ITEM_NAME: &str = "Produit";

/// Placeholder the payment provider replaces with the session id.
pub const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// Checkout validation errors. Messages are customer-facing.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("Le panier est vide.")]
    EmptyCart,

    #[error("Adresse e-mail requise.")]
    MissingEmail,

    #[error("Adresse e-mail invalide.")]
    InvalidEmail(#[source] EmailError),

    #[error("Utilisateur requis pour passer commande.")]
    MissingUser,
}

/// One cart line as submitted to checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckoutItem {
    pub name: Option<String>,
    pub variant_id: Option<String>,
    pub quantity: Option<i64>,
    pub unit_price: Option<Decimal>,
    pub image: Option<String>,
}

/// Customer contact details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Customer {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Shipping address, serialized as-is into session metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShippingAddress {
    pub address_line1: String,
    pub address_line2: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// An unvalidated checkout submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckoutDraft {
    pub items: Vec<CheckoutItem>,
    pub customer: Customer,
    pub shipping: ShippingAddress,
    pub user_id: Option<String>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
}

/// A line item in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentLineItem {
    pub name: String,
    pub image: Option<String>,
    pub unit_amount: i64,
    pub quantity: u32,
}

/// A validated request for a hosted payment session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutSessionRequest {
    pub customer_email: Email,
    pub currency: CurrencyCode,
    pub line_items: Vec<PaymentLineItem>,
    pub metadata: BTreeMap<String, String>,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutDraft {
    /// Validate the draft and build the payment-session request.
    ///
    /// Missing success/cancel URLs default to the order confirmation page
    /// and the checkout page under `base_url`.
    ///
    /// # Errors
    ///
    /// Returns the first failed precondition, checked in order: empty cart,
    /// missing email, invalid email, missing user.
    pub fn into_request(
        self,
        base_url: &str,
        currency: CurrencyCode,
    ) -> Result<CheckoutSessionRequest, CheckoutError> {
        if self.items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let email = non_blank(self.customer.email.as_deref()).ok_or(CheckoutError::MissingEmail)?;
        let customer_email = Email::parse(email).map_err(CheckoutError::InvalidEmail)?;

        let user_id = non_blank(self.user_id.as_deref()).ok_or(CheckoutError::MissingUser)?;

        let line_items = self.items.iter().map(payment_line_item).collect();

        let mut metadata = BTreeMap::new();
        metadata.insert(METADATA_USER_ID.to_owned(), user_id.to_owned());
        if let Some(items) = encode_items_metadata(&self.items) {
            metadata.insert(METADATA_ITEMS.to_owned(), items);
        }
        if let Some(shipping) = encode_shipping_metadata(&self.shipping) {
            metadata.insert(METADATA_SHIPPING.to_owned(), shipping);
        }

        let base_url = base_url.trim_end_matches('/');
        let success_url = non_blank(self.success_url.as_deref()).map_or_else(
            || format!("{base_url}/order-success?session_id={SESSION_ID_PLACEHOLDER}"),
            str::to_owned,
        );
        let cancel_url = non_blank(self.cancel_url.as_deref())
            .map_or_else(|| format!("{base_url}/checkout"), str::to_owned);

        Ok(CheckoutSessionRequest {
            customer_email,
            currency,
            line_items,
            metadata,
            success_url,
            cancel_url,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn payment_line_item(item: &CheckoutItem) -> PaymentLineItem {
    let quantity = item.quantity.unwrap_or(1).max(1);
    PaymentLineItem {
        name: non_blank(item.name.as_deref())
            .unwrap_or(DEFAULT_ITEM_NAME)
            .to_owned(),
        image: non_blank(item.image.as_deref()).map(str::to_owned),
        unit_amount: to_minor_units(item.unit_price.unwrap_or(Decimal::ZERO)),
        quantity: u32::try_from(quantity).unwrap_or(u32::MAX),
    }
}

/// Serialize items as `[[variant_id, quantity, unit_price], ...]`.
///
/// Returns `None` when the result exceeds [`MAX_METADATA_VALUE_LENGTH`];
/// a truncated value could not be parsed back.
#[must_use]
pub fn encode_items_metadata(items: &[CheckoutItem]) -> Option<String> {
    let compact: Vec<serde_json::Value> = items
        .iter()
        .map(|item| {
            let price = item
                .unit_price
                .unwrap_or(Decimal::ZERO)
                .to_f64()
                .unwrap_or(0.0);
            serde_json::json!([
                item.variant_id.as_deref().unwrap_or_default(),
                item.quantity.unwrap_or(1),
                price
            ])
        })
        .collect();

    within_limit(serde_json::to_string(&compact).ok()?)
}

/// Serialize the shipping address, or `None` when over the length limit.
#[must_use]
pub fn encode_shipping_metadata(shipping: &ShippingAddress) -> Option<String> {
    within_limit(serde_json::to_string(shipping).ok()?)
}

fn within_limit(serialized: String) -> Option<String> {
    (serialized.chars().count() <= MAX_METADATA_VALUE_LENGTH).then_some(serialized)
}
