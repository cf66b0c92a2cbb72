//! Checkout orchestration.
//!
//! Builds a [`CheckoutDraft`] from the detailed cart and the submitted form,
//! validates it into a payment-session request, and asks the payment
//! provider for a hosted session. The caller redirects to the returned URL.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sneaco_core::checkout::{CheckoutDraft, CheckoutError, CheckoutItem, Customer, ShippingAddress};
use sneaco_core::{CurrencyCode, UserId};
use thiserror::Error;
use tracing::{info, instrument};

use super::cart::CartView;
use crate::models::CurrentUser;
use crate::payments::{CreatedSession, PaymentError, PaymentProvider};

/// Country preselected on the checkout form.
pub const DEFAULT_COUNTRY: &str = "FR";

/// A shipping destination offered on the checkout form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Country {
    pub code: &'static str,
    pub label: &'static str,
}

/// Shipping destinations, default first.
pub const COUNTRIES: &[Country] = &[
    Country { code: DEFAULT_COUNTRY, label: "France" },
    Country { code: "BE", label: "Belgique" },
    Country { code: "CH", label: "Suisse" },
    Country { code: "CA", label: "Canada" },
];

/// VAT rate shown in the checkout summary.
const VAT_RATE: Decimal = Decimal::from_parts(20, 0, 0, false, 2);

/// Errors starting a checkout.
#[derive(Debug, Error)]
pub enum CheckoutServiceError {
    #[error(transparent)]
    Invalid(#[from] CheckoutError),

    #[error("payment provider error: {0}")]
    Payment(#[from] PaymentError),
}

impl CheckoutServiceError {
    /// Message shown on the checkout page.
    #[must_use]
    pub fn customer_message(&self) -> String {
        match self {
            Self::Invalid(err) => err.to_string(),
            Self::Payment(_) => "Création de la session de paiement impossible.".to_owned(),
        }
    }
}

/// Fields of the checkout form, echoed back when the page is re-rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address_line1: String,
    pub address_line2: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

impl Default for CheckoutForm {
    fn default() -> Self {
        Self {
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            phone: String::new(),
            address_line1: String::new(),
            address_line2: String::new(),
            city: String::new(),
            postal_code: String::new(),
            country: DEFAULT_COUNTRY.to_owned(),
        }
    }
}

impl CheckoutForm {
    /// An empty form prefilled from the signed-in customer's profile.
    #[must_use]
    pub fn prefilled(user: Option<&CurrentUser>) -> Self {
        let mut form = Self::default();
        if let Some(user) = user {
            form.first_name = user.first_name.clone().unwrap_or_default();
            form.last_name = user.last_name.clone().unwrap_or_default();
            form.email = user.email.clone().unwrap_or_default();
        }
        form
    }

    /// Build the checkout draft for this form and cart.
    #[must_use]
    pub fn into_draft(self, cart: &CartView, user_id: Option<&UserId>) -> CheckoutDraft {
        CheckoutDraft {
            items: checkout_items(cart),
            customer: Customer {
                first_name: Some(self.first_name),
                last_name: Some(self.last_name),
                email: Some(self.email),
                phone: Some(self.phone),
            },
            shipping: ShippingAddress {
                address_line1: self.address_line1,
                address_line2: self.address_line2,
                city: self.city,
                postal_code: self.postal_code,
                country: self.country,
            },
            user_id: user_id.map(|id| id.as_str().to_owned()),
            success_url: None,
            cancel_url: None,
        }
    }
}

/// Cart lines as checkout items, at the prices currently displayed.
#[must_use]
pub fn checkout_items(cart: &CartView) -> Vec<CheckoutItem> {
    cart.lines
        .iter()
        .map(|line| CheckoutItem {
            name: Some(line.name.clone()),
            variant_id: Some(line.variant_id.as_str().to_owned()),
            quantity: Some(i64::from(line.quantity)),
            unit_price: Some(line.unit_price),
            image: Some(line.image.clone()),
        })
        .collect()
}

/// Order summary figures shown beside the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub taxes: Decimal,
    pub total: Decimal,
}

impl Totals {
    #[must_use]
    pub fn for_cart(cart: &CartView) -> Self {
        let taxes = (cart.subtotal * VAT_RATE).round_dp(2);
        Self {
            subtotal: cart.subtotal,
            taxes,
            total: cart.subtotal + taxes,
        }
    }
}

/// Validate the draft and create the hosted payment session.
///
/// # Errors
///
/// `Invalid` when a precondition fails (nothing is sent to the provider),
/// `Payment` when the provider call fails.
#[instrument(skip(payments, draft), fields(items = draft.items.len()))]
pub async fn start_checkout(
    payments: &dyn PaymentProvider,
    draft: CheckoutDraft,
    base_url: &str,
    currency: CurrencyCode,
) -> Result<CreatedSession, CheckoutServiceError> {
    let request = draft.into_request(base_url, currency)?;
    let session = payments.create_checkout_session(&request).await?;
    info!(session_id = %session.id, "Checkout session created");
    Ok(session)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sneaco_core::{ProductId, VariantId};

    use super::*;
    use crate::services::cart::CartLineView;

    fn cart() -> CartView {
        CartView {
            lines: vec![CartLineView {
                variant_id: VariantId::new("V9"),
                product_id: ProductId::new("p-9"),
                name: "Court Classic".to_owned(),
                brand: "Sneaco".to_owned(),
                image: "/img/court.jpg".to_owned(),
                size: "42".to_owned(),
                color: "Blanc".to_owned(),
                unit_price: Decimal::new(4999, 2),
                quantity: 1,
                line_total: Decimal::new(4999, 2),
            }],
            subtotal: Decimal::new(4999, 2),
            count: 1,
        }
    }

    #[test]
    fn test_form_into_draft_carries_cart_prices_and_user() {
        let form = CheckoutForm {
            email: "client@sneaco.fr".to_owned(),
            city: "Lyon".to_owned(),
            ..CheckoutForm::default()
        };
        let draft = form.into_draft(&cart(), Some(&UserId::new("u-1")));

        assert_eq!(draft.user_id.as_deref(), Some("u-1"));
        assert_eq!(draft.shipping.country, "FR");
        let item = draft.items.first().unwrap();
        assert_eq!(item.variant_id.as_deref(), Some("V9"));
        assert_eq!(item.unit_price, Some(Decimal::new(4999, 2)));
    }

    #[test]
    fn test_prefilled_from_signed_in_user() {
        let user = CurrentUser {
            id: UserId::new("u-1"),
            email: Some("client@sneaco.fr".to_owned()),
            first_name: Some("Ana".to_owned()),
            last_name: None,
            access_token: "token".to_owned(),
        };
        let form = CheckoutForm::prefilled(Some(&user));
        assert_eq!(form.email, "client@sneaco.fr");
        assert_eq!(form.first_name, "Ana");
        assert_eq!(form.last_name, "");
        assert_eq!(form.country, COUNTRIES.first().unwrap().code);

        assert_eq!(CheckoutForm::prefilled(None), CheckoutForm::default());
    }

    #[test]
    fn test_totals_add_vat() {
        let totals = Totals::for_cart(&cart());
        assert_eq!(totals.taxes, Decimal::new(1000, 2));
        assert_eq!(totals.total, Decimal::new(5999, 2));
    }

    #[test]
    fn test_payment_failure_message_hides_details() {
        let err = CheckoutServiceError::Payment(PaymentError::Api {
            status: 500,
            message: "sk_live leaked?".to_owned(),
        });
        assert!(!err.customer_message().contains("sk_live"));

        let err = CheckoutServiceError::Invalid(CheckoutError::EmptyCart);
        assert_eq!(err.customer_message(), "Le panier est vide.");
    }
}
