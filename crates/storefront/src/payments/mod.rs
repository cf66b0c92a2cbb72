//! Payment processor integration.
//!
//! The storefront never handles card data. It asks the processor for a
//! hosted checkout session, redirects the customer there, and later reads
//! the completed session back to record the order.
//!
//! [`PaymentProvider`] is the seam: production uses [`StripeClient`], tests
//! plug in an in-memory fake.

mod stripe;

pub use stripe::StripeClient;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use sneaco_core::PaymentSessionId;
use sneaco_core::checkout::CheckoutSessionRequest;
use thiserror::Error;

/// Errors that can occur when talking to the payment processor.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The processor rejected the request.
    #[error("payment API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body could not be parsed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Endpoint URL could not be built.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The processor returned a session without a redirect URL.
    #[error("checkout session {0} has no payment URL")]
    MissingUrl(String),
}

/// A freshly created hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSession {
    pub id: PaymentSessionId,
    /// Hosted payment page to redirect the customer to.
    pub url: String,
}

/// A postal address as reported by the processor.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(default)]
pub struct SessionAddress {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

/// Customer details collected on the hosted page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CustomerDetails {
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<SessionAddress>,
}

/// Shipping details collected on the hosted page.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(default)]
pub struct ShippingDetails {
    pub name: Option<String>,
    pub address: Option<SessionAddress>,
}

/// A line item echoed back by the processor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionLineItem {
    pub description: Option<String>,
    pub quantity: Option<u32>,
    /// Line total in minor units.
    pub amount_total: Option<i64>,
}

/// A checkout session read back from the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    pub id: PaymentSessionId,
    /// Paid amount in minor units.
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub payment_status: Option<String>,
    pub customer_details: Option<CustomerDetails>,
    pub shipping_details: Option<ShippingDetails>,
    pub metadata: HashMap<String, String>,
    pub line_items: Vec<SessionLineItem>,
}

impl PaymentSession {
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// The customer completed payment. Sessions with nothing to charge
    /// count as paid.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        matches!(
            self.payment_status.as_deref(),
            Some("paid" | "no_payment_required")
        )
    }

    #[must_use]
    pub fn customer_email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|c| c.email.as_deref())
    }
}

/// Hosted checkout sessions.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a hosted checkout session.
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CreatedSession, PaymentError>;

    /// Read a session back. Unknown references are `Ok(None)`.
    async fn retrieve_session(
        &self,
        id: &PaymentSessionId,
    ) -> Result<Option<PaymentSession>, PaymentError>;
}
