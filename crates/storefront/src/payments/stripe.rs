//! Stripe Checkout client.
//!
//! Talks to the REST API directly with `reqwest`: requests are
//! form-encoded with bracketed keys, responses are JSON.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sneaco_core::PaymentSessionId;
use sneaco_core::checkout::CheckoutSessionRequest;
use tracing::{debug, instrument};
use url::Url;

use super::{
    CreatedSession, CustomerDetails, PaymentError, PaymentProvider, PaymentSession,
    SessionLineItem, ShippingDetails,
};
use crate::config::StripeConfig;

/// Client for the Stripe Checkout Sessions API.
#[derive(Clone)]
pub struct StripeClient {
    inner: Arc<StripeClientInner>,
}

struct StripeClientInner {
    client: reqwest::Client,
    api_base: String,
    secret_key: SecretString,
}

impl StripeClient {
    /// Create a new Stripe client.
    #[must_use]
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            inner: Arc::new(StripeClientInner {
                client: reqwest::Client::new(),
                api_base: config.api_base.clone(),
                secret_key: config.secret_key.clone(),
            }),
        }
    }

    fn sessions_url(&self) -> Result<Url, PaymentError> {
        Ok(Url::parse(&format!(
            "{}/v1/checkout/sessions",
            self.inner.api_base
        ))?)
    }

    /// Turn a non-success response into `PaymentError::Api`.
    async fn api_error(response: reqwest::Response) -> PaymentError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<StripeErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.message)
            .unwrap_or_else(|| body.chars().take(200).collect());

        tracing::error!(status, message = %message, "Stripe API returned non-success status");
        PaymentError::Api { status, message }
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    #[instrument(skip(self, request), fields(line_items = request.line_items.len()))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CreatedSession, PaymentError> {
        let response = self
            .inner
            .client
            .post(self.sessions_url()?)
            .bearer_auth(self.inner.secret_key.expose_secret())
            .form(&session_form(request))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let session: StripeSession = serde_json::from_str(&response.text().await?)?;
        debug!(session_id = %session.id, "Checkout session created");

        let url = session
            .url
            .ok_or_else(|| PaymentError::MissingUrl(session.id.clone()))?;
        Ok(CreatedSession {
            id: PaymentSessionId::new(session.id),
            url,
        })
    }

    #[instrument(skip(self), fields(session_id = %id))]
    async fn retrieve_session(
        &self,
        id: &PaymentSessionId,
    ) -> Result<Option<PaymentSession>, PaymentError> {
        let mut url = self.sessions_url()?;
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .push(id.as_str());
        url.query_pairs_mut().append_pair("expand[]", "line_items");

        let response = self
            .inner
            .client
            .get(url)
            .bearer_auth(self.inner.secret_key.expose_secret())
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!("Checkout session not found");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let session: StripeSession = serde_json::from_str(&response.text().await?)?;
        Ok(Some(session.into()))
    }
}

/// Form fields for `POST /v1/checkout/sessions`.
fn session_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_owned(), "payment".to_owned()),
        ("payment_method_types[0]".to_owned(), "card".to_owned()),
        (
            "customer_email".to_owned(),
            request.customer_email.to_string(),
        ),
        ("success_url".to_owned(), request.success_url.clone()),
        ("cancel_url".to_owned(), request.cancel_url.clone()),
        ("billing_address_collection".to_owned(), "auto".to_owned()),
        ("phone_number_collection[enabled]".to_owned(), "true".to_owned()),
    ];

    let currency = request.currency.provider_code();
    for (i, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        form.push((
            format!("{prefix}[price_data][currency]"),
            currency.to_owned(),
        ));
        form.push((
            format!("{prefix}[price_data][unit_amount]"),
            item.unit_amount.to_string(),
        ));
        form.push((
            format!("{prefix}[price_data][product_data][name]"),
            item.name.clone(),
        ));
        if let Some(image) = &item.image {
            form.push((
                format!("{prefix}[price_data][product_data][images][0]"),
                image.clone(),
            ));
        }
        form.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
    }

    for (key, value) in &request.metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }

    form
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    customer_details: Option<CustomerDetails>,
    #[serde(default)]
    shipping_details: Option<ShippingDetails>,
    #[serde(default)]
    collected_information: Option<CollectedInformation>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    line_items: Option<LineItemList>,
}

/// Newer API versions report shipping under `collected_information`.
#[derive(Debug, Default, Deserialize)]
struct CollectedInformation {
    #[serde(default)]
    shipping_details: Option<ShippingDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct LineItemList {
    #[serde(default)]
    data: Vec<SessionLineItem>,
}

impl From<StripeSession> for PaymentSession {
    fn from(session: StripeSession) -> Self {
        let shipping_details = session
            .shipping_details
            .or_else(|| session.collected_information.and_then(|c| c.shipping_details));

        Self {
            id: PaymentSessionId::new(session.id),
            amount_total: session.amount_total,
            currency: session.currency,
            payment_status: session.payment_status,
            customer_details: session.customer_details,
            shipping_details,
            metadata: session.metadata,
            line_items: session.line_items.map(|l| l.data).unwrap_or_default(),
        }
    }
}
