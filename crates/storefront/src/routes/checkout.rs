//! Checkout route handlers.
//!
//! The checkout page posts back to itself; a valid submission is redirected
//! to the hosted payment page. `POST /api/checkout-session` exposes the same
//! orchestration as JSON.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Json,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;
use sneaco_core::checkout::CheckoutDraft;
use tower_sessions::Session;
use tracing::{error, instrument};

use super::cart::open_cart;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::OptionalAuth;
use crate::services::cart::CartView;
use crate::services::checkout::{
    COUNTRIES, CheckoutForm, Country, Totals, start_checkout,
};
use crate::state::AppState;

/// Where an empty cart sends the customer.
const SHOP_PATH: &str = "/products";

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout.html")]
pub struct CheckoutTemplate {
    pub form: CheckoutForm,
    pub cart: CartView,
    pub totals: Totals,
    pub countries: &'static [Country],
    pub error: Option<String>,
}

impl CheckoutTemplate {
    fn new(form: CheckoutForm, cart: CartView, error: Option<String>) -> Self {
        let totals = Totals::for_cart(&cart);
        Self {
            form,
            cart,
            totals,
            countries: COUNTRIES,
            error,
        }
    }
}

/// Created payment session.
#[derive(Debug, Serialize)]
pub struct CheckoutSessionResponse {
    pub id: String,
    pub url: String,
}

/// Display the checkout form, prefilled for a signed-in customer.
#[instrument(skip(state, session, user))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Response> {
    let cart = open_cart(&state, &session, user.as_ref())
        .await?
        .detailed()
        .await?;
    if cart.is_empty() {
        return Ok(Redirect::to(SHOP_PATH).into_response());
    }

    let form = CheckoutForm::prefilled(user.as_ref());
    Ok(CheckoutTemplate::new(form, cart, None).into_response())
}

/// Submit the checkout form.
///
/// Redirects to the payment page on success. On failure the form is shown
/// again with the entered values and the reason.
#[instrument(skip(state, session, user, form))]
pub async fn submit(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Form(form): Form<CheckoutForm>,
) -> Result<Response> {
    let cart = open_cart(&state, &session, user.as_ref())
        .await?
        .detailed()
        .await?;
    if cart.is_empty() {
        return Ok(Redirect::to(SHOP_PATH).into_response());
    }

    add_breadcrumb("checkout", "Checkout submitted", None);
    let draft = form
        .clone()
        .into_draft(&cart, user.as_ref().map(|u| &u.id));
    let config = state.config();

    match start_checkout(state.payments(), draft, &config.base_url, config.stripe.currency).await {
        Ok(created) => Ok(Redirect::to(&created.url).into_response()),
        Err(err) => {
            let message = err.customer_message();
            let status = AppError::from(err).status();
            if status.is_server_error() {
                error!(%status, "Payment session creation failed");
            }
            Ok((status, CheckoutTemplate::new(form, cart, Some(message))).into_response())
        }
    }
}

/// Create a payment session from a JSON checkout draft.
///
/// # Errors
///
/// `400` for an empty cart or a missing or invalid email, `401` without a
/// user, `502` when the payment processor fails.
#[instrument(skip(state, draft), fields(items = draft.items.len()))]
pub async fn create_session(
    State(state): State<AppState>,
    Json(draft): Json<CheckoutDraft>,
) -> Result<Json<CheckoutSessionResponse>> {
    let config = state.config();
    let created = start_checkout(state.payments(), draft, &config.base_url, config.stripe.currency)
        .await?;

    Ok(Json(CheckoutSessionResponse {
        id: created.id.into_inner(),
        url: created.url,
    }))
}
