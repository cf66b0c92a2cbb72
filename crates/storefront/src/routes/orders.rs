//! Order confirmation and history.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use sneaco_core::PaymentSessionId;
use sneaco_core::order::Order;
use tower_sessions::Session;
use tracing::{instrument, warn};

use super::cart::open_cart;
use crate::error::Result;
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::{CurrentUser, session_keys};
use crate::services::orders::{Confirmation, OrderReconciler};
use crate::state::AppState;

/// Query of the payment processor's success redirect.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SuccessQuery {
    pub session_id: Option<String>,
}

/// Order confirmation page template.
#[derive(Template, WebTemplate)]
#[template(path = "order_success.html")]
pub struct OrderSuccessTemplate {
    pub confirmation: Confirmation,
    pub email_label: String,
}

impl From<Confirmation> for OrderSuccessTemplate {
    fn from(confirmation: Confirmation) -> Self {
        let email_label = confirmation
            .customer_email
            .clone()
            .unwrap_or_else(|| "votre adresse".to_string());
        Self {
            confirmation,
            email_label,
        }
    }
}

/// Not found page template.
#[derive(Template, WebTemplate)]
#[template(path = "not_found.html")]
pub struct NotFoundTemplate {
    pub message: String,
}

/// Record the order for a completed payment and confirm it.
///
/// Without a session reference the customer goes back to the shop; an
/// unknown or ownerless session is a 404. The cart is emptied once per
/// payment session, however often the page is reloaded.
#[instrument(skip(state, session, user, query))]
pub async fn success(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<SuccessQuery>,
) -> Result<Response> {
    let Some(session_id) = query
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(PaymentSessionId::new)
    else {
        return Ok(Redirect::to("/products").into_response());
    };

    let reconciler = OrderReconciler::new(state.payments(), state.orders());
    let Some(confirmation) = reconciler.reconcile(&session_id).await else {
        return Ok((
            StatusCode::NOT_FOUND,
            NotFoundTemplate {
                message: "Cette commande est introuvable.".to_string(),
            },
        )
            .into_response());
    };

    clear_cart_once(&state, &session, user.as_ref(), &session_id).await;

    Ok(OrderSuccessTemplate::from(confirmation).into_response())
}

async fn clear_cart_once(
    state: &AppState,
    session: &Session,
    user: Option<&CurrentUser>,
    session_id: &PaymentSessionId,
) {
    let already = session
        .get::<PaymentSessionId>(session_keys::CART_CLEARED_FOR)
        .await
        .ok()
        .flatten();
    if already.as_ref() == Some(session_id) {
        return;
    }

    let cleared = match open_cart(state, session, user).await {
        Ok(cart) => cart.clear().await.map(|_| ()).map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    match cleared {
        Ok(()) => {
            if let Err(error) = session.insert(session_keys::CART_CLEARED_FOR, session_id).await {
                warn!(%error, "Could not remember the cleared cart");
            }
        }
        Err(error) => warn!(%error, "Could not clear the cart after payment"),
    }
}

/// The signed-in customer's orders, newest first.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn history(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.orders().list_for_user(&user.id).await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn confirmation(email: Option<&str>) -> Confirmation {
        Confirmation {
            order_number: "cs_test_1".to_string(),
            order_id: None,
            newly_created: false,
            amount_paid: Decimal::new(4999, 2),
            customer_email: email.map(str::to_string),
            items: vec![],
        }
    }

    #[test]
    fn test_email_label_falls_back() {
        assert_eq!(
            OrderSuccessTemplate::from(confirmation(None)).email_label,
            "votre adresse"
        );
        assert_eq!(
            OrderSuccessTemplate::from(confirmation(Some("a@b.fr"))).email_label,
            "a@b.fr"
        );
    }

    #[test]
    fn test_confirmation_page_renders_amount_and_reference() {
        let html = OrderSuccessTemplate::from(confirmation(None)).render().unwrap();
        assert!(html.contains("Commande confirmée"));
        assert!(html.contains("cs_test_1"));
        assert!(html.contains("49.99 EUR"));
    }
}
