//! Cart route handlers.
//!
//! The cart lives in the session and is mirrored to Postgres in the
//! background. Mutations answer with the new state plus an `HX-Trigger`
//! header so the page can refresh the badge and open the drawer.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    response::{AppendHeaders, IntoResponse},
};
use serde::{Deserialize, Serialize};
use sneaco_core::VariantId;
use sneaco_core::cart::CartError;
use tower_sessions::Session;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{Result, add_breadcrumb};
use crate::middleware::OptionalAuth;
use crate::models::{CartOwner, CurrentUser, session_keys};
use crate::services::SessionStorage;
use crate::services::cart::{CartMutation, CartStore, CartView};
use crate::state::AppState;

/// Events fired after any cart change.
const CART_UPDATED: &str = "cart-updated";

/// Events fired after an add: refresh and open the drawer.
const CART_UPDATED_AND_OPEN: &str = "cart-updated, cart-open";

/// Resolve who owns the mirrored cart, minting an anonymous token once per
/// browsing session.
async fn cart_owner(session: &Session, user: Option<&CurrentUser>) -> Result<CartOwner> {
    if let Some(user) = user {
        return Ok(CartOwner::User(user.id.clone()));
    }

    let existing = session
        .get::<String>(session_keys::CART_OWNER)
        .await
        .map_err(crate::services::StorageError::from)?;
    if let Some(token) = existing {
        return Ok(CartOwner::Anonymous(token));
    }

    let token = Uuid::new_v4().to_string();
    session
        .insert(session_keys::CART_OWNER, &token)
        .await
        .map_err(crate::services::StorageError::from)?;
    Ok(CartOwner::Anonymous(token))
}

/// Open the cart store for this request.
pub(crate) async fn open_cart(
    state: &AppState,
    session: &Session,
    user: Option<&CurrentUser>,
) -> Result<CartStore> {
    let owner = cart_owner(session, user).await?;
    Ok(CartStore::new(
        Box::new(SessionStorage::new(session.clone(), session_keys::CART)),
        Arc::clone(state.carts()),
        Arc::clone(state.catalog()),
        owner,
    ))
}

/// Add to cart request body.
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub variant_id: VariantId,
    /// Defaults to 1. Zero or negative is rejected.
    pub quantity: Option<i64>,
}

impl AddToCartRequest {
    fn units(&self) -> std::result::Result<u32, CartError> {
        match self.quantity {
            None => Ok(1),
            Some(q) if q <= 0 => Err(CartError::InvalidQuantity),
            Some(q) => Ok(u32::try_from(q).unwrap_or(u32::MAX)),
        }
    }
}

/// Update quantity request body.
#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    pub variant_id: VariantId,
    pub quantity: i64,
}

/// Remove line request body.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartRequest {
    pub variant_id: VariantId,
}

#[derive(Debug, Serialize)]
pub struct CartCount {
    pub count: u32,
}

/// Display the detailed cart.
#[instrument(skip(state, session, user))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<CartView>> {
    let cart = open_cart(&state, &session, user.as_ref()).await?;
    Ok(Json(cart.detailed().await?))
}

/// Add units of a variant.
#[instrument(skip(state, session, user, request), fields(variant_id = %request.variant_id))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Json(request): Json<AddToCartRequest>,
) -> Result<impl IntoResponse> {
    let cart = open_cart(&state, &session, user.as_ref()).await?;
    let quantity = request.units()?;

    add_breadcrumb(
        "cart",
        "Added to cart",
        Some(&[("variant_id", request.variant_id.as_str())]),
    );
    let mutation = cart.add(request.variant_id, quantity).await?;

    Ok((
        AppendHeaders([("HX-Trigger", CART_UPDATED_AND_OPEN)]),
        Json(mutation),
    ))
}

/// Set a line's quantity.
#[instrument(skip(state, session, user, request), fields(variant_id = %request.variant_id))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Json(request): Json<UpdateCartRequest>,
) -> Result<impl IntoResponse> {
    let cart = open_cart(&state, &session, user.as_ref()).await?;
    let mutation = cart.set_quantity(request.variant_id, request.quantity).await?;
    Ok(updated(mutation))
}

/// Remove a line.
#[instrument(skip(state, session, user, request), fields(variant_id = %request.variant_id))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Json(request): Json<RemoveFromCartRequest>,
) -> Result<impl IntoResponse> {
    let cart = open_cart(&state, &session, user.as_ref()).await?;
    let mutation = cart.remove(request.variant_id).await?;
    Ok(updated(mutation))
}

/// Empty the cart.
#[instrument(skip(state, session, user))]
pub async fn clear(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<impl IntoResponse> {
    let cart = open_cart(&state, &session, user.as_ref()).await?;
    let mutation = cart.clear().await?;
    Ok(updated(mutation))
}

/// Units in the cart, for the header badge.
#[instrument(skip(state, session, user))]
pub async fn count(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<CartCount>> {
    let cart = open_cart(&state, &session, user.as_ref()).await?;
    Ok(Json(CartCount {
        count: cart.count().await?,
    }))
}

fn updated(mutation: CartMutation) -> impl IntoResponse {
    (AppendHeaders([("HX-Trigger", CART_UPDATED)]), Json(mutation))
}
