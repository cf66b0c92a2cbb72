//! Favorite products.

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use sneaco_core::ProductId;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::Result;
use crate::middleware::OptionalAuth;
use crate::models::{CurrentUser, session_keys};
use crate::services::SessionStorage;
use crate::services::favorites::FavoritesStore;
use crate::state::AppState;

pub(crate) fn open_favorites(
    state: &AppState,
    session: &Session,
    user: Option<&CurrentUser>,
) -> FavoritesStore {
    FavoritesStore::new(
        Box::new(SessionStorage::new(session.clone(), session_keys::FAVORITES)),
        Arc::clone(state.favorites()),
        user.map(|u| u.id.clone()),
    )
}

#[derive(Debug, Serialize)]
pub struct FavoritesResponse {
    pub product_ids: Vec<ProductId>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub product_id: ProductId,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub product_id: ProductId,
    pub favorite: bool,
}

#[instrument(skip_all)]
pub async fn list(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<FavoritesResponse>> {
    let favorites = open_favorites(&state, &session, user.as_ref());
    Ok(Json(FavoritesResponse {
        product_ids: favorites.list().await?,
    }))
}

/// Add the product to the favorites, or remove it when already there.
#[instrument(skip_all, fields(product_id = %request.product_id))]
pub async fn toggle(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Json(request): Json<ToggleRequest>,
) -> Result<Json<ToggleResponse>> {
    let favorites = open_favorites(&state, &session, user.as_ref());
    let favorite = favorites.toggle(request.product_id.clone()).await?;
    Ok(Json(ToggleResponse {
        product_id: request.product_id,
        favorite,
    }))
}

#[instrument(skip_all)]
pub async fn clear(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<FavoritesResponse>> {
    let favorites = open_favorites(&state, &session, user.as_ref());
    favorites.clear().await?;
    Ok(Json(FavoritesResponse {
        product_ids: Vec::new(),
    }))
}
