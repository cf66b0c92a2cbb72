//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::db::{PgCartMirror, PgCatalog, PgFavoritesMirror, PgOrderStore};
use crate::identity::{IdentityProvider, SupabaseAuthClient};
use crate::payments::{PaymentProvider, StripeClient};
use crate::services::cart::CartMirror;
use crate::services::catalog::CatalogSource;
use crate::services::favorites::FavoritesMirror;
use crate::services::orders::OrderStore;

/// The collaborators behind the storefront.
///
/// Production wiring is [`Backends::production`]; tests substitute fakes.
#[derive(Clone)]
pub struct Backends {
    pub catalog: Arc<dyn CatalogSource>,
    pub carts: Arc<dyn CartMirror>,
    pub favorites: Arc<dyn FavoritesMirror>,
    pub orders: Arc<dyn OrderStore>,
    pub payments: Arc<dyn PaymentProvider>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl Backends {
    /// Postgres repositories, Stripe and Supabase Auth.
    #[must_use]
    pub fn production(config: &StorefrontConfig, pool: &PgPool) -> Self {
        Self {
            catalog: Arc::new(PgCatalog::new(pool.clone())),
            carts: Arc::new(PgCartMirror::new(pool.clone())),
            favorites: Arc::new(PgFavoritesMirror::new(pool.clone())),
            orders: Arc::new(PgOrderStore::new(pool.clone())),
            payments: Arc::new(StripeClient::new(&config.stripe)),
            identity: Arc::new(SupabaseAuthClient::new(&config.supabase)),
        }
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    backends: Backends,
}

impl AppState {
    /// Create the production application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `pool` - `PostgreSQL` connection pool
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Self {
        let backends = Backends::production(&config, &pool);
        Self::from_parts(config, pool, backends)
    }

    /// Create the state from explicit collaborators.
    #[must_use]
    pub fn from_parts(config: StorefrontConfig, pool: PgPool, backends: Backends) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                backends,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<dyn CatalogSource> {
        &self.inner.backends.catalog
    }

    #[must_use]
    pub fn carts(&self) -> &Arc<dyn CartMirror> {
        &self.inner.backends.carts
    }

    #[must_use]
    pub fn favorites(&self) -> &Arc<dyn FavoritesMirror> {
        &self.inner.backends.favorites
    }

    #[must_use]
    pub fn orders(&self) -> &dyn OrderStore {
        self.inner.backends.orders.as_ref()
    }

    #[must_use]
    pub fn payments(&self) -> &dyn PaymentProvider {
        self.inner.backends.payments.as_ref()
    }

    #[must_use]
    pub fn identity(&self) -> &dyn IdentityProvider {
        self.inner.backends.identity.as_ref()
    }
}
