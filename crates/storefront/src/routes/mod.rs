//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                   - Liveness
//! GET    /health/ready             - Readiness (database)
//!
//! # Catalog (JSON)
//! GET    /products                 - Listing, filters, pagination
//! GET    /products/{id}            - Product with variant resolution (?size=&color=)
//!
//! # Cart (JSON, HX-Trigger on mutations)
//! GET    /cart                     - Detailed cart
//! POST   /cart/add                 - Add units of a variant
//! POST   /cart/update              - Set a line's quantity
//! POST   /cart/remove              - Remove a line
//! POST   /cart/clear               - Empty the cart
//! GET    /cart/count               - Units in the cart
//!
//! # Checkout (HTML)
//! GET    /checkout                 - Checkout form
//! POST   /checkout                 - Submit, redirect to the payment page
//! GET    /order-success            - Record the order and confirm it
//!
//! # API
//! POST   /api/checkout-session     - Create a payment session
//! GET    /api/orders               - Order history (requires auth)
//! DELETE /api/account              - Delete account (bearer token)
//! GET    /api/favorites            - Favorite product ids
//! POST   /api/favorites/toggle     - Toggle a favorite
//! DELETE /api/favorites            - Clear favorites
//! POST   /api/auth/login           - Sign in
//! POST   /api/auth/register        - Create an account
//! POST   /api/auth/logout          - Sign out
//! POST   /api/auth/forgot-password - Send a password reset email
//! POST   /api/auth/reset-password  - Set a new password from a recovery link
//! GET    /api/auth/me              - The signed-in user (requires auth)
//! PATCH  /api/auth/me              - Update names, email or password (requires auth)
//! ```

pub mod account;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod favorites;
pub mod orders;
pub mod products;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::middleware::{auth_rate_limiter, checkout_rate_limiter};
use crate::state::AppState;

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{id}", get(products::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/clear", post(cart::clear))
        .route("/count", get(cart::count))
}

/// Create the auth API routes router, rate limited per client IP.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/logout", post(auth::logout))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .route("/me", get(auth::me).patch(auth::update_me))
        .layer(auth_rate_limiter())
}

/// Create the payment-session route, rate limited per client IP.
pub fn checkout_session_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout-session", post(checkout::create_session))
        .layer(checkout_rate_limiter())
}

/// Create the JSON API routes router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(checkout_session_routes())
        .route("/orders", get(orders::history))
        .route("/account", delete(account::delete))
        .route("/favorites", get(favorites::list).delete(favorites::clear))
        .route("/favorites/toggle", post(favorites::toggle))
        .nest("/auth", auth_routes())
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .route("/checkout", get(checkout::show).post(checkout::submit))
        .route("/order-success", get(orders::success))
        .nest("/api", api_routes())
}
