//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request span)
//! 3. Request ID (recorded on the span, echoed in the response)
//! 4. Session layer (tower-sessions with `PostgreSQL` store)
//! 5. Rate limiting (governor) on auth and payment-session routes

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod session;

pub use auth::{
    BearerToken, OptionalAuth, RequireAuth, clear_current_user, refresh_current_user, set_current_user,
};
pub use rate_limit::{auth_rate_limiter, checkout_rate_limiter};
pub use request_id::{request_id_middleware, request_span};
pub use session::{SESSION_COOKIE_NAME, create_session_layer, session_layer};
