//! Session-held models for the storefront.

pub mod session;

pub use session::{CartOwner, CurrentUser, keys as session_keys};
