//! Session-related types.
//!
//! Types stored in the session for authentication state and the local-first
//! cart and favorites.

use std::fmt;

use serde::{Deserialize, Serialize};

use sneaco_core::UserId;

use crate::identity::IdentityUser;

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the signed-in customer.
/// The access token is kept so sign-out can revoke it upstream.
#[derive(Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Identity provider user id.
    pub id: UserId,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub access_token: String,
}

impl CurrentUser {
    #[must_use]
    pub fn new(user: IdentityUser, access_token: String) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            access_token,
        }
    }
}

impl fmt::Debug for CurrentUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentUser")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("access_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Who a mirrored remote cart belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CartOwner {
    User(UserId),
    /// Anonymous browsing session, identified by a random token.
    Anonymous(String),
}

impl CartOwner {
    /// Key of the remote cart record: `user:<id>` or `anon:<token>`.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::User(id) => format!("user:{id}"),
            Self::Anonymous(token) => format!("anon:{token}"),
        }
    }

    #[must_use]
    pub const fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::User(id) => Some(id),
            Self::Anonymous(_) => None,
        }
    }
}

/// Session keys.
pub mod keys {
    /// Key for storing the current signed-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the local cart lines.
    pub const CART: &str = "cart:v1";

    /// Key for the anonymous cart owner token, minted once per session.
    pub const CART_OWNER: &str = "cart_owner";

    /// Key for the payment session whose order last emptied the cart.
    pub const CART_CLEARED_FOR: &str = "cart_cleared_for";

    /// Key for the local favorite product ids.
    pub const FAVORITES: &str = "favorites:v1";
}
