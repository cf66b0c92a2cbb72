//! Identity provider integration.
//!
//! Sneaco has no credential store of its own: sign-in, sign-up, password
//! resets and account deletion all go through the identity provider. The
//! storefront only keeps the resulting user id and access token in the
//! session.

mod supabase;

pub use supabase::SupabaseAuthClient;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use sneaco_core::UserId;
use thiserror::Error;

/// Errors that can occur when talking to the identity provider.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Wrong email or password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An account already exists for this email.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password rejected by the provider's policy.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// The provider rejected the request.
    #[error("identity API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body could not be parsed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Endpoint URL could not be built.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// A user as known to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityUser {
    pub id: UserId,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Tokens issued on sign-in.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_in: Option<u64>,
    pub user: IdentityUser,
}

/// Details for a new account.
#[derive(Debug, Clone)]
pub struct SignUp {
    pub email: String,
    pub password: SecretString,
    pub first_name: String,
    pub last_name: String,
    /// Where the confirmation email links back to.
    pub redirect_to: Option<String>,
}

/// Result of a sign-up.
#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    /// Signed in straight away.
    SignedIn(AuthSession),
    /// Account created; the customer must confirm their email first.
    ConfirmationRequired(IdentityUser),
}

/// Changes to the signed-in user's own account. `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub password: Option<SecretString>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserUpdate {
    /// A password change only, as sent from a recovery link.
    #[must_use]
    pub fn password(password: SecretString) -> Self {
        Self {
            password: Some(password),
            ..Self::default()
        }
    }
}

/// The identity provider's narrow contract.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve an access token to its user. Invalid or expired tokens are `Ok(None)`.
    async fn user_for_token(&self, access_token: &str) -> Result<Option<IdentityUser>, IdentityError>;

    /// Permanently delete a user (privileged).
    async fn delete_user(&self, id: &UserId) -> Result<(), IdentityError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthSession, IdentityError>;

    async fn sign_up(&self, request: &SignUp) -> Result<SignUpOutcome, IdentityError>;

    /// Send a password reset email. `redirect_to` is the page the link opens.
    async fn send_password_reset(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), IdentityError>;

    /// Update the account behind an access token: profile fields, email or
    /// password. A rejected token is `Ok(None)`.
    async fn update_user(
        &self,
        access_token: &str,
        update: &UserUpdate,
    ) -> Result<Option<IdentityUser>, IdentityError>;

    /// Revoke the session behind an access token.
    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError>;
}
