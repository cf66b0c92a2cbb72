//! Authentication route handlers.
//!
//! Thin JSON wrappers over the identity provider. A successful sign-in
//! stores the user in the session; the local cart and favorites survive it.
//! When they are empty, the customer's mirrored cart and favorites are
//! adopted, once, at that moment.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sneaco_core::{Email, UserId};
use tower_sessions::Session;
use tracing::{info, instrument, warn};

use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::identity::{SignUp, SignUpOutcome, UserUpdate};
use crate::middleware::{
    OptionalAuth, RequireAuth, clear_current_user, refresh_current_user, set_current_user,
};
use crate::models::CurrentUser;
use crate::services::StorageError;

use super::cart::open_cart;
use super::favorites::open_favorites;
use crate::state::AppState;

/// Login request body.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Registration request body.
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Password reset request body.
#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Profile change request body. Absent or blank fields are left unchanged.
#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// New password sent from the recovery link.
#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    /// Access token carried by the recovery link.
    pub access_token: String,
    pub password: String,
    pub confirm_password: String,
}

/// Shortest password accepted before asking the provider.
const MIN_PASSWORD_LEN: usize = 6;

/// The signed-in user as shown to the client.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl From<&CurrentUser> for UserResponse {
    fn from(user: &CurrentUser) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: UserResponse,
    /// The account must be confirmed by email before signing in.
    pub confirmation_required: bool,
}

fn valid_email(raw: &str) -> Result<Email> {
    Email::parse(raw.trim()).map_err(|_| AppError::BadRequest("Adresse e-mail invalide.".to_string()))
}

fn valid_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(
            "Le mot de passe doit comporter au moins 6 caractères.".to_string(),
        ));
    }
    Ok(())
}

async fn sign_in_session(state: &AppState, session: &Session, user: &CurrentUser) -> Result<()> {
    set_current_user(session, user)
        .await
        .map_err(StorageError::from)?;
    set_sentry_user(&user.id, user.email.as_deref());

    let cart = open_cart(state, session, Some(user)).await?;
    let favorites = open_favorites(state, session, Some(user));
    let (cart_adopted, favorites_adopted) = tokio::join!(cart.adopt_mirror(), favorites.adopt_mirror());
    if cart_adopted || favorites_adopted {
        info!(user_id = %user.id, cart_adopted, favorites_adopted, "Adopted mirrored state");
    }
    Ok(())
}

/// Sign in with email and password.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<LoginRequest>,
) -> Result<Json<UserResponse>> {
    let email = valid_email(&request.email)?;
    let auth = state
        .identity()
        .sign_in_with_password(email.as_str(), &SecretString::from(request.password))
        .await?;

    let user = CurrentUser::new(auth.user, auth.access_token.expose_secret().to_string());
    sign_in_session(&state, &session, &user).await?;
    info!(user_id = %user.id, "User signed in");

    Ok(Json(UserResponse::from(&user)))
}

/// Create an account. Signs in right away unless the provider requires
/// email confirmation first.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<RegisterRequest>,
) -> Result<Response> {
    let email = valid_email(&request.email)?;
    if request.password.is_empty() {
        return Err(AppError::BadRequest("Mot de passe requis.".to_string()));
    }

    let sign_up = SignUp {
        email: email.into_inner(),
        password: SecretString::from(request.password),
        first_name: request.first_name.trim().to_string(),
        last_name: request.last_name.trim().to_string(),
        redirect_to: Some(format!("{}/login", state.config().base_url)),
    };

    let response = match state.identity().sign_up(&sign_up).await? {
        SignUpOutcome::SignedIn(auth) => {
            let user = CurrentUser::new(auth.user, auth.access_token.expose_secret().to_string());
            sign_in_session(&state, &session, &user).await?;
            RegisterResponse {
                user: UserResponse::from(&user),
                confirmation_required: false,
            }
        }
        SignUpOutcome::ConfirmationRequired(pending) => RegisterResponse {
            user: UserResponse {
                id: pending.id,
                email: pending.email,
                first_name: pending.first_name,
                last_name: pending.last_name,
            },
            confirmation_required: true,
        },
    };
    info!(user_id = %response.user.id, "Account created");

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Sign out locally and revoke the token upstream (best effort).
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<serde_json::Value>> {
    if let Some(user) = user
        && let Err(error) = state.identity().sign_out(&user.access_token).await
    {
        warn!(%error, "Upstream sign-out failed");
    }

    clear_current_user(&session)
        .await
        .map_err(StorageError::from)?;
    clear_sentry_user();

    Ok(Json(json!({ "success": true })))
}

/// Send a password reset email.
///
/// Answers success whether or not the address is registered or valid.
#[instrument(skip_all)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Json<serde_json::Value> {
    let Ok(email) = valid_email(&request.email) else {
        return Json(json!({ "success": true }));
    };
    let redirect_to = format!("{}/reset-password", state.config().base_url);

    if let Err(error) = state
        .identity()
        .send_password_reset(email.as_str(), Some(&redirect_to))
        .await
    {
        warn!(%error, "Password reset request failed");
    }

    Json(json!({ "success": true }))
}

/// The signed-in user.
pub async fn me(RequireAuth(user): RequireAuth) -> Json<UserResponse> {
    Json(UserResponse::from(&user))
}

/// Blank strings mean "leave unchanged".
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Update the signed-in user's names, email or password.
#[instrument(skip_all)]
pub async fn update_me(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>> {
    let email = match non_blank(request.email) {
        Some(raw) if Some(raw.as_str()) != user.email.as_deref() => Some(valid_email(&raw)?.into_inner()),
        _ => None,
    };
    let password = match request.password.filter(|p| !p.is_empty()) {
        Some(password) => {
            valid_password(&password)?;
            Some(SecretString::from(password))
        }
        None => None,
    };

    let update = UserUpdate {
        email,
        password,
        first_name: request.first_name.map(|v| v.trim().to_string()),
        last_name: request.last_name.map(|v| v.trim().to_string()),
    };
    let updated = state
        .identity()
        .update_user(&user.access_token, &update)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Session expirée, reconnectez-vous.".to_string()))?;

    let refreshed = CurrentUser::new(updated, user.access_token);
    refresh_current_user(&session, &refreshed)
        .await
        .map_err(StorageError::from)?;
    info!(user_id = %refreshed.id, "Profile updated");

    Ok(Json(UserResponse::from(&refreshed)))
}

/// Set a new password from a recovery link. Does not sign in.
#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<serde_json::Value>> {
    let token = request.access_token.trim();
    if token.is_empty() {
        return Err(AppError::Unauthorized(
            "Lien de réinitialisation invalide.".to_string(),
        ));
    }
    valid_password(&request.password)?;
    if request.password != request.confirm_password {
        return Err(AppError::BadRequest(
            "Les mots de passe ne correspondent pas.".to_string(),
        ));
    }

    let user = state
        .identity()
        .update_user(token, &UserUpdate::password(SecretString::from(request.password)))
        .await?
        .ok_or_else(|| AppError::Unauthorized("Lien invalide ou expiré.".to_string()))?;
    info!(user_id = %user.id, "Password reset");

    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email_trims_and_rejects() {
        assert!(valid_email(" client@sneaco.fr ").is_ok());
        assert!(matches!(valid_email("not-an-email"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_password_length_is_checked_in_characters() {
        assert!(valid_password("éééééé").is_ok());
        assert!(matches!(valid_password("12345"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_blank_profile_fields_are_dropped() {
        assert_eq!(non_blank(Some("  ".to_string())), None);
        assert_eq!(non_blank(Some(" a@b.fr ".to_string())).as_deref(), Some("a@b.fr"));
        assert_eq!(non_blank(None), None);
    }

    #[test]
    fn test_user_response_hides_token() {
        let user = CurrentUser {
            id: UserId::new("u-1"),
            email: Some("client@sneaco.fr".to_string()),
            first_name: Some("Ana".to_string()),
            last_name: Some("Diaz".to_string()),
            access_token: "secret-token".to_string(),
        };
        let json = serde_json::to_string(&UserResponse::from(&user)).unwrap_or_default();
        assert!(json.contains("\"id\":\"u-1\""));
        assert!(!json.contains("secret-token"));
    }
}
