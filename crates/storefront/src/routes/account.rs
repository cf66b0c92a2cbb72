//! Account deletion.
//!
//! Authenticated with the identity provider's bearer access token rather
//! than the session, so a client holding only the token can delete.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tower_sessions::Session;
use tracing::{error, info, instrument, warn};

use crate::error::{clear_sentry_user, set_sentry_user};
use crate::middleware::{BearerToken, OptionalAuth, clear_current_user};
use crate::state::AppState;

fn failure(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Delete the account the bearer token belongs to.
#[instrument(skip_all)]
pub async fn delete(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(signed_in): OptionalAuth,
    BearerToken(token): BearerToken,
) -> Response {
    let user = match state.identity().user_for_token(&token).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return failure(StatusCode::UNAUTHORIZED, "Impossible de vérifier l'utilisateur.");
        }
        Err(err) => {
            warn!(error = %err, "Token verification failed");
            return failure(StatusCode::UNAUTHORIZED, "Impossible de vérifier l'utilisateur.");
        }
    };
    set_sentry_user(&user.id, user.email.as_deref());

    if let Err(err) = state.identity().delete_user(&user.id).await {
        let event_id = sentry::capture_error(&err);
        error!(error = %err, sentry_event_id = %event_id, "Failed to delete account");
        return failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Une erreur s'est produite lors de la suppression du compte.",
        );
    }
    info!(user_id = %user.id, "Account deleted");

    if signed_in.is_some_and(|current| current.id == user.id)
        && let Err(err) = clear_current_user(&session).await
    {
        warn!(error = %err, "Could not clear the session of a deleted account");
    }
    clear_sentry_user();

    Json(json!({ "success": true })).into_response()
}
