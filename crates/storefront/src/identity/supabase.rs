//! Supabase Auth (`GoTrue`) REST client.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use sneaco_core::UserId;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{
    AuthSession, IdentityError, IdentityProvider, IdentityUser, SignUp, SignUpOutcome, UserUpdate,
};
use crate::config::SupabaseConfig;

/// Client for the Supabase Auth API.
#[derive(Clone)]
pub struct SupabaseAuthClient {
    inner: Arc<SupabaseAuthClientInner>,
}

struct SupabaseAuthClientInner {
    client: reqwest::Client,
    auth_base: String,
    anon_key: String,
    service_role_key: SecretString,
}

impl SupabaseAuthClient {
    /// Create a new Supabase Auth client.
    #[must_use]
    pub fn new(config: &SupabaseConfig) -> Self {
        Self {
            inner: Arc::new(SupabaseAuthClientInner {
                client: reqwest::Client::new(),
                auth_base: format!("{}/auth/v1", config.url),
                anon_key: config.anon_key.clone(),
                service_role_key: config.service_role_key.clone(),
            }),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, IdentityError> {
        Ok(Url::parse(&format!("{}/{path}", self.inner.auth_base))?)
    }

    fn public(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.inner
            .client
            .request(method, url)
            .header("apikey", &self.inner.anon_key)
    }

    /// Turn a non-success response into an `IdentityError`.
    async fn api_error(response: reqwest::Response) -> IdentityError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: GoTrueError = serde_json::from_str(&body).unwrap_or_default();
        classify_error(status, &parsed, &body)
    }
}

fn classify_error(status: StatusCode, error: &GoTrueError, body: &str) -> IdentityError {
    let code = error
        .error_code
        .as_deref()
        .or(error.error.as_deref())
        .unwrap_or_default();
    let message = error
        .msg
        .clone()
        .or_else(|| error.message.clone())
        .or_else(|| error.error_description.clone())
        .unwrap_or_else(|| body.chars().take(200).collect());

    match code {
        "invalid_credentials" | "invalid_grant" => IdentityError::InvalidCredentials,
        "user_already_exists" | "email_exists" => IdentityError::UserAlreadyExists,
        "weak_password" => IdentityError::WeakPassword(message),
        _ if message.contains("already registered") => IdentityError::UserAlreadyExists,
        _ => {
            warn!(status = status.as_u16(), message = %message, "Identity provider returned an error");
            IdentityError::Api {
                status: status.as_u16(),
                message,
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuthClient {
    #[instrument(skip_all)]
    async fn user_for_token(&self, access_token: &str) -> Result<Option<IdentityUser>, IdentityError> {
        let response = self
            .public(reqwest::Method::GET, self.endpoint("user")?)
            .bearer_auth(access_token)
            .send()
            .await?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            debug!("Access token rejected");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let user: GoTrueUser = serde_json::from_str(&response.text().await?)?;
        Ok(Some(user.into()))
    }

    #[instrument(skip(self), fields(user_id = %id))]
    async fn delete_user(&self, id: &UserId) -> Result<(), IdentityError> {
        let mut url = self.endpoint("admin/users")?;
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .push(id.as_str());

        let service_key = self.inner.service_role_key.expose_secret();
        let response = self
            .inner
            .client
            .delete(url)
            .header("apikey", service_key)
            .bearer_auth(service_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(())
    }

    #[instrument(skip(self, password))]
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthSession, IdentityError> {
        let mut url = self.endpoint("token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let response = self
            .public(reqwest::Method::POST, url)
            .json(&json!({ "email": email, "password": password.expose_secret() }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let session: GoTrueSession = serde_json::from_str(&response.text().await?)?;
        Ok(session.into())
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    async fn sign_up(&self, request: &SignUp) -> Result<SignUpOutcome, IdentityError> {
        let mut url = self.endpoint("signup")?;
        if let Some(redirect_to) = &request.redirect_to {
            url.query_pairs_mut().append_pair("redirect_to", redirect_to);
        }

        let response = self
            .public(reqwest::Method::POST, url)
            .json(&json!({
                "email": request.email,
                "password": request.password.expose_secret(),
                "data": {
                    "first_name": request.first_name,
                    "last_name": request.last_name,
                },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let body = response.text().await?;
        let value: serde_json::Value = serde_json::from_str(&body)?;
        if value.get("access_token").is_some() {
            let session: GoTrueSession = serde_json::from_value(value)?;
            Ok(SignUpOutcome::SignedIn(session.into()))
        } else {
            let user: GoTrueUser = serde_json::from_value(value)?;
            Ok(SignUpOutcome::ConfirmationRequired(user.into()))
        }
    }

    #[instrument(skip(self))]
    async fn send_password_reset(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), IdentityError> {
        let mut url = self.endpoint("recover")?;
        if let Some(redirect_to) = redirect_to {
            url.query_pairs_mut().append_pair("redirect_to", redirect_to);
        }

        let response = self
            .public(reqwest::Method::POST, url)
            .json(&json!({ "email": email }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(())
    }

    #[instrument(skip_all, fields(password_change = update.password.is_some()))]
    async fn update_user(
        &self,
        access_token: &str,
        update: &UserUpdate,
    ) -> Result<Option<IdentityUser>, IdentityError> {
        let response = self
            .public(reqwest::Method::PUT, self.endpoint("user")?)
            .bearer_auth(access_token)
            .json(&update_body(update))
            .send()
            .await?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            debug!("Access token rejected on update");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let user: GoTrueUser = serde_json::from_str(&response.text().await?)?;
        Ok(Some(user.into()))
    }

    #[instrument(skip_all)]
    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        let response = self
            .public(reqwest::Method::POST, self.endpoint("logout")?)
            .bearer_auth(access_token)
            .send()
            .await?;

        // An already-expired token is as signed out as it gets.
        if response.status().is_success() || response.status() == StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        Err(Self::api_error(response).await)
    }
}

/// `PUT /user` body. Profile names travel in `data` (user metadata).
fn update_body(update: &UserUpdate) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    if let Some(email) = &update.email {
        body.insert("email".to_owned(), json!(email));
    }
    if let Some(password) = &update.password {
        body.insert("password".to_owned(), json!(password.expose_secret()));
    }

    let mut data = serde_json::Map::new();
    if let Some(first_name) = &update.first_name {
        data.insert("first_name".to_owned(), json!(first_name));
    }
    if let Some(last_name) = &update.last_name {
        data.insert("last_name".to_owned(), json!(last_name));
    }
    if !data.is_empty() {
        body.insert("data".to_owned(), serde_json::Value::Object(data));
    }
    serde_json::Value::Object(body)
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct GoTrueError {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoTrueSession {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    user: GoTrueUser,
}

impl From<GoTrueUser> for IdentityUser {
    fn from(user: GoTrueUser) -> Self {
        Self {
            id: UserId::new(user.id),
            email: user.email,
            first_name: user.user_metadata.first_name,
            last_name: user.user_metadata.last_name,
        }
    }
}

impl From<GoTrueSession> for AuthSession {
    fn from(session: GoTrueSession) -> Self {
        Self {
            access_token: SecretString::from(session.access_token),
            refresh_token: session.refresh_token.map(SecretString::from),
            expires_in: session.expires_in,
            user: session.user.into(),
        }
    }
}
