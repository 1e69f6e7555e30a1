//! GoTrue-compatible auth over HTTP.
//!
//! The issued session is persisted in the key-value store so later runs can
//! pick it up; an expired session is refreshed with its refresh token.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Response;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use super::{AuthProvider, ProviderSession, SignUpOutcome};
use crate::error::{AuthError, ConfigError};
use crate::session::User;
use crate::storage::{BackendConfig, KeyValueStore};

pub const AUTH_SESSION_KEY: &str = "auth_session";

pub struct RestAuthProvider {
    client: reqwest::Client,
    base: Url,
    anon_key: String,
    store: Arc<dyn KeyValueStore>,
}

#[derive(Debug, Deserialize)]
struct UserBody {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<serde_json::Value>,
}

impl From<UserBody> for User {
    fn from(body: UserBody) -> Self {
        let name = body
            .user_metadata
            .as_ref()
            .and_then(|m| m.get("name"))
            .and_then(|n| n.as_str())
            .map(str::to_owned);
        User {
            id: body.id,
            email: body.email,
            name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: UserBody,
}

impl From<TokenBody> for ProviderSession {
    fn from(body: TokenBody) -> Self {
        ProviderSession {
            user: body.user.into(),
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_at: body.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }
}

/// Sign-up answers with a session when confirmation is off, otherwise with
/// the bare user.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpBody {
    Session(TokenBody),
    User(UserBody),
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl RestAuthProvider {
    pub fn new(
        base_url: &str,
        anon_key: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, ConfigError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let base = Url::parse(&format!("{trimmed}/")).map_err(|e| ConfigError::InvalidValue {
            key: "backend.url".into(),
            message: e.to_string(),
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            base,
            anon_key: anon_key.into(),
            store,
        })
    }

    pub fn from_config(
        config: &BackendConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, ConfigError> {
        if !config.is_configured() {
            return Err(ConfigError::BackendNotConfigured);
        }
        Self::new(&config.url, config.anon_key.clone(), store)
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        self.base
            .join(path)
            .map_err(|e| AuthError::Request(format!("invalid endpoint {path}: {e}")))
    }

    fn post(&self, url: Url) -> reqwest::RequestBuilder {
        self.client.post(url).header("apikey", &self.anon_key)
    }

    fn stored_session(&self) -> Option<ProviderSession> {
        let raw = match self.store.get(AUTH_SESSION_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "failed to read stored auth session");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "stored auth session is corrupt, discarding");
                self.forget();
                None
            }
        }
    }

    fn remember(&self, session: &ProviderSession) -> Result<(), AuthError> {
        let json = serde_json::to_string(session)
            .map_err(|e| AuthError::Request(format!("encode session: {e}")))?;
        self.store
            .set(AUTH_SESSION_KEY, &json)
            .map_err(|e| AuthError::Request(format!("store session: {e}")))
    }

    fn forget(&self) {
        if let Err(e) = self.store.remove(AUTH_SESSION_KEY) {
            warn!(error = %e, "failed to remove stored auth session");
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<ProviderSession, AuthError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "refresh_token");
        let response = self
            .post(url)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(request_error)?;
        let body: TokenBody = parse(response, AuthError::SignInFailed).await?;
        let session = ProviderSession::from(body);
        self.remember(&session)?;
        Ok(session)
    }
}

fn request_error(err: reqwest::Error) -> AuthError {
    AuthError::Request(err.to_string())
}

/// Decode a success body, or map an error body through `fail`.
async fn parse<T: serde::de::DeserializeOwned>(
    response: Response,
    fail: fn(String) -> AuthError,
) -> Result<T, AuthError> {
    let status = response.status();
    let text = response.text().await.map_err(request_error)?;
    if !status.is_success() {
        let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
        let message = body
            .error_description
            .or(body.msg)
            .or(body.message)
            .or(body.error)
            .unwrap_or_else(|| format!("HTTP {status}"));
        return Err(fail(message));
    }
    serde_json::from_str(&text).map_err(|e| AuthError::Request(format!("invalid response: {e}")))
}

#[async_trait]
impl AuthProvider for RestAuthProvider {
    async fn current_session(&self) -> Result<Option<ProviderSession>, AuthError> {
        let Some(session) = self.stored_session() else {
            return Ok(None);
        };
        if !session.is_expired_at(Utc::now()) {
            return Ok(Some(session));
        }
        let Some(refresh_token) = session.refresh_token.as_deref() else {
            debug!("stored session expired without refresh token");
            self.forget();
            return Ok(None);
        };
        match self.refresh(refresh_token).await {
            Ok(session) => Ok(Some(session)),
            Err(AuthError::Request(e)) => Err(AuthError::Request(e)),
            Err(e) => {
                warn!(error = %e, "session refresh rejected");
                self.forget();
                Ok(None)
            }
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderSession, AuthError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        let response = self
            .post(url)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(request_error)?;
        let body: TokenBody = parse(response, AuthError::SignInFailed).await?;
        let session = ProviderSession::from(body);
        self.remember(&session)?;
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<SignUpOutcome, AuthError> {
        let name = name
            .map(str::to_owned)
            .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string());
        let response = self
            .post(self.endpoint("auth/v1/signup")?)
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "name": name },
            }))
            .send()
            .await
            .map_err(request_error)?;
        match parse::<SignUpBody>(response, AuthError::SignUpFailed).await? {
            SignUpBody::Session(body) => {
                let session = ProviderSession::from(body);
                self.remember(&session)?;
                Ok(SignUpOutcome::SignedIn(session))
            }
            SignUpBody::User(user) => Ok(SignUpOutcome::NeedsVerification {
                user: Some(user.into()),
            }),
        }
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let Some(session) = self.stored_session() else {
            return Ok(());
        };
        let response = self
            .post(self.endpoint("auth/v1/logout")?)
            .bearer_auth(&session.access_token)
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        // An already-invalid token means the server side is signed out too.
        if status.is_success() || status == reqwest::StatusCode::UNAUTHORIZED {
            self.forget();
            return Ok(());
        }
        parse::<serde_json::Value>(response, AuthError::SignOutFailed)
            .await
            .map(|_| ())
    }

    async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        let response = self
            .post(self.endpoint("auth/v1/recover")?)
            .json(&json!({ "email": email }))
            .send()
            .await
            .map_err(request_error)?;
        parse::<serde_json::Value>(response, AuthError::Request)
            .await
            .map(|_| ())
    }
}
