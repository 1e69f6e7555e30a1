//! Sign-in, sign-up, sign-out and guest mode.
//!
//! [`AuthProvider`] is the identity collaborator (a GoTrue-compatible REST
//! service in production, fakes in tests). [`AuthStore`] drives it and keeps
//! the shared [`SessionContext`](crate::session::SessionContext) current,
//! migrating guest data when an account appears.

mod rest;
mod store;

pub use rest::{RestAuthProvider, AUTH_SESSION_KEY};
pub use store::{AuthOutcome, AuthStore, AUTH_STATE_KEY};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::session::User;

/// Credentials issued by the provider for a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSession {
    pub user: User,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ProviderSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    SignedIn(ProviderSession),
    /// Account created; the user must confirm their email first.
    NeedsVerification { user: Option<User> },
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The session left over from an earlier run, if still usable.
    async fn current_session(&self) -> Result<Option<ProviderSession>, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderSession, AuthError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<SignUpOutcome, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Send a password reset email.
    async fn reset_password(&self, email: &str) -> Result<(), AuthError>;
}
