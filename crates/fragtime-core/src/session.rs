//! Who is using the app right now.
//!
//! A [`SessionContext`] is a cheap, cloneable handle onto the current
//! [`Session`]. The auth store writes it; adapters and services read a
//! snapshot per call. The lock is never held across an await point.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// User id reported for guest sessions.
pub const GUEST_USER_ID: &str = "guest";
pub const GUEST_DISPLAY_NAME: &str = "Guest";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Display name from the user's metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        match self.email.as_deref().and_then(|e| e.split('@').next()) {
            Some(local) if !local.is_empty() => local.to_string(),
            _ => self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default)]
    pub guest_mode: bool,
}

impl Session {
    pub fn guest() -> Self {
        Self {
            user: None,
            access_token: None,
            guest_mode: true,
        }
    }

    pub fn signed_in(user: User, access_token: impl Into<String>) -> Self {
        Self {
            user: Some(user),
            access_token: Some(access_token.into()),
            guest_mode: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() || self.guest_mode
    }

    /// `"guest"` in guest mode, otherwise the signed-in user's id.
    pub fn user_id(&self) -> Option<&str> {
        if self.guest_mode {
            Some(GUEST_USER_ID)
        } else {
            self.user.as_ref().map(|u| u.id.as_str())
        }
    }

    /// The signed-in user's id; `None` for guests.
    pub fn registered_user_id(&self) -> Option<&str> {
        if self.guest_mode {
            None
        } else {
            self.user.as_ref().map(|u| u.id.as_str())
        }
    }

    pub fn display_name(&self) -> Option<String> {
        if self.guest_mode {
            return Some(GUEST_DISPLAY_NAME.to_string());
        }
        self.user.as_ref().map(User::display_name)
    }
}

/// Shared handle onto the current [`Session`].
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    inner: Arc<RwLock<Session>>,
}

impl SessionContext {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(RwLock::new(session)),
        }
    }

    pub fn snapshot(&self) -> Session {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set(&self, session: Session) {
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = session;
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub fn is_guest(&self) -> bool {
        self.snapshot().guest_mode
    }

    pub fn access_token(&self) -> Option<String> {
        self.snapshot().access_token
    }
}
