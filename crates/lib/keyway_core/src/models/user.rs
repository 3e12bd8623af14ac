//! User domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an account authenticates — matches the `users.auth_kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    /// Username/password account.
    Local,
    /// Account asserted by a delegated identity provider.
    Delegated,
}

impl AuthKind {
    /// Database text representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthKind::Local => "local",
            AuthKind::Delegated => "delegated",
        }
    }

    /// Parse from the database text representation.
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "local" => Some(AuthKind::Local),
            "delegated" => Some(AuthKind::Delegated),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuthKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted user record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// bcrypt hash; `None` for delegated-only accounts.
    pub password_hash: Option<String>,
    pub email: Option<String>,
    /// Identity-provider account ID once linked.
    pub external_id: Option<i64>,
    pub avatar_url: Option<String>,
    pub auth_kind: AuthKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user about to be created; the repository assigns `id` and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub password_hash: Option<String>,
    pub email: Option<String>,
    pub external_id: Option<i64>,
    pub avatar_url: Option<String>,
    pub auth_kind: AuthKind,
}

impl NewUser {
    /// A local account with an already-computed password hash.
    pub fn local(username: &str, password_hash: String, email: Option<&str>) -> Self {
        Self {
            username: username.to_string(),
            password_hash: Some(password_hash),
            email: email.map(str::to_string),
            external_id: None,
            avatar_url: None,
            auth_kind: AuthKind::Local,
        }
    }

    /// A delegated account with no password hash.
    pub fn delegated(
        username: &str,
        external_id: i64,
        email: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Self {
        Self {
            username: username.to_string(),
            password_hash: None,
            email: email.map(str::to_string),
            external_id: Some(external_id),
            avatar_url: avatar_url.map(str::to_string),
            auth_kind: AuthKind::Delegated,
        }
    }

    /// A local account must carry a non-empty password hash.
    pub fn has_valid_credentials(&self) -> bool {
        match self.auth_kind {
            AuthKind::Local => self.password_hash.as_deref().is_some_and(|h| !h.is_empty()),
            AuthKind::Delegated => true,
        }
    }
}
