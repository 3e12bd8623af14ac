//! Authentication domain models.
//!
//! These are internal domain models, distinct from the request/response
//! bodies of the HTTP API.

use serde::{Deserialize, Serialize};

/// JWT claims embedded in identity tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject — user ID (standard JWT `sub` claim, decimal string).
    pub sub: String,
    /// Subject username.
    pub username: String,
    /// Issuer tag.
    pub iss: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Not before (unix timestamp).
    pub nbf: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

impl TokenClaims {
    /// Numeric user ID carried in `sub`, if it parses.
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

/// Identity asserted by a delegated identity provider after a successful
/// authorization-code exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    /// Provider-assigned numeric account ID.
    pub id: i64,
    /// Provider login name.
    pub login: String,
    /// Primary email, empty when the provider exposes none.
    #[serde(default)]
    pub email: String,
    /// Avatar URL, empty when absent.
    #[serde(default)]
    pub avatar_url: String,
}
