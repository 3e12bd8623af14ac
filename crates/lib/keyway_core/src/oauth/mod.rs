//! Delegated (OAuth2 authorization-code) login.
//!
//! - [`store`]: single-use, TTL-bounded storage for anti-forgery state.
//! - [`github`]: the identity-provider seam and its GitHub implementation.
//! - [`handshake`]: the per-attempt state machine tying the two together.

pub mod github;
pub mod handshake;
pub mod store;

use std::time::Duration;

use thiserror::Error;

pub use github::{GitHubConfig, GitHubProvider, IdentityProvider};
pub use handshake::{ClientMeta, CompletedHandshake, HandshakeManager, HandshakeRecord, HandshakeStart};
pub use store::{HandshakeStore, MemoryHandshakeStore, PgHandshakeStore};

/// How long a started handshake stays redeemable: 10 minutes.
pub const HANDSHAKE_TTL: Duration = Duration::from_secs(600);

/// Timeout for outbound calls to the identity provider.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Handshake store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Handshake not found")]
    NotFound,

    #[error("Handshake store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Identity provider errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("Profile fetch failed: {0}")]
    Profile(String),
}

/// Terminal rejections and failures of a delegated-login attempt.
///
/// Everything except `StoreUnavailable` and `Internal` is an authentication
/// failure and must be reported to the client generically.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Callback carried no handshake id")]
    MissingHandshake,

    #[error("Callback carried no authorization code")]
    MissingCode,

    #[error("Handshake expired or already consumed")]
    HandshakeExpired,

    #[error("State mismatch")]
    StateMismatch,

    #[error("Provider exchange failed: {0}")]
    ExchangeFailed(#[from] ProviderError),

    #[error("Handshake store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HandshakeError {
    /// Whether this is an authentication failure rather than an infrastructure fault.
    pub fn is_auth_failure(&self) -> bool {
        !matches!(
            self,
            HandshakeError::StoreUnavailable(_) | HandshakeError::Internal(_)
        )
    }
}

impl From<StoreError> for HandshakeError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => HandshakeError::HandshakeExpired,
            StoreError::Unavailable(msg) => HandshakeError::StoreUnavailable(msg),
        }
    }
}
