//! Credential and token primitives.
//!
//! Provides password hashing and JWT issuance/validation shared by the
//! local login path and the delegated (OAuth2) login path.

pub mod jwt;
pub mod password;

use thiserror::Error;

/// Errors raised while producing credentials or tokens.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Password must not be empty")]
    EmptyPassword,

    #[error("Hashing failed: {0}")]
    Hashing(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}

/// Reasons a presented token is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Unsupported signing algorithm")]
    UnsupportedAlgorithm,

    #[error("Signature mismatch")]
    SignatureMismatch,

    #[error("Token expired")]
    Expired,

    #[error("Token not yet valid")]
    NotYetValid,

    #[error("Unexpected token issuer")]
    IssuerMismatch,
}
