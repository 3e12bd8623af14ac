//! JWT token issuance and validation.
//!
//! Tokens are HS256-signed and carry the subject user ID and username. The
//! header algorithm is checked before the signature, and the validity window
//! is checked only after the signature verifies.

use std::path::PathBuf;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::{info, warn};

use super::{AuthError, TokenError};
use crate::models::auth::TokenClaims;

/// Signing algorithm accepted by this service.
pub const TOKEN_ALGORITHM: Algorithm = Algorithm::HS256;

/// Issuer tag embedded in every token.
pub const TOKEN_ISSUER: &str = "keyway";

/// Default token lifetime: 24 hours.
pub const DEFAULT_TOKEN_VALIDITY_SECS: i64 = 24 * 60 * 60;

/// Issue a signed token for `user_id` valid for `validity` from now.
pub fn issue_token(
    user_id: i64,
    username: &str,
    secret: &[u8],
    validity: Duration,
) -> Result<String, AuthError> {
    issue_token_at(user_id, username, secret, validity, Utc::now().timestamp())
}

/// Issue a signed token as if the current time were `now` (unix seconds).
pub fn issue_token_at(
    user_id: i64,
    username: &str,
    secret: &[u8],
    validity: Duration,
    now: i64,
) -> Result<String, AuthError> {
    if validity <= Duration::zero() {
        return Err(AuthError::Signing("token validity must be positive".into()));
    }
    let claims = TokenClaims {
        sub: user_id.to_string(),
        username: username.to_string(),
        iss: TOKEN_ISSUER.to_string(),
        iat: now,
        nbf: now,
        exp: now + validity.num_seconds(),
    };
    encode(
        &Header::new(TOKEN_ALGORITHM),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::Signing(format!("jwt encode: {e}")))
}

/// Validate a token, returning its claims on success.
pub fn validate_token(token: &str, secret: &[u8]) -> Result<TokenClaims, TokenError> {
    validate_token_at(token, secret, Utc::now().timestamp())
}

/// Validate a token against the clock value `now` (unix seconds).
///
/// The token is accepted for `nbf <= now < exp`.
pub fn validate_token_at(token: &str, secret: &[u8], now: i64) -> Result<TokenClaims, TokenError> {
    let header = decode_header(token).map_err(|_| TokenError::Malformed)?;
    if header.alg != TOKEN_ALGORITHM {
        return Err(TokenError::UnsupportedAlgorithm);
    }

    let mut validation = Validation::new(TOKEN_ALGORITHM);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.leeway = 0;
    validation.set_issuer(&[TOKEN_ISSUER]);
    validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);

    let claims = decode::<TokenClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => TokenError::SignatureMismatch,
            ErrorKind::InvalidAlgorithm => TokenError::UnsupportedAlgorithm,
            ErrorKind::InvalidIssuer => TokenError::IssuerMismatch,
            _ => TokenError::Malformed,
        })?;

    if now < claims.nbf {
        return Err(TokenError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenError::Expired);
    }
    Ok(claims)
}

/// Resolve the JWT secret: env var `JWT_SECRET` → `AUTH_SECRET` → persisted file.
pub fn resolve_jwt_secret() -> String {
    if let Ok(secret) = std::env::var("JWT_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    if let Ok(secret) = std::env::var("AUTH_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    let secret_path = jwt_secret_path();
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        warn!(path = %parent.display(), error = %e, "cannot create JWT secret directory");
    }
    match std::fs::write(&secret_path, &secret) {
        Ok(()) => info!(path = %secret_path.display(), "generated new JWT secret"),
        // Tokens stay valid until restart; a new secret is generated next time.
        Err(e) => warn!(path = %secret_path.display(), error = %e, "cannot persist JWT secret"),
    }
    secret
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("keyway")
        .join("jwt-secret")
}
