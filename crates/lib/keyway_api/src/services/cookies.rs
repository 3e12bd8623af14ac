//! Cookie service — the httpOnly cookie carrying the OAuth handshake id.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

/// Cookie name for the pending handshake id.
pub const HANDSHAKE_COOKIE: &str = "oauth_session";

/// Build the handshake cookie; it lives exactly as long as the handshake.
pub fn handshake_cookie(
    handshake_id: &str,
    secure: bool,
    ttl: std::time::Duration,
) -> Cookie<'static> {
    Cookie::build((HANDSHAKE_COOKIE.to_string(), handshake_id.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(Duration::seconds(ttl.as_secs() as i64))
        .build()
}

/// Build an expired cookie to clear the handshake id.
pub fn clear_handshake_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((HANDSHAKE_COOKIE.to_string(), String::new()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(Duration::ZERO)
        .build()
}
