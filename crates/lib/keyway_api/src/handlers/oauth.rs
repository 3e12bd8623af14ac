//! GitHub delegated-login handlers.

use axum::extract::{Query, State};
use axum::response::Redirect;
use axum_extra::extract::cookie::CookieJar;

use crate::AppState;
use crate::error::AppResult;
use crate::extract::ClientInfo;
use crate::models::OAuthCallbackParams;
use crate::services::cookies::{HANDSHAKE_COOKIE, clear_handshake_cookie, handshake_cookie};
use crate::services::oauth;

/// `GET /auth/v1/oauth2/github/login` — start a handshake and send the
/// browser to GitHub.
pub async fn github_login_handler(
    State(state): State<AppState>,
    client: ClientInfo,
    jar: CookieJar,
) -> AppResult<(CookieJar, Redirect)> {
    let start = oauth::begin_github_login(&state, client).await?;
    let jar = jar.add(handshake_cookie(
        &start.handshake_id,
        state.config.cookie_secure,
        state.handshakes.ttl(),
    ));
    Ok((jar, Redirect::temporary(&start.redirect_url)))
}

/// `GET /auth/v1/oauth2/github/callback` — finish the handshake and send the
/// browser back to the UI.
pub async fn github_callback_handler(
    State(state): State<AppState>,
    Query(params): Query<OAuthCallbackParams>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Redirect)> {
    let handshake_id = jar.get(HANDSHAKE_COOKIE).map(|c| c.value().to_string());
    let jar = jar.add(clear_handshake_cookie(state.config.cookie_secure));
    let target = oauth::finish_github_login(&state, handshake_id.as_deref(), &params).await?;
    Ok((jar, Redirect::temporary(&target)))
}
