//! Delegated-login service — handshake start and callback completion.
//!
//! The callback never returns an error body to the browser: every outcome is
//! a redirect back to the UI, and rejections carry only a generic reason.

use keyway_core::auth::jwt::issue_token;
use keyway_core::oauth::{ClientMeta, HandshakeError, HandshakeStart};
use keyway_core::users::ReconcileError;
use tracing::{error, info, warn};
use url::Url;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::ClientInfo;
use crate::models::OAuthCallbackParams;

/// Reason reported to the UI for any rejected callback.
pub const AUTH_FAILED_REASON: &str = "authentication_failed";

/// Reason reported to the UI when a dependency is down.
pub const UNAVAILABLE_REASON: &str = "service_unavailable";

/// Begin a GitHub login for this client.
pub async fn begin_github_login(state: &AppState, client: ClientInfo) -> AppResult<HandshakeStart> {
    let meta = ClientMeta {
        user_agent: client.user_agent,
        client_ip: client.ip,
    };
    state.handshakes.start(meta).await.map_err(|e| match e {
        HandshakeError::StoreUnavailable(msg) => AppError::Unavailable(msg),
        other => AppError::Internal(other.to_string()),
    })
}

enum CallbackFailure {
    Rejected(String),
    Infrastructure(String),
}

impl From<ReconcileError> for CallbackFailure {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::LinkedElsewhere { .. } => CallbackFailure::Rejected(e.to_string()),
            ReconcileError::Failed(_) => CallbackFailure::Infrastructure(e.to_string()),
        }
    }
}

impl From<HandshakeError> for CallbackFailure {
    fn from(e: HandshakeError) -> Self {
        if e.is_auth_failure() {
            CallbackFailure::Rejected(e.to_string())
        } else {
            CallbackFailure::Infrastructure(e.to_string())
        }
    }
}

/// Complete a GitHub login and return the URL to redirect the browser to.
///
/// Only a malformed UI base URL produces an error here.
pub async fn finish_github_login(
    state: &AppState,
    handshake_id: Option<&str>,
    params: &OAuthCallbackParams,
) -> AppResult<String> {
    match complete(state, handshake_id, params).await {
        Ok(pairs) => ui_url(&state.config.ui.success_url(), &pairs),
        Err(CallbackFailure::Rejected(detail)) => {
            warn!(handshake_id = handshake_id.unwrap_or(""), %detail, "delegated login rejected");
            ui_url(
                &state.config.ui.error_url(),
                &[("message", AUTH_FAILED_REASON.to_string())],
            )
        }
        Err(CallbackFailure::Infrastructure(detail)) => {
            error!(handshake_id = handshake_id.unwrap_or(""), %detail, "delegated login failed");
            ui_url(
                &state.config.ui.error_url(),
                &[("message", UNAVAILABLE_REASON.to_string())],
            )
        }
    }
}

async fn complete(
    state: &AppState,
    handshake_id: Option<&str>,
    params: &OAuthCallbackParams,
) -> Result<Vec<(&'static str, String)>, CallbackFailure> {
    if let Some(provider_error) = &params.error {
        if let Some(id) = handshake_id {
            state.handshakes.abandon(id).await?;
        }
        return Err(CallbackFailure::Rejected(format!(
            "provider returned error: {provider_error}"
        )));
    }

    let done = state
        .handshakes
        .complete(handshake_id, &params.code, &params.state)
        .await?;

    let user = state
        .reconciler
        .reconcile(&done.identity)
        .await?;

    let token = issue_token(
        user.id,
        &user.username,
        state.config.jwt_secret.as_bytes(),
        state.config.token_validity(),
    )
    .map_err(|e| CallbackFailure::Infrastructure(e.to_string()))?;

    info!(
        user_id = user.id,
        username = %user.username,
        auth_type = %user.auth_kind,
        client_ip = %done.record.client_ip,
        "delegated login succeeded"
    );

    Ok(vec![
        ("token", token),
        ("user_id", user.id.to_string()),
        ("username", user.username),
        ("auth_type", user.auth_kind.to_string()),
    ])
}

fn ui_url(base: &str, pairs: &[(&str, String)]) -> AppResult<String> {
    let mut url =
        Url::parse(base).map_err(|e| AppError::Internal(format!("invalid UI URL {base}: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in pairs {
            query.append_pair(key, value);
        }
    }
    Ok(url.into())
}
