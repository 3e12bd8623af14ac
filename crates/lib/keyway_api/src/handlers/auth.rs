//! Local credential request handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::AppState;
use crate::error::AppResult;
use crate::extract::ClientInfo;
use crate::models::{CaptchaConfigResponse, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use crate::services::auth;

/// `POST /auth/v1/register` — create a new local account.
pub async fn register_handler(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let resp = auth::register(&state, body, &client).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

/// `POST /auth/v1/login` — authenticate with username + password.
pub async fn login_handler(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let resp = auth::login(&state, body, &client).await?;
    Ok(Json(resp))
}

/// `GET /auth/v1/captcha` — whether the CAPTCHA gate is on, and the public
/// site key the UI renders the widget with.
pub async fn captcha_handler(State(state): State<AppState>) -> Json<CaptchaConfigResponse> {
    Json(CaptchaConfigResponse {
        enabled: state.captcha.is_enabled(),
        site_key: state
            .captcha
            .is_enabled()
            .then(|| state.captcha.site_key().to_string()),
    })
}
