//! Current-user handler.

use axum::extract::State;
use axum::{Extension, Json};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::UserResponse;
use crate::services::auth;

/// `GET /auth/user/me` — profile of the bearer of the token.
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
) -> AppResult<Json<UserResponse>> {
    let resp = auth::current_user(&state, &claims).await?;
    Ok(Json(resp))
}
