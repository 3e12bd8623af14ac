//! Authentication service — register/login flows delegating to `keyway_core`.

use std::sync::Arc;

use keyway_core::auth::jwt::issue_token;
use keyway_core::auth::password::{hash_password_with_cost, verify_password};
use keyway_core::models::auth::TokenClaims;
use keyway_core::models::user::NewUser;
use keyway_core::users::validate::validate_registration;
use tracing::{info, warn};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::ClientInfo;
use crate::models::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, UserResponse};

/// Run CPU-bound work on the blocking pool.
async fn blocking<T, F>(f: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("blocking task failed: {e}")))
}

async fn check_captcha(state: &AppState, token: Option<&str>, client: &ClientInfo) -> AppResult<()> {
    state
        .captcha
        .verify(token.unwrap_or_default(), &client.ip)
        .await
        .map_err(AppError::from)
}

/// Create a local account.
pub async fn register(
    state: &AppState,
    req: RegisterRequest,
    client: &ClientInfo,
) -> AppResult<RegisterResponse> {
    check_captcha(state, req.captcha_token.as_deref(), client).await?;
    validate_registration(&req.username, &req.password, &req.email)?;

    if state.users.exists_by_username(&req.username).await? {
        warn!(username = %req.username, "registration rejected: username taken");
        return Err(AppError::Conflict("Username is already registered".into()));
    }
    if state.users.exists_by_email(&req.email).await? {
        warn!(username = %req.username, email = %req.email, "registration rejected: email taken");
        return Err(AppError::Conflict("Email is already registered".into()));
    }

    let cost = state.config.bcrypt_cost;
    let password = req.password;
    let hash = blocking(move || hash_password_with_cost(&password, cost)).await??;

    // The existence checks above can race; the repository's own uniqueness
    // check reports the loser as a conflict.
    let user = state
        .users
        .create(NewUser::local(&req.username, hash, Some(&req.email)))
        .await?;

    info!(
        user_id = user.id,
        username = %user.username,
        client_ip = %client.ip,
        "user registered"
    );

    Ok(RegisterResponse {
        message: "Registration successful".into(),
        user: UserResponse::from(&user),
    })
}

/// Authenticate with username + password.
pub async fn login(
    state: &AppState,
    req: LoginRequest,
    client: &ClientInfo,
) -> AppResult<LoginResponse> {
    check_captcha(state, req.captcha_token.as_deref(), client).await?;
    if req.username.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("Username and password are required".into()));
    }

    let user = state.users.find_by_username(&req.username).await?;
    let stored_hash = user.as_ref().and_then(|u| u.password_hash.clone());

    let password = req.password;
    let dummy = Arc::clone(&state.dummy_hash);
    let matched = blocking(move || match stored_hash {
        Some(hash) => verify_password(&password, &hash),
        None => {
            let _ = verify_password(&password, &dummy);
            false
        }
    })
    .await?;

    let user = match user {
        Some(user) if matched => user,
        Some(user) => {
            warn!(username = %req.username, user_id = user.id, client_ip = %client.ip, "login failed: wrong password or no local credentials");
            return Err(AppError::invalid_credentials());
        }
        None => {
            warn!(username = %req.username, client_ip = %client.ip, "login failed: unknown username");
            return Err(AppError::invalid_credentials());
        }
    };

    let token = issue_token(
        user.id,
        &user.username,
        state.config.jwt_secret.as_bytes(),
        state.config.token_validity(),
    )?;

    info!(user_id = user.id, username = %user.username, client_ip = %client.ip, "user logged in");

    Ok(LoginResponse {
        token,
        user_id: user.id,
        username: user.username,
    })
}

/// Look up the user a validated token refers to.
pub async fn current_user(state: &AppState, claims: &TokenClaims) -> AppResult<UserResponse> {
    let user_id = claims
        .user_id()
        .ok_or_else(|| AppError::Unauthorized("Invalid token subject".into()))?;
    match state.users.find_by_id(user_id).await? {
        Some(user) => Ok(UserResponse::from(&user)),
        None => {
            warn!(user_id, "token refers to a user that no longer exists");
            Err(AppError::Unauthorized("User not found".into()))
        }
    }
}
