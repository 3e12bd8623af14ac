//! # keyway_api
//!
//! HTTP API library for Keyway.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use keyway_core::auth::AuthError;
use keyway_core::auth::password::hash_password_with_cost;
use keyway_core::captcha::HCaptchaVerifier;
use keyway_core::oauth::{HandshakeManager, HandshakeStore, IdentityProvider};
use keyway_core::users::{IdentityReconciler, UserRepository};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::handlers::{auth, oauth, user};

/// Route paths.
pub mod routes {
    pub const POST_AUTH_REGISTER: &str = "/auth/v1/register";
    pub const POST_AUTH_LOGIN: &str = "/auth/v1/login";
    pub const GET_AUTH_GITHUB_LOGIN: &str = "/auth/v1/oauth2/github/login";
    pub const GET_AUTH_GITHUB_CALLBACK: &str = "/auth/v1/oauth2/github/callback";
    pub const GET_AUTH_USER_ME: &str = "/auth/user/me";
    pub const GET_AUTH_CAPTCHA: &str = "/auth/v1/captcha";
}

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// API configuration.
    pub config: ApiConfig,
    pub users: Arc<dyn UserRepository>,
    pub handshakes: Arc<HandshakeManager>,
    pub reconciler: Arc<IdentityReconciler>,
    pub captcha: Arc<HCaptchaVerifier>,
    /// Verified against when a login names an unknown user. Hashed at the
    /// configured cost so both failure paths do the same bcrypt work.
    pub dummy_hash: Arc<str>,
}

impl AppState {
    /// Fails when `config.bcrypt_cost` is outside bcrypt's range.
    pub fn new(
        config: ApiConfig,
        users: Arc<dyn UserRepository>,
        handshake_store: Arc<dyn HandshakeStore>,
        provider: Arc<dyn IdentityProvider>,
        captcha: HCaptchaVerifier,
    ) -> Result<Self, AuthError> {
        let dummy_hash = hash_password_with_cost(DUMMY_PASSWORD, config.bcrypt_cost)?;
        Ok(Self {
            config,
            reconciler: Arc::new(IdentityReconciler::new(Arc::clone(&users))),
            handshakes: Arc::new(HandshakeManager::new(handshake_store, provider)),
            captcha: Arc::new(captcha),
            dummy_hash: dummy_hash.into(),
            users,
        })
    }
}

const DUMMY_PASSWORD: &str = "keyway-dummy-password";

/// Run embedded database migrations.
///
/// Delegates to `keyway_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    keyway_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required, never cached)
    let public = Router::new()
        .route(routes::GET_AUTH_CAPTCHA, get(auth::captcha_handler))
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::GET_AUTH_GITHUB_LOGIN, get(oauth::github_login_handler))
        .route(
            routes::GET_AUTH_GITHUB_CALLBACK,
            get(oauth::github_callback_handler),
        )
        .layer(axum::middleware::from_fn(middleware::security::no_cache));

    // Protected routes (require auth)
    let protected = Router::new()
        .route(routes::GET_AUTH_USER_ME, get(user::me_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::security::security_headers,
        ))
        .layer(cors)
        .with_state(state)
}
