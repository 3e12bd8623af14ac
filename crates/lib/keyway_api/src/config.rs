//! API server configuration.

use std::str::FromStr;

use keyway_core::auth::jwt::{DEFAULT_TOKEN_VALIDITY_SECS, resolve_jwt_secret};
use keyway_core::auth::password::BCRYPT_COST;
use keyway_core::captcha::{CaptchaConfig, HCAPTCHA_VERIFY_URL};
use tracing::warn;

/// GitHub OAuth app registration.
#[derive(Clone, Debug, Default)]
pub struct GitHubSettings {
    pub client_id: String,
    pub client_secret: String,
    /// Callback URL registered with GitHub.
    pub redirect_url: String,
}

/// Where the browser lands after a delegated login.
#[derive(Clone, Debug)]
pub struct UiSettings {
    pub base_url: String,
    pub login_success_path: String,
    pub login_error_path: String,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            login_success_path: "/login/success".into(),
            login_error_path: "/login/error".into(),
        }
    }
}

impl UiSettings {
    pub fn success_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.login_success_path)
    }

    pub fn error_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.login_error_path)
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8080").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// Identity token lifetime in seconds.
    pub token_validity_secs: i64,
    /// bcrypt cost for new password hashes.
    pub bcrypt_cost: u32,
    pub github: GitHubSettings,
    pub ui: UiSettings,
    pub captcha: CaptchaConfig,
    /// Mark cookies `Secure` and send HSTS.
    pub cookie_secure: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            database_url: "postgres://localhost:5432/keyway".into(),
            jwt_secret: String::new(),
            token_validity_secs: DEFAULT_TOKEN_VALIDITY_SECS,
            bcrypt_cost: BCRYPT_COST,
            github: GitHubSettings::default(),
            ui: UiSettings::default(),
            captcha: CaptchaConfig::default(),
            cookie_secure: false,
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) if !raw.is_empty() => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "unparseable configuration value, using default");
            default
        }),
        _ => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).map(|v| v.to_ascii_lowercase()) {
        Ok(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Ok(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                | Default                              |
    /// |-------------------------|--------------------------------------|
    /// | `BIND_ADDR`             | `127.0.0.1:8080`                     |
    /// | `DATABASE_URL`          | `postgres://localhost:5432/keyway`   |
    /// | `JWT_SECRET` / `AUTH_SECRET` | generated & persisted to file   |
    /// | `TOKEN_VALIDITY_SECS`   | `86400`                              |
    /// | `BCRYPT_COST`           | `10`                                 |
    /// | `GITHUB_CLIENT_ID` / `GITHUB_CLIENT_SECRET` / `GITHUB_REDIRECT_URL` | empty |
    /// | `UI_BASE_URL`           | `http://localhost:3000`              |
    /// | `UI_LOGIN_SUCCESS_PATH` | `/login/success`                     |
    /// | `UI_LOGIN_ERROR_PATH`   | `/login/error`                       |
    /// | `HCAPTCHA_ENABLED`      | `false`                              |
    /// | `HCAPTCHA_SECRET_KEY` / `HCAPTCHA_SITE_KEY` | empty            |
    /// | `COOKIE_SECURE`         | `false`                              |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_string("BIND_ADDR", &defaults.bind_addr),
            database_url: env_string("DATABASE_URL", &defaults.database_url),
            jwt_secret: resolve_jwt_secret(),
            token_validity_secs: env_parse("TOKEN_VALIDITY_SECS", defaults.token_validity_secs),
            bcrypt_cost: env_parse("BCRYPT_COST", defaults.bcrypt_cost),
            github: GitHubSettings {
                client_id: env_string("GITHUB_CLIENT_ID", ""),
                client_secret: env_string("GITHUB_CLIENT_SECRET", ""),
                redirect_url: env_string("GITHUB_REDIRECT_URL", ""),
            },
            ui: UiSettings {
                base_url: env_string("UI_BASE_URL", &defaults.ui.base_url),
                login_success_path: env_string(
                    "UI_LOGIN_SUCCESS_PATH",
                    &defaults.ui.login_success_path,
                ),
                login_error_path: env_string("UI_LOGIN_ERROR_PATH", &defaults.ui.login_error_path),
            },
            captcha: CaptchaConfig {
                enabled: env_bool("HCAPTCHA_ENABLED", false),
                secret_key: env_string("HCAPTCHA_SECRET_KEY", ""),
                site_key: env_string("HCAPTCHA_SITE_KEY", ""),
                verify_url: HCAPTCHA_VERIFY_URL.to_string(),
            },
            cookie_secure: env_bool("COOKIE_SECURE", false),
        }
    }

    /// Token lifetime as a duration.
    pub fn token_validity(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_validity_secs)
    }
}
