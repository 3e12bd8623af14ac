//! Identity-provider seam and the GitHub implementation.
//!
//! `GitHubProvider` builds the authorization URL, exchanges the returned
//! code for an access token and fetches the user's profile. All outbound
//! calls share one client bounded by [`PROVIDER_TIMEOUT`].

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{PROVIDER_TIMEOUT, ProviderError};
use crate::models::auth::ExternalIdentity;

pub const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
pub const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Scope needed to read the primary email address.
const GITHUB_SCOPE: &str = "user:email";

/// A delegated identity provider using the authorization-code flow.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL the user agent is sent to; carries `state` verbatim.
    fn authorize_url(&self, state: &str) -> String;

    /// Exchange an authorization code and fetch the resulting identity.
    async fn exchange(&self, code: &str) -> Result<ExternalIdentity, ProviderError>;
}

/// GitHub OAuth app settings. Endpoint URLs default to github.com.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub authorize_url: String,
    pub token_url: String,
    pub api_url: String,
}

impl GitHubConfig {
    pub fn new(client_id: &str, client_secret: &str, redirect_url: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_url: redirect_url.to_string(),
            authorize_url: GITHUB_AUTHORIZE_URL.to_string(),
            token_url: GITHUB_TOKEN_URL.to_string(),
            api_url: GITHUB_API_URL.to_string(),
        }
    }
}

/// Response from GitHub's token endpoint. Errors arrive as HTTP 200 with
/// `error` set.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    #[serde(default)]
    verified: bool,
}

pub struct GitHubProvider {
    config: GitHubConfig,
    authorize_endpoint: Url,
    client: Client,
}

impl GitHubProvider {
    pub fn new(config: GitHubConfig) -> Result<Self, ProviderError> {
        let authorize_endpoint = Url::parse(&config.authorize_url)
            .map_err(|e| ProviderError::Exchange(format!("invalid authorize URL: {e}")))?;
        let client = Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .user_agent(concat!("keyway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Exchange(format!("HTTP client: {e}")))?;
        Ok(Self {
            config,
            authorize_endpoint,
            client,
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.config.redirect_url.as_str()),
        ];

        let resp = self
            .client
            .post(&self.config.token_url)
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Exchange(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Exchange(format!("HTTP {status}: {body}")));
        }

        let token = resp
            .json::<TokenResponse>()
            .await
            .map_err(|e| ProviderError::Exchange(format!("response parse error: {e}")))?;

        match (token.access_token, token.error) {
            (_, Some(error)) => Err(ProviderError::Exchange(format!(
                "{error}: {}",
                token.error_description.unwrap_or_default()
            ))),
            (Some(access_token), None) if !access_token.is_empty() => Ok(access_token),
            _ => Err(ProviderError::Exchange("no access token in response".into())),
        }
    }

    async fn api_get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        access_token: &str,
    ) -> Result<T, ProviderError> {
        let url = format!("{}{path}", self.config.api_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| ProviderError::Profile(format!("GET {path} failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(ProviderError::Profile(format!(
                "GET {path} returned HTTP {}",
                resp.status()
            )));
        }

        resp.json::<T>()
            .await
            .map_err(|e| ProviderError::Profile(format!("GET {path} parse error: {e}")))
    }

    /// Primary, verified address from `/user/emails`.
    async fn primary_email(&self, access_token: &str) -> Result<Option<String>, ProviderError> {
        let emails: Vec<GitHubEmail> = self.api_get("/user/emails", access_token).await?;
        Ok(emails
            .into_iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email))
    }
}

#[async_trait]
impl IdentityProvider for GitHubProvider {
    fn authorize_url(&self, state: &str) -> String {
        let mut url = self.authorize_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("scope", GITHUB_SCOPE)
            .append_pair("state", state);
        url.into()
    }

    async fn exchange(&self, code: &str) -> Result<ExternalIdentity, ProviderError> {
        let access_token = self.exchange_code(code).await?;
        let user: GitHubUser = self.api_get("/user", &access_token).await?;

        let email = match user.email.filter(|e| !e.is_empty()) {
            Some(email) => email,
            None => self.primary_email(&access_token).await?.unwrap_or_default(),
        };
        debug!(github_id = user.id, login = %user.login, "fetched GitHub profile");

        Ok(ExternalIdentity {
            id: user.id,
            login: user.login,
            email,
            avatar_url: user.avatar_url.unwrap_or_default(),
        })
    }
}
