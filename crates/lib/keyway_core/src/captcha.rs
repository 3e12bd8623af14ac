//! hCaptcha verification gate for register and login.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

pub const HCAPTCHA_VERIFY_URL: &str = "https://hcaptcha.com/siteverify";

const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("CAPTCHA secret key is not configured")]
    Misconfigured,

    #[error("CAPTCHA token is missing")]
    MissingToken,

    #[error("CAPTCHA verification request failed: {0}")]
    Request(String),

    #[error("CAPTCHA verification failed: {0}")]
    VerificationFailed(String),
}

impl CaptchaError {
    /// Whether the client is at fault rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CaptchaError::MissingToken | CaptchaError::VerificationFailed(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct CaptchaConfig {
    pub enabled: bool,
    pub secret_key: String,
    /// Public key handed to the UI widget.
    pub site_key: String,
    pub verify_url: String,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            secret_key: String::new(),
            site_key: String::new(),
            verify_url: HCAPTCHA_VERIFY_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
    #[serde(default)]
    hostname: Option<String>,
}

/// Human-readable reason for the first error code.
fn describe_error_codes(codes: &[String]) -> String {
    let Some(code) = codes.first() else {
        return "unknown error".to_string();
    };
    match code.as_str() {
        "missing-input-secret" => "secret key is missing".into(),
        "invalid-input-secret" => "secret key is invalid or malformed".into(),
        "missing-input-response" => "response token is missing".into(),
        "invalid-input-response" => "response token is invalid or malformed".into(),
        "bad-request" => "request is malformed".into(),
        "invalid-or-already-seen-response" => "response token is invalid or already used".into(),
        "not-using-dummy-passcode" => "test site key requires the dummy passcode".into(),
        "sitekey-secret-mismatch" => "site key does not match the secret".into(),
        other => format!("captcha error ({other})"),
    }
}

pub struct HCaptchaVerifier {
    config: CaptchaConfig,
    client: Client,
}

impl HCaptchaVerifier {
    pub fn new(config: CaptchaConfig) -> Result<Self, CaptchaError> {
        let client = Client::builder()
            .timeout(VERIFY_TIMEOUT)
            .build()
            .map_err(|e| CaptchaError::Request(format!("HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    /// A verifier that accepts everything.
    pub fn disabled() -> Self {
        Self {
            config: CaptchaConfig::default(),
            client: Client::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn site_key(&self) -> &str {
        &self.config.site_key
    }

    /// Check a widget response token. Always succeeds when disabled.
    pub async fn verify(&self, token: &str, client_ip: &str) -> Result<(), CaptchaError> {
        if !self.config.enabled {
            debug!("captcha disabled, skipping verification");
            return Ok(());
        }
        if self.config.secret_key.is_empty() {
            return Err(CaptchaError::Misconfigured);
        }
        if token.is_empty() {
            return Err(CaptchaError::MissingToken);
        }

        let mut form = vec![
            ("secret", self.config.secret_key.as_str()),
            ("response", token),
        ];
        if !client_ip.is_empty() {
            form.push(("remoteip", client_ip));
        }

        let resp = self
            .client
            .post(&self.config.verify_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| CaptchaError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(CaptchaError::Request(format!(
                "siteverify returned HTTP {}",
                resp.status()
            )));
        }

        let body: VerifyResponse = resp
            .json()
            .await
            .map_err(|e| CaptchaError::Request(format!("response parse error: {e}")))?;

        if !body.success {
            warn!(client_ip, error_codes = ?body.error_codes, "captcha verification failed");
            return Err(CaptchaError::VerificationFailed(describe_error_codes(
                &body.error_codes,
            )));
        }

        debug!(client_ip, hostname = body.hostname.as_deref().unwrap_or(""), "captcha verified");
        Ok(())
    }
}
