//! Shared fixtures for router tests: in-memory backends and a fake provider.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use keyway_api::config::ApiConfig;
use keyway_api::{AppState, router};
use keyway_core::captcha::{CaptchaConfig, HCaptchaVerifier};
use keyway_core::models::auth::ExternalIdentity;
use keyway_core::oauth::{
    HandshakeStore, IdentityProvider, MemoryHandshakeStore, ProviderError, StoreError,
};
use keyway_core::users::MemoryUserRepository;
use tower::ServiceExt;

pub const SECRET: &str = "test-secret";
pub const GOOD_CODE: &str = "good-code";

/// Provider that hands out a fixed identity for `GOOD_CODE`.
pub struct FakeProvider {
    pub identity: ExternalIdentity,
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorize_url(&self, state: &str) -> String {
        format!("https://github.example/login/oauth/authorize?client_id=cid&state={state}")
    }

    async fn exchange(&self, code: &str) -> Result<ExternalIdentity, ProviderError> {
        if code == GOOD_CODE {
            Ok(self.identity.clone())
        } else {
            Err(ProviderError::Exchange("bad_verification_code".into()))
        }
    }
}

/// Accepts new handshakes but fails every `take_once`, as a store that went
/// down between login and callback would.
#[derive(Default)]
pub struct TakeFailsStore {
    inner: MemoryHandshakeStore,
}

#[async_trait]
impl HandshakeStore for TakeFailsStore {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.inner.put(key, value, ttl).await
    }

    async fn take_once(&self, _key: &str) -> Result<String, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

pub struct TestApp {
    pub router: Router,
    pub users: Arc<MemoryUserRepository>,
}

pub fn config() -> ApiConfig {
    ApiConfig {
        jwt_secret: SECRET.into(),
        bcrypt_cost: 4,
        ..ApiConfig::default()
    }
}

pub fn octocat() -> ExternalIdentity {
    ExternalIdentity {
        id: 4242,
        login: "octocat".into(),
        email: "octo@x.com".into(),
        avatar_url: "https://avatars.example/4242".into(),
    }
}

fn build_app(
    identity: ExternalIdentity,
    store: Arc<dyn HandshakeStore>,
    captcha: HCaptchaVerifier,
) -> TestApp {
    let users = Arc::new(MemoryUserRepository::new());
    let state = AppState::new(
        config(),
        users.clone(),
        store,
        Arc::new(FakeProvider { identity }),
        captcha,
    )
    .expect("app state");
    TestApp {
        router: router(state),
        users,
    }
}

pub fn test_app_with(identity: ExternalIdentity) -> TestApp {
    build_app(
        identity,
        Arc::new(MemoryHandshakeStore::new()),
        HCaptchaVerifier::disabled(),
    )
}

/// App whose CAPTCHA gate is on and verifies against `verify_url`.
pub fn test_app_with_captcha(verify_url: &str) -> TestApp {
    let captcha = HCaptchaVerifier::new(CaptchaConfig {
        enabled: true,
        secret_key: "captcha-secret".into(),
        site_key: "captcha-site-key".into(),
        verify_url: verify_url.to_string(),
    })
    .expect("captcha verifier");
    build_app(octocat(), Arc::new(MemoryHandshakeStore::new()), captcha)
}

/// App whose handshake store goes down before any callback arrives.
pub fn test_app_with_failing_store() -> TestApp {
    build_app(
        octocat(),
        Arc::new(TakeFailsStore::default()),
        HCaptchaVerifier::disabled(),
    )
}

pub fn test_app() -> TestApp {
    test_app_with(octocat())
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.expect("request")
    }
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn json_body(resp: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("parse JSON")
}

pub fn header_str<'a>(resp: &'a Response<Body>, name: &str) -> Option<&'a str> {
    resp.headers().get(name).and_then(|v| v.to_str().ok())
}

/// `(name, value)` of the first `Set-Cookie` header.
pub fn set_cookie(resp: &Response<Body>) -> (String, String) {
    let raw = header_str(resp, "set-cookie").expect("set-cookie header");
    let pair = raw.split(';').next().unwrap_or_default();
    let (name, value) = pair.split_once('=').expect("cookie pair");
    (name.trim().to_string(), value.trim().to_string())
}

/// Query pairs of the `Location` header.
pub fn location_query(resp: &Response<Body>) -> (url::Url, Vec<(String, String)>) {
    let location = header_str(resp, "location").expect("location header");
    let url = url::Url::parse(location).expect("absolute location");
    let pairs = url.query_pairs().into_owned().collect();
    (url, pairs)
}

pub fn query_value(pairs: &[(String, String)], key: &str) -> Option<String> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
}
