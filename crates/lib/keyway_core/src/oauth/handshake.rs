//! Per-attempt delegated-login state machine.
//!
//! `start` creates a pending handshake holding a random anti-forgery state
//! and returns the provider redirect. `complete` consumes the handshake
//! exactly once, compares the echoed state, and only then talks to the
//! provider. A handshake that was never started, has expired or was already
//! consumed cannot complete.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::github::IdentityProvider;
use super::store::HandshakeStore;
use super::{HANDSHAKE_TTL, HandshakeError, StoreError};
use crate::models::auth::ExternalIdentity;

/// Bytes of entropy in the anti-forgery state.
const STATE_BYTES: usize = 32;

/// Store key namespace for handshakes.
const KEY_PREFIX: &str = "oauth2:handshake:";

/// Diagnostic metadata about the client that started the attempt.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub user_agent: String,
    pub client_ip: String,
}

/// Server-side record of one pending handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeRecord {
    pub state: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_ip: String,
}

/// Result of starting a handshake.
#[derive(Debug, Clone)]
pub struct HandshakeStart {
    /// Opaque id the client must present on the callback (e.g. in a cookie).
    pub handshake_id: String,
    /// Provider authorization URL carrying the state.
    pub redirect_url: String,
}

/// A successfully completed handshake.
#[derive(Debug, Clone)]
pub struct CompletedHandshake {
    pub identity: ExternalIdentity,
    pub record: HandshakeRecord,
}

/// Generate a hex-encoded anti-forgery state.
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Byte-for-byte comparison whose running time depends only on the lengths.
fn states_match(expected: &str, received: &str) -> bool {
    let (a, b) = (expected.as_bytes(), received.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn store_key(handshake_id: &str) -> String {
    format!("{KEY_PREFIX}{handshake_id}")
}

pub struct HandshakeManager {
    store: Arc<dyn HandshakeStore>,
    provider: Arc<dyn IdentityProvider>,
    ttl: Duration,
}

impl HandshakeManager {
    pub fn new(store: Arc<dyn HandshakeStore>, provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            store,
            provider,
            ttl: HANDSHAKE_TTL,
        }
    }

    /// Override the handshake lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Begin a delegated-login attempt.
    pub async fn start(&self, client: ClientMeta) -> Result<HandshakeStart, HandshakeError> {
        let state = generate_state();
        let handshake_id = Uuid::new_v4().to_string();
        let record = HandshakeRecord {
            state: state.clone(),
            created_at: Utc::now(),
            user_agent: client.user_agent,
            client_ip: client.client_ip,
        };
        let value = serde_json::to_string(&record)
            .map_err(|e| HandshakeError::Internal(format!("serialize handshake: {e}")))?;

        self.store
            .put(&store_key(&handshake_id), value, self.ttl)
            .await?;
        debug!(handshake_id = %handshake_id, "handshake started");

        Ok(HandshakeStart {
            redirect_url: self.provider.authorize_url(&state),
            handshake_id,
        })
    }

    /// Finish a delegated-login attempt from the provider callback.
    pub async fn complete(
        &self,
        handshake_id: Option<&str>,
        code: &str,
        state: &str,
    ) -> Result<CompletedHandshake, HandshakeError> {
        let handshake_id = handshake_id
            .filter(|id| !id.is_empty())
            .ok_or(HandshakeError::MissingHandshake)?;
        if code.is_empty() {
            return Err(HandshakeError::MissingCode);
        }

        let value = self.store.take_once(&store_key(handshake_id)).await?;
        let record: HandshakeRecord = serde_json::from_str(&value)
            .map_err(|e| HandshakeError::Internal(format!("corrupt handshake record: {e}")))?;

        if !states_match(&record.state, state) {
            warn!(handshake_id, "handshake state mismatch");
            return Err(HandshakeError::StateMismatch);
        }

        let age = Utc::now().signed_duration_since(record.created_at);
        if age.to_std().is_ok_and(|age| age > self.ttl) {
            return Err(HandshakeError::HandshakeExpired);
        }

        let identity = self.provider.exchange(code).await?;
        Ok(CompletedHandshake { identity, record })
    }

    /// Discard a pending handshake, e.g. after the user denied access.
    pub async fn abandon(&self, handshake_id: &str) -> Result<(), HandshakeError> {
        match self.store.take_once(&store_key(handshake_id)).await {
            Ok(_) | Err(StoreError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::oauth::ProviderError;
    use crate::oauth::store::MemoryHandshakeStore;

    /// Provider that accepts one code and counts exchanges.
    struct FakeProvider {
        good_code: &'static str,
        exchanges: AtomicU32,
    }

    impl FakeProvider {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                good_code: "good-code",
                exchanges: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        fn authorize_url(&self, state: &str) -> String {
            format!("https://idp.example/authorize?state={state}")
        }

        async fn exchange(&self, code: &str) -> Result<ExternalIdentity, ProviderError> {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            if code != self.good_code {
                return Err(ProviderError::Exchange("bad code".into()));
            }
            Ok(ExternalIdentity {
                id: 99,
                login: "octo".into(),
                email: "octo@x.com".into(),
                avatar_url: String::new(),
            })
        }
    }

    struct DownStore;

    #[async_trait]
    impl HandshakeStore for DownStore {
        async fn put(&self, _: &str, _: String, _: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn take_once(&self, _: &str) -> Result<String, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn manager() -> (HandshakeManager, Arc<FakeProvider>) {
        let provider = FakeProvider::new();
        let manager = HandshakeManager::new(Arc::new(MemoryHandshakeStore::new()), provider.clone());
        (manager, provider)
    }

    fn state_of(start: &HandshakeStart) -> String {
        start
            .redirect_url
            .split("state=")
            .nth(1)
            .expect("redirect carries state")
            .to_string()
    }

    #[test]
    fn state_is_64_hex_chars_and_unique() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn states_match_is_exact() {
        assert!(states_match("abc", "abc"));
        assert!(!states_match("abc", "abd"));
        assert!(!states_match("abc", "ab"));
        assert!(!states_match("abc", "ABC"));
    }

    #[tokio::test]
    async fn happy_path_completes_with_identity() {
        let (manager, _) = manager();
        let start = manager
            .start(ClientMeta {
                user_agent: "test-agent".into(),
                client_ip: "10.0.0.1".into(),
            })
            .await
            .unwrap();
        let state = state_of(&start);

        let done = manager
            .complete(Some(&start.handshake_id), "good-code", &state)
            .await
            .unwrap();
        assert_eq!(done.identity.id, 99);
        assert_eq!(done.record.client_ip, "10.0.0.1");
        assert_eq!(done.record.state, state);
    }

    #[tokio::test]
    async fn replay_is_rejected() {
        let (manager, provider) = manager();
        let start = manager.start(ClientMeta::default()).await.unwrap();
        let state = state_of(&start);

        assert!(manager
            .complete(Some(&start.handshake_id), "good-code", &state)
            .await
            .is_ok());
        let replay = manager
            .complete(Some(&start.handshake_id), "good-code", &state)
            .await;
        assert!(matches!(replay, Err(HandshakeError::HandshakeExpired)));
        assert_eq!(provider.exchanges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callbacks_authenticate_once() {
        let (manager, provider) = manager();
        let manager = Arc::new(manager);
        let start = manager.start(ClientMeta::default()).await.unwrap();
        let state = state_of(&start);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let id = start.handshake_id.clone();
                let state = state.clone();
                tokio::spawn(async move {
                    manager.complete(Some(&id), "good-code", &state).await.is_ok()
                })
            })
            .collect();

        let mut successes = 0;
        for h in handles {
            if h.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(provider.exchanges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn state_mismatch_rejects_and_burns_handshake() {
        let (manager, provider) = manager();
        let start = manager.start(ClientMeta::default()).await.unwrap();
        let state = state_of(&start);

        let forged = manager
            .complete(Some(&start.handshake_id), "good-code", "forged-state")
            .await;
        assert!(matches!(forged, Err(HandshakeError::StateMismatch)));

        let late = manager
            .complete(Some(&start.handshake_id), "good-code", &state)
            .await;
        assert!(matches!(late, Err(HandshakeError::HandshakeExpired)));
        assert_eq!(provider.exchanges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn abandoned_handshake_cannot_complete() {
        let (manager, _) = manager();
        let start = manager.start(ClientMeta::default()).await.unwrap();
        let state = state_of(&start);
        manager.abandon(&start.handshake_id).await.unwrap();
        manager.abandon(&start.handshake_id).await.unwrap();
        assert!(matches!(
            manager
                .complete(Some(&start.handshake_id), "good-code", &state)
                .await,
            Err(HandshakeError::HandshakeExpired)
        ));
    }

    #[tokio::test]
    async fn missing_handshake_id_is_rejected() {
        let (manager, _) = manager();
        assert!(matches!(
            manager.complete(None, "good-code", "s").await,
            Err(HandshakeError::MissingHandshake)
        ));
        assert!(matches!(
            manager.complete(Some(""), "good-code", "s").await,
            Err(HandshakeError::MissingHandshake)
        ));
    }

    #[tokio::test]
    async fn missing_code_is_rejected() {
        let (manager, _) = manager();
        let start = manager.start(ClientMeta::default()).await.unwrap();
        let state = state_of(&start);
        assert!(matches!(
            manager.complete(Some(&start.handshake_id), "", &state).await,
            Err(HandshakeError::MissingCode)
        ));
    }

    #[tokio::test]
    async fn unknown_handshake_is_expired_not_server_error() {
        let (manager, _) = manager();
        let err = manager
            .complete(Some("never-started"), "good-code", "s")
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::HandshakeExpired));
        assert!(err.is_auth_failure());
    }

    #[tokio::test]
    async fn expired_handshake_is_rejected() {
        let provider = FakeProvider::new();
        let manager = HandshakeManager::new(Arc::new(MemoryHandshakeStore::new()), provider)
            .with_ttl(Duration::ZERO);
        let start = manager.start(ClientMeta::default()).await.unwrap();
        let state = state_of(&start);
        assert!(matches!(
            manager
                .complete(Some(&start.handshake_id), "good-code", &state)
                .await,
            Err(HandshakeError::HandshakeExpired)
        ));
    }

    #[tokio::test]
    async fn provider_failure_is_exchange_failed() {
        let (manager, _) = manager();
        let start = manager.start(ClientMeta::default()).await.unwrap();
        let state = state_of(&start);
        let err = manager
            .complete(Some(&start.handshake_id), "bad-code", &state)
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::ExchangeFailed(_)));
        assert!(err.is_auth_failure());
    }

    #[tokio::test]
    async fn store_outage_is_infrastructure_failure() {
        let manager = HandshakeManager::new(Arc::new(DownStore), FakeProvider::new());
        let err = manager.start(ClientMeta::default()).await.unwrap_err();
        assert!(matches!(err, HandshakeError::StoreUnavailable(_)));
        assert!(!err.is_auth_failure());

        let err = manager
            .complete(Some("id"), "good-code", "s")
            .await
            .unwrap_err();
        assert!(!err.is_auth_failure());
    }
}
