//! Ephemeral handshake store — single-use values with per-key expiry.
//!
//! `take_once` must read and delete in one atomic step: two concurrent
//! callbacks for the same key may never both observe the value.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;
use tokio::time::Instant;
use tracing::debug;

use super::StoreError;

/// Interval between sweeps of never-taken entries in the in-memory store.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[async_trait]
pub trait HandshakeStore: Send + Sync {
    /// Store `value` under `key` for `ttl`, replacing any previous value.
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    /// Atomically remove and return the live value under `key`.
    async fn take_once(&self, key: &str) -> Result<String, StoreError>;
}

// =============================================================================
// In-memory store
// =============================================================================

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory store. `DashMap::remove` holds only the key's shard lock for the
/// duration of the removal, which makes `take_once` atomic per key.
#[derive(Default)]
pub struct MemoryHandshakeStore {
    entries: DashMap<String, Entry>,
}

impl MemoryHandshakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evict expired entries.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, e| e.is_live(now));
    }

    /// Number of stored entries, live or not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawn a periodic cleanup task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                store.purge_expired();
            }
        })
    }
}

#[async_trait]
impl HandshakeStore for MemoryHandshakeStore {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn take_once(&self, key: &str) -> Result<String, StoreError> {
        let (_, entry) = self.entries.remove(key).ok_or(StoreError::NotFound)?;
        if !entry.is_live(Instant::now()) {
            debug!(key, "handshake entry expired before use");
            return Err(StoreError::NotFound);
        }
        Ok(entry.value)
    }
}

// =============================================================================
// Postgres store
// =============================================================================

/// Store over the `oauth_handshakes` table. `take_once` is a single
/// `DELETE … RETURNING` statement.
#[derive(Clone)]
pub struct PgHandshakeStore {
    pool: PgPool,
}

impl PgHandshakeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete rows whose TTL has elapsed, returning how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM oauth_handshakes WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl HandshakeStore for PgHandshakeStore {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO oauth_handshakes (key, value, expires_at) \
             VALUES ($1, $2, now() + make_interval(secs => $3)) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn take_once(&self, key: &str) -> Result<String, StoreError> {
        let row = sqlx::query_as::<_, (String, bool)>(
            "DELETE FROM oauth_handshakes WHERE key = $1 \
             RETURNING value, expires_at > now()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some((value, true)) => Ok(value),
            Some((_, false)) => {
                debug!(key, "handshake row expired before use");
                Err(StoreError::NotFound)
            }
            None => Err(StoreError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(600);

    #[tokio::test]
    async fn take_once_on_unseen_key_is_not_found() {
        let store = MemoryHandshakeStore::new();
        assert!(matches!(
            store.take_once("missing").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn put_then_take_once_is_single_use() {
        let store = MemoryHandshakeStore::new();
        store.put("k", "v".into(), TTL).await.unwrap();
        assert_eq!(store.take_once("k").await.unwrap(), "v");
        assert!(matches!(store.take_once("k").await, Err(StoreError::NotFound)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn expired_entry_is_not_found() {
        let store = MemoryHandshakeStore::new();
        store.put("k", "v".into(), Duration::ZERO).await.unwrap();
        assert!(matches!(store.take_once("k").await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn put_replaces_previous_value() {
        let store = MemoryHandshakeStore::new();
        store.put("k", "old".into(), TTL).await.unwrap();
        store.put("k", "new".into(), TTL).await.unwrap();
        assert_eq!(store.take_once("k").await.unwrap(), "new");
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let store = MemoryHandshakeStore::new();
        store.put("fresh", "v".into(), TTL).await.unwrap();
        store.put("stale", "v".into(), Duration::ZERO).await.unwrap();
        store.purge_expired();
        assert_eq!(store.len(), 1);
        assert!(store.take_once("fresh").await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_takes_succeed_at_most_once() {
        for round in 0..20 {
            let store = Arc::new(MemoryHandshakeStore::new());
            let key = format!("k{round}");
            store.put(&key, "v".into(), TTL).await.unwrap();

            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let store = Arc::clone(&store);
                    let key = key.clone();
                    tokio::spawn(async move { store.take_once(&key).await.is_ok() })
                })
                .collect();

            let mut winners = 0;
            for h in handles {
                if h.await.unwrap() {
                    winners += 1;
                }
            }
            assert_eq!(winners, 1, "round {round}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_task_evicts_expired_entries() {
        let store = Arc::new(MemoryHandshakeStore::new());
        store.put("stale", "v".into(), Duration::from_secs(5)).await.unwrap();
        store.put("fresh", "v".into(), TTL).await.unwrap();
        let handle = store.spawn_cleanup_task();

        tokio::time::sleep(CLEANUP_INTERVAL + Duration::from_secs(1)).await;
        assert_eq!(store.len(), 1);
        assert_eq!(store.take_once("fresh").await.unwrap(), "v");
        assert!(store.is_empty());
        handle.abort();
    }
}
