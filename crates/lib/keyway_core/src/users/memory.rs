//! In-memory user repository.
//!
//! Enforces the same uniqueness rules as the `users` table. Used by tests and
//! by single-node deployments that do not need durable accounts.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{RepoError, UserRepository};
use crate::models::user::{NewUser, User};

#[derive(Default)]
struct Inner {
    next_id: i64,
    users: BTreeMap<i64, User>,
}

impl Inner {
    fn conflict(&self, candidate: &User) -> Option<String> {
        self.users
            .values()
            .filter(|u| u.id != candidate.id)
            .find_map(|u| {
                if u.username == candidate.username {
                    Some(format!("username '{}' already exists", candidate.username))
                } else if candidate.email.is_some() && u.email == candidate.email {
                    Some("email already exists".to_string())
                } else if candidate.external_id.is_some() && u.external_id == candidate.external_id
                {
                    Some("external account already linked".to_string())
                } else {
                    None
                }
            })
    }

    fn find(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.users.values().find(|u| pred(u)).cloned()
    }
}

/// `UserRepository` backed by a `BTreeMap` behind a tokio `RwLock`.
#[derive(Default)]
pub struct MemoryUserRepository {
    inner: RwLock<Inner>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub async fn len(&self) -> usize {
        self.inner.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn exists_by_username(&self, username: &str) -> Result<bool, RepoError> {
        Ok(self.find_by_username(username).await?.is_some())
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, RepoError> {
        Ok(self.find_by_email(email).await?.is_some())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        Ok(self.inner.read().await.find(|u| u.username == username))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_by_external_id(&self, external_id: i64) -> Result<Option<User>, RepoError> {
        Ok(self
            .inner
            .read()
            .await
            .find(|u| u.external_id == Some(external_id)))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        Ok(self
            .inner
            .read()
            .await
            .find(|u| u.email.as_deref() == Some(email)))
    }

    async fn create(&self, user: NewUser) -> Result<User, RepoError> {
        if !user.has_valid_credentials() {
            return Err(RepoError::Invalid(
                "local account requires a password hash".into(),
            ));
        }
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let record = User {
            id: inner.next_id + 1,
            username: user.username,
            password_hash: user.password_hash,
            email: user.email,
            external_id: user.external_id,
            avatar_url: user.avatar_url,
            auth_kind: user.auth_kind,
            created_at: now,
            updated_at: now,
        };
        if let Some(reason) = inner.conflict(&record) {
            return Err(RepoError::Conflict(reason));
        }
        inner.next_id = record.id;
        inner.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(&self, user: &User) -> Result<(), RepoError> {
        let mut inner = self.inner.write().await;
        let Some(existing) = inner.users.get(&user.id) else {
            return Err(RepoError::NotFound(user.id));
        };
        let mut updated = user.clone();
        // Username and creation time are immutable once stored.
        updated.username = existing.username.clone();
        updated.created_at = existing.created_at;
        updated.updated_at = Utc::now();
        if let Some(reason) = inner.conflict(&updated) {
            return Err(RepoError::Conflict(reason));
        }
        inner.users.insert(updated.id, updated);
        Ok(())
    }
}
