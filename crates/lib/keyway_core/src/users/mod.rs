//! User persistence contract and identity reconciliation.
//!
//! `UserRepository` is the single seam between the authentication core and
//! storage. Lookups return `Ok(None)` for a missing user so that "not found"
//! is never confused with a storage failure.

pub mod memory;
pub mod postgres;
pub mod reconcile;
pub mod validate;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::user::{NewUser, User};

pub use memory::MemoryUserRepository;
pub use postgres::PgUserRepository;
pub use reconcile::{IdentityReconciler, ReconcileError};

/// Repository errors.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("User not found: {0}")]
    NotFound(i64),

    #[error("Invalid record: {0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Storage operations the authentication core needs on user records.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn exists_by_username(&self, username: &str) -> Result<bool, RepoError>;

    async fn exists_by_email(&self, email: &str) -> Result<bool, RepoError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError>;

    async fn find_by_external_id(&self, external_id: i64) -> Result<Option<User>, RepoError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;

    /// Insert a new user. Unique-key collisions are `RepoError::Conflict`.
    async fn create(&self, user: NewUser) -> Result<User, RepoError>;

    /// Persist the mutable fields of an existing user and bump `updated_at`.
    async fn update(&self, user: &User) -> Result<(), RepoError>;
}
