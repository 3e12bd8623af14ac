//! Postgres-backed user repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{RepoError, UserRepository};
use crate::models::user::{AuthKind, NewUser, User};

const USER_COLUMNS: &str = "id, username, password_hash, email, external_id, avatar_url, \
                            auth_kind, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: Option<String>,
    email: Option<String>,
    external_id: Option<i64>,
    avatar_url: Option<String>,
    auth_kind: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepoError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let auth_kind = AuthKind::from_db(&row.auth_kind)
            .ok_or_else(|| RepoError::Invalid(format!("unknown auth_kind '{}'", row.auth_kind)))?;
        Ok(User {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            email: row.email,
            external_id: row.external_id,
            avatar_url: row.avatar_url,
            auth_kind,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Map unique/check violations to domain errors; everything else is a database error.
fn classify(e: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            let target = db.constraint().unwrap_or("users").to_string();
            return RepoError::Conflict(format!("unique constraint {target}"));
        }
        if db.is_check_violation() {
            return RepoError::Invalid(db.message().to_string());
        }
    }
    RepoError::Database(e)
}

/// `UserRepository` over the `users` table.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, filter: &str, bind: FilterValue<'_>) -> Result<Option<User>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {filter} = $1");
        let query = sqlx::query_as::<_, UserRow>(&sql);
        let row = match bind {
            FilterValue::Text(v) => query.bind(v).fetch_optional(&self.pool).await?,
            FilterValue::Int(v) => query.bind(v).fetch_optional(&self.pool).await?,
        };
        row.map(User::try_from).transpose()
    }
}

enum FilterValue<'a> {
    Text(&'a str),
    Int(i64),
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn exists_by_username(&self, username: &str) -> Result<bool, RepoError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, RepoError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        self.find_one("username", FilterValue::Text(username)).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError> {
        self.find_one("id", FilterValue::Int(id)).await
    }

    async fn find_by_external_id(&self, external_id: i64) -> Result<Option<User>, RepoError> {
        self.find_one("external_id", FilterValue::Int(external_id))
            .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        self.find_one("email", FilterValue::Text(email)).await
    }

    async fn create(&self, user: NewUser) -> Result<User, RepoError> {
        if !user.has_valid_credentials() {
            return Err(RepoError::Invalid(
                "local account requires a password hash".into(),
            ));
        }
        let sql = format!(
            "INSERT INTO users (username, password_hash, email, external_id, avatar_url, auth_kind) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.email)
            .bind(user.external_id)
            .bind(&user.avatar_url)
            .bind(user.auth_kind.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        User::try_from(row)
    }

    async fn update(&self, user: &User) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, email = $3, external_id = $4, \
             avatar_url = $5, auth_kind = $6, updated_at = now() \
             WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(user.external_id)
        .bind(&user.avatar_url)
        .bind(user.auth_kind.as_str())
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound(user.id));
        }
        Ok(())
    }
}
