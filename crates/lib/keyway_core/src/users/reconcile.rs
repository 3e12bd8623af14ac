//! Identity reconciliation — map a delegated identity onto a local user.
//!
//! Lookup order: linked external ID, then email (account linking), then a
//! new delegated account. A username collision on creation is resolved by
//! suffixing the external ID, so retries land on the same name.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use super::{RepoError, UserRepository};
use crate::models::auth::ExternalIdentity;
use crate::models::user::{AuthKind, NewUser, User};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Reconciliation failed: {0}")]
    Failed(#[from] RepoError),

    /// The identity's email belongs to an account bound to another external ID.
    #[error("Account {user_id} is already linked to another external identity")]
    LinkedElsewhere { user_id: i64 },
}

/// Deterministic fallback username for a taken login name.
pub fn disambiguated_username(login: &str, external_id: i64) -> String {
    format!("{login}_{external_id}")
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

pub struct IdentityReconciler {
    users: Arc<dyn UserRepository>,
}

impl IdentityReconciler {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// Return the local user for `identity`, linking or creating as needed.
    pub async fn reconcile(&self, identity: &ExternalIdentity) -> Result<User, ReconcileError> {
        let avatar = non_empty(&identity.avatar_url).map(str::to_string);

        if let Some(mut user) = self.users.find_by_external_id(identity.id).await? {
            user.avatar_url = avatar;
            self.users.update(&user).await?;
            info!(user_id = user.id, external_id = identity.id, "delegated login matched linked account");
            return Ok(user);
        }

        if let Some(email) = non_empty(&identity.email)
            && let Some(mut user) = self.users.find_by_email(email).await?
        {
            if user.external_id.is_some_and(|linked| linked != identity.id) {
                warn!(
                    user_id = user.id,
                    external_id = identity.id,
                    "email matches an account linked to another identity"
                );
                return Err(ReconcileError::LinkedElsewhere { user_id: user.id });
            }
            user.external_id = Some(identity.id);
            user.auth_kind = AuthKind::Delegated;
            user.avatar_url = avatar;
            self.users.update(&user).await?;
            info!(
                user_id = user.id,
                external_id = identity.id,
                "linked delegated identity to existing account by email"
            );
            return Ok(user);
        }

        let mut username = identity.login.clone();
        if self.users.exists_by_username(&username).await? {
            username = disambiguated_username(&identity.login, identity.id);
            warn!(
                login = %identity.login,
                username = %username,
                "login name taken, using disambiguated username"
            );
        }

        let user = self
            .users
            .create(NewUser::delegated(
                &username,
                identity.id,
                non_empty(&identity.email),
                avatar.as_deref(),
            ))
            .await?;
        info!(user_id = user.id, username = %user.username, "created delegated account");
        Ok(user)
    }
}
