use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    auth::{IssuedRefreshToken, RefreshToken},
    user::{NewUser, Role, UniqueField, User},
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} is already registered")]
    Duplicate(UniqueField),

    #[error("role {0} has not been seeded")]
    MissingRole(Role),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Persisted users, role memberships and refresh tokens.
///
/// Every method that changes more than one row is atomic: either all of its
/// writes land or none do.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Connectivity probe for the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Idempotently inserts the seeded roles.
    async fn seed_roles(&self) -> Result<(), StoreError>;

    /// Looks a user up by email (case-insensitive) or username, roles included.
    async fn find_user_by_login(&self, login: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError>;

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError>;

    /// Inserts the user and its first role membership in one transaction.
    /// Fails with `MissingRole` (and inserts nothing) if `role` was never seeded.
    async fn create_user(&self, user: NewUser, role: Role) -> Result<User, StoreError>;

    async fn touch_last_login(&self, user_id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Adds a role membership. `Ok(false)` when the user does not exist;
    /// assigning a role the user already holds is a no-op.
    async fn assign_role(&self, user_id: i64, role: Role) -> Result<bool, StoreError>;

    async fn insert_refresh_token(
        &self,
        user_id: i64,
        token: &IssuedRefreshToken,
    ) -> Result<(), StoreError>;

    async fn find_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshToken>, StoreError>;

    /// Revokes `token_hash` only if it is still active at `now` and, in the same
    /// transaction, stores `replacement` for the same user. Returns that user's
    /// id, or `None` when the token was unknown, revoked or expired. Of any
    /// number of concurrent calls for one hash, at most one returns `Some`.
    async fn rotate_refresh_token(
        &self,
        token_hash: &str,
        replacement: &IssuedRefreshToken,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, StoreError>;

    /// Marks the token revoked. `Ok(false)` if no such token exists; revoking an
    /// already revoked token succeeds.
    async fn revoke_refresh_token(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, StoreError>;
}
