use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;

use super::store::{CredentialStore, StoreError};
use crate::models::{
    auth::{IssuedRefreshToken, RefreshToken},
    user::{NewUser, Role, UniqueField, User},
};

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name,
    profile_image_url, bio, created_at, updated_at, last_login_at";

pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_roles(&self, user: &mut User) -> Result<(), StoreError> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT r.name FROM roles r
             JOIN user_roles ur ON ur.role_id = r.id
             WHERE ur.user_id = $1
             ORDER BY r.name",
        )
        .bind(user.id)
        .fetch_all(&self.pool)
        .await?;

        user.roles = names
            .iter()
            .filter_map(|name| match name.parse::<Role>() {
                Ok(role) => Some(role),
                Err(_) => {
                    warn!("Ignoring unknown role {name:?} on user {}", user.id);
                    None
                }
            })
            .collect();
        Ok(())
    }
}

/// Maps unique-constraint violations on `users` to the colliding field.
fn map_user_insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            match db_err.constraint() {
                Some("users_email_key") => return StoreError::Duplicate(UniqueField::Email),
                Some("users_username_key") => return StoreError::Duplicate(UniqueField::Username),
                _ => {}
            }
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn seed_roles(&self) -> Result<(), StoreError> {
        for role in Role::SEEDED {
            sqlx::query(
                "INSERT INTO roles (name, description) VALUES ($1, $2)
                 ON CONFLICT (name) DO NOTHING",
            )
            .bind(role.as_str())
            .bind(role.description())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn find_user_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE email = LOWER($1) OR username = $1
             ORDER BY (email = LOWER($1)) DESC
             LIMIT 1"
        ))
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        match user {
            Some(mut user) => {
                self.load_roles(&mut user).await?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match user {
            Some(mut user) => {
                self.load_roles(&mut user).await?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = LOWER($1))")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn create_user(&self, new_user: NewUser, role: Role) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email, first_name, last_name, password_hash)
             VALUES ($1, LOWER($2), $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&new_user.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_user_insert_error)?;

        let assigned = sqlx::query(
            "INSERT INTO user_roles (user_id, role_id)
             SELECT $1, id FROM roles WHERE name = $2",
        )
        .bind(user.id)
        .bind(role.as_str())
        .execute(&mut *tx)
        .await?;

        // Dropping `tx` without commit rolls the user insert back.
        if assigned.rows_affected() == 0 {
            return Err(StoreError::MissingRole(role));
        }

        tx.commit().await?;
        user.roles = vec![role];
        Ok(user)
    }

    async fn touch_last_login(&self, user_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login_at = $1 WHERE id = $2")
            .bind(at)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn assign_role(&self, user_id: i64, role: Role) -> Result<bool, StoreError> {
        let user_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        if !user_exists {
            return Ok(false);
        }

        let result = sqlx::query(
            "INSERT INTO user_roles (user_id, role_id)
             SELECT $1, id FROM roles WHERE name = $2
             ON CONFLICT (user_id, role_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Either already assigned, or the role row is missing.
            let role_exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM roles WHERE name = $1)")
                    .bind(role.as_str())
                    .fetch_one(&self.pool)
                    .await?;
            if !role_exists {
                return Err(StoreError::MissingRole(role));
            }
        }
        Ok(true)
    }

    async fn insert_refresh_token(
        &self,
        user_id: i64,
        token: &IssuedRefreshToken,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token_hash, issued_at, expires_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(&token.token_hash)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshToken>, StoreError> {
        let token = sqlx::query_as::<_, RefreshToken>(
            "SELECT id, user_id, token_hash, issued_at, expires_at, revoked, revoked_at
             FROM refresh_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn rotate_refresh_token(
        &self,
        token_hash: &str,
        replacement: &IssuedRefreshToken,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Single conditional update: concurrent callers serialize on the row lock
        // and all but the first see `revoked = TRUE` when the predicate is rechecked.
        let user_id: Option<i64> = sqlx::query_scalar(
            "UPDATE refresh_tokens SET revoked = TRUE, revoked_at = $2
             WHERE token_hash = $1 AND revoked = FALSE AND expires_at > $2
             RETURNING user_id",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user_id) = user_id else {
            return Ok(None);
        };

        sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token_hash, issued_at, expires_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(&replacement.token_hash)
        .bind(replacement.issued_at)
        .bind(replacement.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(user_id))
    }

    async fn revoke_refresh_token(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens
             SET revoked = TRUE, revoked_at = COALESCE(revoked_at, $2)
             WHERE token_hash = $1",
        )
        .bind(token_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
