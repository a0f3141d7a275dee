use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::store::{CredentialStore, StoreError};
use crate::models::{
    auth::{IssuedRefreshToken, RefreshToken},
    user::{NewUser, Role, UniqueField, User},
};

#[derive(Default)]
struct Tables {
    next_user_id: i64,
    next_token_id: i64,
    users: HashMap<i64, User>,
    roles: BTreeSet<Role>,
    user_roles: HashMap<i64, BTreeSet<Role>>,
    refresh_tokens: HashMap<String, RefreshToken>,
}

impl Tables {
    fn with_roles(&self, user: &User) -> User {
        let mut user = user.clone();
        user.roles = self
            .user_roles
            .get(&user.id)
            .map(|roles| roles.iter().copied().collect())
            .unwrap_or_default();
        user
    }

    fn insert_token(&mut self, user_id: i64, token: &IssuedRefreshToken) {
        self.next_token_id += 1;
        self.refresh_tokens.insert(
            token.token_hash.clone(),
            RefreshToken {
                id: self.next_token_id,
                user_id,
                token_hash: token.token_hash.clone(),
                issued_at: token.issued_at,
                expires_at: token.expires_at,
                revoked: false,
                revoked_at: None,
            },
        );
    }
}

/// Process-local credential store used when no database is configured and in
/// tests. A single lock guards all tables, so every operation is atomic.
#[derive(Default)]
pub struct MemoryCredentialStore {
    tables: Mutex<Tables>,
}

impl MemoryCredentialStore {
    /// A store with the seeded roles already present.
    pub fn new() -> Self {
        let tables = Tables {
            roles: Role::SEEDED.into_iter().collect(),
            ..Tables::default()
        };
        Self {
            tables: Mutex::new(tables),
        }
    }

    /// A store whose roles were never seeded. Registration against it must fail.
    pub fn without_roles() -> Self {
        Self::default()
    }

    /// Number of stored users; exposed for tests asserting no partial writes.
    pub async fn user_count(&self) -> usize {
        self.tables.lock().await.users.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn seed_roles(&self) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.roles.extend(Role::SEEDED);
        Ok(())
    }

    async fn find_user_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        let email = login.to_lowercase();
        let user = tables
            .users
            .values()
            .find(|u| u.email == email)
            .or_else(|| tables.users.values().find(|u| u.username == login));
        Ok(user.map(|u| tables.with_roles(u)))
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.get(&id).map(|u| tables.with_roles(u)))
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let email = email.to_lowercase();
        let tables = self.tables.lock().await;
        Ok(tables.users.values().any(|u| u.email == email))
    }

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().any(|u| u.username == username))
    }

    async fn create_user(&self, new_user: NewUser, role: Role) -> Result<User, StoreError> {
        let mut tables = self.tables.lock().await;
        let email = new_user.email.to_lowercase();

        if tables.users.values().any(|u| u.email == email) {
            return Err(StoreError::Duplicate(UniqueField::Email));
        }
        if tables.users.values().any(|u| u.username == new_user.username) {
            return Err(StoreError::Duplicate(UniqueField::Username));
        }
        if !tables.roles.contains(&role) {
            return Err(StoreError::MissingRole(role));
        }

        tables.next_user_id += 1;
        let now = Utc::now();
        let user = User {
            id: tables.next_user_id,
            username: new_user.username,
            email,
            password_hash: new_user.password_hash,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            profile_image_url: None,
            bio: None,
            created_at: now,
            updated_at: now,
            last_login_at: now,
            roles: Vec::new(),
        };
        tables.users.insert(user.id, user.clone());
        tables.user_roles.entry(user.id).or_default().insert(role);
        Ok(tables.with_roles(&user))
    }

    async fn touch_last_login(&self, user_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(user) = tables.users.get_mut(&user_id) {
            user.last_login_at = at;
        }
        Ok(())
    }

    async fn assign_role(&self, user_id: i64, role: Role) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&user_id) {
            return Ok(false);
        }
        if !tables.roles.contains(&role) {
            return Err(StoreError::MissingRole(role));
        }
        tables.user_roles.entry(user_id).or_default().insert(role);
        Ok(true)
    }

    async fn insert_refresh_token(
        &self,
        user_id: i64,
        token: &IssuedRefreshToken,
    ) -> Result<(), StoreError> {
        self.tables.lock().await.insert_token(user_id, token);
        Ok(())
    }

    async fn find_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.tables.lock().await.refresh_tokens.get(token_hash).cloned())
    }

    async fn rotate_refresh_token(
        &self,
        token_hash: &str,
        replacement: &IssuedRefreshToken,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, StoreError> {
        let mut tables = self.tables.lock().await;
        let user_id = match tables.refresh_tokens.get_mut(token_hash) {
            Some(token) if token.is_active(now) => {
                token.revoked = true;
                token.revoked_at = Some(now);
                token.user_id
            }
            _ => return Ok(None),
        };
        tables.insert_token(user_id, replacement);
        Ok(Some(user_id))
    }

    async fn revoke_refresh_token(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.refresh_tokens.get_mut(token_hash) {
            Some(token) => {
                token.revoked = true;
                token.revoked_at.get_or_insert(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
