use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::info;

use crate::{
    db::store::{CredentialStore, StoreError},
    models::user::{NewUser, RegisterRequest, Role, TokenPair, TokenResponse, UniqueField, UserDto},
    services::{
        metrics::{self, LOGINS_COUNTER, REGISTRATIONS_COUNTER, TOKEN_REFRESH_COUNTER, TOKEN_REVOCATIONS_COUNTER},
        password::PasswordHasher,
        tokens::{RedeemOutcome, TokenIssuer},
    },
};

/// Internal reason for a failed login. Never shown to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginRejection {
    UserNotFound,
    BadPassword,
}

#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(TokenResponse),
    Rejected(LoginRejection),
}

#[derive(Debug)]
pub enum RegisterOutcome {
    Created(UserDto),
    EmailTaken,
    UsernameTaken,
}

#[derive(Debug)]
pub enum RefreshOutcome {
    Refreshed(TokenPair),
    Unauthorized,
}

/// Orchestrates the credential store, password hasher and token issuer.
/// Expected business outcomes come back as enums; `Err` means something
/// unexpected (store unavailable, hashing failure).
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    issuer: Arc<TokenIssuer>,
}

impl AuthService {
    pub fn new(store: Arc<dyn CredentialStore>, issuer: Arc<TokenIssuer>, hasher: PasswordHasher) -> Self {
        Self { store, hasher, issuer }
    }

    /// `login` is an email address or a username.
    pub async fn login(&self, login: &str, password: &str) -> anyhow::Result<LoginOutcome> {
        let login = login.trim();

        let Some(user) = self.store.find_user_by_login(login).await? else {
            info!("Login rejected: no account matches the identifier");
            metrics::record(&LOGINS_COUNTER, "user_not_found");
            return Ok(LoginOutcome::Rejected(LoginRejection::UserNotFound));
        };

        let valid = self
            .hasher
            .verify_async(password.to_string(), user.password_hash.clone())
            .await?;
        if !valid {
            info!(user_id = user.id, "Login rejected: wrong password");
            metrics::record(&LOGINS_COUNTER, "bad_password");
            return Ok(LoginOutcome::Rejected(LoginRejection::BadPassword));
        }

        let now = Utc::now();
        self.store.touch_last_login(user.id, now).await?;

        let token = self.issuer.issue_session_token(&user)?;
        let refresh_token = self.issuer.issue_refresh_token(user.id).await?;

        info!(user_id = user.id, "User logged in");
        metrics::record(&LOGINS_COUNTER, "success");

        let mut user = user;
        user.last_login_at = now;
        Ok(LoginOutcome::Authenticated(TokenResponse {
            token,
            refresh_token,
            user: user.into(),
        }))
    }

    /// Creates the account with the `User` role. The insert and the role
    /// membership are one transaction; a missing role aborts both.
    pub async fn register(&self, req: &RegisterRequest) -> anyhow::Result<RegisterOutcome> {
        let email = req.email.trim().to_lowercase();
        let username = req.username.trim().to_string();

        if self.store.email_exists(&email).await? {
            metrics::record(&REGISTRATIONS_COUNTER, "email_taken");
            return Ok(RegisterOutcome::EmailTaken);
        }
        if self.store.username_exists(&username).await? {
            metrics::record(&REGISTRATIONS_COUNTER, "username_taken");
            return Ok(RegisterOutcome::UsernameTaken);
        }

        let password_hash = self.hasher.hash_async(req.password.clone()).await?;
        let new_user = NewUser {
            username,
            email,
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            password_hash,
        };

        // The pre-checks above race with concurrent registrations; the unique
        // constraints settle it.
        match self.store.create_user(new_user, Role::User).await {
            Ok(user) => {
                info!(user_id = user.id, "User registered");
                metrics::record(&REGISTRATIONS_COUNTER, "success");
                Ok(RegisterOutcome::Created(user.into()))
            }
            Err(StoreError::Duplicate(UniqueField::Email)) => {
                metrics::record(&REGISTRATIONS_COUNTER, "email_taken");
                Ok(RegisterOutcome::EmailTaken)
            }
            Err(StoreError::Duplicate(UniqueField::Username)) => {
                metrics::record(&REGISTRATIONS_COUNTER, "username_taken");
                Ok(RegisterOutcome::UsernameTaken)
            }
            Err(e) => {
                metrics::record(&REGISTRATIONS_COUNTER, "error");
                Err(e).context("Registration failed")
            }
        }
    }

    pub async fn refresh(&self, refresh_token: &str) -> anyhow::Result<RefreshOutcome> {
        match self.issuer.redeem(refresh_token).await? {
            RedeemOutcome::Rotated { user, tokens } => {
                info!(user_id = user.id, "Refresh token rotated");
                metrics::record(&TOKEN_REFRESH_COUNTER, "success");
                Ok(RefreshOutcome::Refreshed(tokens))
            }
            RedeemOutcome::Rejected(reason) => {
                info!("Refresh rejected: {reason:?}");
                metrics::record(&TOKEN_REFRESH_COUNTER, "rejected");
                Ok(RefreshOutcome::Unauthorized)
            }
        }
    }

    pub async fn revoke(&self, refresh_token: &str) -> anyhow::Result<bool> {
        let revoked = self.issuer.revoke(refresh_token).await?;
        metrics::record(
            &TOKEN_REVOCATIONS_COUNTER,
            if revoked { "success" } else { "not_found" },
        );
        Ok(revoked)
    }

    /// `false` when the user does not exist. Already-held roles are a no-op.
    pub async fn assign_role(&self, user_id: i64, role: Role) -> anyhow::Result<bool> {
        let assigned = self.store.assign_role(user_id, role).await?;
        if assigned {
            info!(user_id, role = %role, "Role assigned");
        }
        Ok(assigned)
    }

    pub async fn current_user(&self, user_id: i64) -> anyhow::Result<Option<UserDto>> {
        Ok(self.store.find_user_by_id(user_id).await?.map(UserDto::from))
    }
}
