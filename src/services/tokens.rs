use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{
    config::AuthConfig,
    db::store::CredentialStore,
    models::{
        auth::{AuthenticatedUser, IssuedRefreshToken, SessionClaims},
        user::{TokenPair, User},
    },
};

/// Why a refresh token was not redeemed. Only ever logged; callers see a
/// single "unauthorized" outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemRejection {
    Unknown,
    Revoked,
    Expired,
}

#[derive(Debug)]
pub enum RedeemOutcome {
    Rotated { user: User, tokens: TokenPair },
    Rejected(RedeemRejection),
}

/// 32 random bytes from the OS generator, base64 encoded.
pub fn generate_refresh_value() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

/// Storage key of a refresh token: lowercase hex SHA-256 of the opaque value.
pub fn fingerprint(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Mints signed session tokens and opaque single-use refresh tokens.
pub struct TokenIssuer {
    store: Arc<dyn CredentialStore>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    session_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    /// Fails only on misconfiguration; callers treat that as fatal at startup.
    pub fn new(config: &AuthConfig, store: Arc<dyn CredentialStore>) -> anyhow::Result<Self> {
        if config.signing_key.is_empty() {
            anyhow::bail!("Session token signing key is empty");
        }
        if config.session_ttl_hours <= 0 || config.refresh_ttl_days <= 0 {
            anyhow::bail!("Token lifetimes must be positive");
        }
        Ok(Self {
            store,
            encoding_key: EncodingKey::from_secret(config.signing_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.signing_key.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            session_ttl: Duration::hours(config.session_ttl_hours),
            refresh_ttl: Duration::days(config.refresh_ttl_days),
        })
    }

    pub fn issue_session_token(&self, user: &User) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user.id.to_string(),
            name: user.username.clone(),
            email: user.email.clone(),
            roles: user.roles.clone(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: (now + self.session_ttl).timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Stateless check: signature, expiry, issuer and audience.
    pub fn validate_session_token(&self, token: &str) -> anyhow::Result<AuthenticatedUser> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        let claims = decode::<SessionClaims>(token, &self.decoding_key, &validation)?.claims;
        Ok(AuthenticatedUser {
            user_id: claims.sub.parse()?,
            username: claims.name,
            email: claims.email,
            roles: claims.roles,
        })
    }

    fn mint_refresh(&self) -> (String, IssuedRefreshToken) {
        let value = generate_refresh_value();
        let now = Utc::now();
        let issued = IssuedRefreshToken {
            token_hash: fingerprint(&value),
            issued_at: now,
            expires_at: now + self.refresh_ttl,
        };
        (value, issued)
    }

    pub async fn issue_refresh_token(&self, user_id: i64) -> anyhow::Result<String> {
        let (value, issued) = self.mint_refresh();
        self.store.insert_refresh_token(user_id, &issued).await?;
        Ok(value)
    }

    /// Exchanges a refresh token for a new session token and refresh token.
    /// The presented token is revoked in the same step, so it can be redeemed
    /// at most once even under concurrent calls.
    pub async fn redeem(&self, value: &str) -> anyhow::Result<RedeemOutcome> {
        let hash = fingerprint(value);
        let now = Utc::now();
        let (new_value, replacement) = self.mint_refresh();

        let Some(user_id) = self
            .store
            .rotate_refresh_token(&hash, &replacement, now)
            .await?
        else {
            let reason = match self.store.find_refresh_token(&hash).await? {
                None => RedeemRejection::Unknown,
                Some(t) if t.revoked => RedeemRejection::Revoked,
                Some(_) => RedeemRejection::Expired,
            };
            debug!("Refresh token rejected: {reason:?}");
            return Ok(RedeemOutcome::Rejected(reason));
        };

        // Tokens cascade with their user, so this only misses on a concurrent delete.
        let Some(user) = self.store.find_user_by_id(user_id).await? else {
            self.store.revoke_refresh_token(&replacement.token_hash, now).await?;
            return Ok(RedeemOutcome::Rejected(RedeemRejection::Unknown));
        };

        let token = self.issue_session_token(&user)?;
        Ok(RedeemOutcome::Rotated {
            user,
            tokens: TokenPair {
                token,
                refresh_token: new_value,
            },
        })
    }

    /// `false` when no such token exists. Revoking twice is not an error.
    pub async fn revoke(&self, value: &str) -> anyhow::Result<bool> {
        let revoked = self
            .store
            .revoke_refresh_token(&fingerprint(value), Utc::now())
            .await?;
        Ok(revoked)
    }
}
