//! HTTP client used by the frontend and the command-line tool to talk to the
//! auth API: bearer resolution, a single silent refresh on 401, and envelope
//! unwrapping.

pub mod envelope;
pub mod error;
pub mod tokens;

use std::{sync::Arc, time::Duration};

use reqwest::{header, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::models::user::TokenPair;
use envelope::{Envelope, IssuedTokens};
pub use error::ApiError;
use tokens::{ClaimTokens, StoredTokens, TokenSlot, TokenSource, TokenStore};

const REFRESH_PATH: &str = "api/auth/refresh-token";

/// Endpoints that establish credentials. They never carry a bearer and a 401
/// from them never triggers a silent refresh; tokens they return are still
/// persisted.
const CREDENTIAL_PATHS: [&str; 3] = ["api/auth/login", "api/auth/register", REFRESH_PATH];

fn is_credential_path(path: &str) -> bool {
    let path = path.trim_start_matches('/');
    let path = path.split('?').next().unwrap_or(path).trim_end_matches('/');
    CREDENTIAL_PATHS.contains(&path)
}

/// Where tokens for one logical request (or one CLI session) are read from
/// and written to.
#[derive(Clone, Default)]
pub struct CallContext {
    store: Option<Arc<dyn TokenStore>>,
    slot: TokenSlot,
    claims: Option<ClaimTokens>,
}

impl CallContext {
    /// No credentials. Tokens returned by a call (e.g. login) still land in the slot.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Pure client mode: tokens live in a persisted store.
    pub fn client_side(store: Arc<dyn TokenStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::default()
        }
    }

    /// Server-rendered mode: tokens come from the session cookie claims.
    pub fn server_side(token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            claims: Some(ClaimTokens {
                token: token.into(),
                refresh_token: refresh_token.into(),
            }),
            ..Self::default()
        }
    }

    fn sources(&self) -> Vec<&dyn TokenSource> {
        let mut sources: Vec<&dyn TokenSource> = Vec::with_capacity(3);
        if let Some(store) = &self.store {
            sources.push(store);
        }
        sources.push(&self.slot);
        if let Some(claims) = &self.claims {
            sources.push(claims);
        }
        sources
    }

    pub fn bearer_token(&self) -> Option<String> {
        if self.slot.is_signed_out() {
            return None;
        }
        self.sources().into_iter().find_map(|s| s.try_get())
    }

    pub fn refresh_token(&self) -> Option<String> {
        if self.slot.is_signed_out() {
            return None;
        }
        self.sources().into_iter().find_map(|s| s.try_get_refresh())
    }

    /// Tokens obtained while this context was in use, if any.
    pub fn rotated(&self) -> Option<TokenPair> {
        let tokens = self.slot.get();
        Some(TokenPair {
            token: tokens.token?,
            refresh_token: tokens.refresh_token.unwrap_or_default(),
        })
    }

    pub fn signed_out(&self) -> bool {
        self.slot.is_signed_out()
    }

    fn persist(&self, issued: IssuedTokens) {
        let tokens = StoredTokens {
            refresh_token: issued.refresh_token.or_else(|| self.refresh_token()),
            token: Some(issued.token),
        };
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&tokens) {
                warn!("Failed to persist tokens: {e:#}");
            }
        }
        self.slot.set(tokens);
    }

    fn clear(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                warn!("Failed to clear stored tokens: {e:#}");
            }
        }
        self.slot.sign_out();
    }
}

/// Thin wrapper over `reqwest::Client`. Dropping a returned future aborts the
/// outbound request; nothing is persisted from a call that did not complete.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get<T>(&self, ctx: &CallContext, path: &str) -> Result<T, ApiError>
    where
        T: DeserializeOwned + Default,
    {
        self.send(ctx, Method::GET, path, None::<&()>).await
    }

    pub async fn post<B, T>(&self, ctx: &CallContext, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Default,
    {
        self.send(ctx, Method::POST, path, Some(body)).await
    }

    pub async fn put<B, T>(&self, ctx: &CallContext, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Default,
    {
        self.send(ctx, Method::PUT, path, Some(body)).await
    }

    pub async fn delete<T>(&self, ctx: &CallContext, path: &str) -> Result<T, ApiError>
    where
        T: DeserializeOwned + Default,
    {
        self.send(ctx, Method::DELETE, path, None::<&()>).await
    }

    async fn send<B, T>(
        &self,
        ctx: &CallContext,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Default,
    {
        let bearer = if is_credential_path(path) {
            None
        } else {
            ctx.bearer_token()
        };

        let mut request = self
            .http
            .request(method.clone(), self.url(path))
            .header(header::ACCEPT, "application/json");
        if let Some(token) = &bearer {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        debug!(%method, path, %status, "API call completed");

        if status == StatusCode::UNAUTHORIZED {
            let message = envelope::error_message(&bytes);
            // Nothing to refresh: a failed login, or a call made without a session.
            if bearer.is_none() {
                return Err(ApiError::Unauthorized {
                    message,
                    refreshed: false,
                });
            }
            if self.try_refresh(ctx).await {
                return Err(ApiError::Unauthorized {
                    message,
                    refreshed: true,
                });
            }
            ctx.clear();
            return Err(ApiError::SessionExpired {
                redirect: error::LOGIN_REDIRECT.to_string(),
            });
        }

        if !status.is_success() {
            return Err(ApiError::Status {
                status,
                message: envelope::error_message(&bytes),
            });
        }

        if status == StatusCode::NO_CONTENT || envelope::is_blank(&bytes) {
            return Ok(T::default());
        }

        match envelope::decode::<T>(status, &bytes)? {
            Envelope::Failure { status, message } => Err(ApiError::Rejected { status, message }),
            Envelope::Success { value, tokens } => {
                if let Some(tokens) = tokens {
                    ctx.persist(tokens);
                }
                Ok(value)
            }
        }
    }

    /// One attempt to exchange the context's refresh token. Returns whether
    /// new tokens were stored.
    async fn try_refresh(&self, ctx: &CallContext) -> bool {
        let Some(refresh_token) = ctx.refresh_token() else {
            return false;
        };

        let result = self
            .http
            .post(self.url(REFRESH_PATH))
            .header(header::ACCEPT, "application/json")
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await;

        let response = match result {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(status = %r.status(), "Silent token refresh rejected");
                return false;
            }
            Err(e) => {
                warn!("Silent token refresh failed: {e}");
                return false;
            }
        };

        match response.json::<TokenPair>().await {
            Ok(pair) if !pair.token.is_empty() => {
                ctx.persist(IssuedTokens {
                    token: pair.token,
                    refresh_token: Some(pair.refresh_token).filter(|t| !t.is_empty()),
                });
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!("Silent token refresh returned an unreadable body: {e}");
                false
            }
        }
    }
}
