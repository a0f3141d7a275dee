use axum::http::{header, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    client::CallContext,
    config::FrontendConfig,
    models::user::{TokenResponse, UserDto},
};

pub const SESSION_COOKIE: &str = "MusicApp.Auth";

/// Lifetime of the cookie payload; matches the refresh token.
const SESSION_DAYS: i64 = 7;

/// Signed browser-side session: the user, the roles and the current API tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPrincipal {
    pub sub: i64,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    pub token: String,
    pub refresh_token: String,
    /// "Remember me": the cookie outlives the browser session.
    pub persistent: bool,
    pub iat: i64,
    pub exp: i64,
}

impl AuthPrincipal {
    pub fn from_login(response: &TokenResponse, persistent: bool) -> Self {
        let now = Utc::now();
        Self {
            sub: response.user.id,
            username: response.user.username.clone(),
            email: response.user.email.clone(),
            roles: response.user.roles.clone(),
            token: response.token.clone(),
            refresh_token: response.refresh_token.clone(),
            persistent,
            iat: now.timestamp(),
            exp: (now + Duration::days(SESSION_DAYS)).timestamp(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Call context that attaches this session's token and refreshes it when needed.
    pub fn call_context(&self) -> CallContext {
        CallContext::server_side(&self.token, &self.refresh_token)
    }

    /// A new principal reflecting tokens rotated during `ctx` and a freshly
    /// loaded profile. `None` when nothing changed, so the cookie stays as is.
    pub fn reconcile(&self, ctx: &CallContext, profile: Option<&UserDto>) -> Option<AuthPrincipal> {
        let mut next = self.clone();

        if let Some(pair) = ctx.rotated() {
            next.token = pair.token;
            if !pair.refresh_token.is_empty() {
                next.refresh_token = pair.refresh_token;
            }
        }
        if let Some(profile) = profile {
            next.username = profile.username.clone();
            next.email = profile.email.clone();
            if !profile.roles.is_empty() {
                next.roles = profile.roles.clone();
            }
        }

        if next == *self {
            return None;
        }
        next.iat = Utc::now().timestamp();
        Some(next)
    }
}

/// Extract a named cookie value from request headers.
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|part| part.trim().strip_prefix(&prefix).map(str::to_string))
}

/// Issues and reads the session cookie. Cookies are never edited: any change
/// to the principal produces a whole new signed cookie.
pub struct SessionBridge {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    secure: bool,
}

impl SessionBridge {
    pub fn new(config: &FrontendConfig) -> anyhow::Result<Self> {
        if config.session_cookie_key.is_empty() {
            anyhow::bail!("Session cookie key is empty");
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.session_cookie_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.session_cookie_key.as_bytes()),
            secure: config.session_cookie_secure,
        })
    }

    fn attributes(&self) -> &'static str {
        if self.secure {
            "HttpOnly; Secure; SameSite=Lax; Path=/"
        } else {
            "HttpOnly; SameSite=Lax; Path=/"
        }
    }

    /// `Set-Cookie` value carrying the signed principal.
    pub fn issue(&self, principal: &AuthPrincipal) -> anyhow::Result<String> {
        let value = encode(&Header::new(Algorithm::HS256), principal, &self.encoding_key)?;
        let mut cookie = format!("{SESSION_COOKIE}={value}; {}", self.attributes());
        if principal.persistent {
            cookie.push_str(&format!("; Max-Age={}", Duration::days(SESSION_DAYS).num_seconds()));
        }
        Ok(cookie)
    }

    /// `Set-Cookie` value that removes the session.
    pub fn clear(&self) -> String {
        format!("{SESSION_COOKIE}=; {}; Max-Age=0", self.attributes())
    }

    /// The principal of a request, if it carries a valid, unexpired cookie.
    pub fn read(&self, headers: &HeaderMap) -> Option<AuthPrincipal> {
        let value = get_cookie(headers, SESSION_COOKIE)?;
        let validation = Validation::new(Algorithm::HS256);

        match decode::<AuthPrincipal>(&value, &self.decoding_key, &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::debug!("Ignoring invalid session cookie: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn bridge(key: &str) -> SessionBridge {
        SessionBridge::new(&FrontendConfig {
            session_cookie_key: key.into(),
            ..FrontendConfig::default()
        })
        .unwrap()
    }

    fn login_response() -> TokenResponse {
        TokenResponse {
            token: "session-token".into(),
            refresh_token: "refresh-token".into(),
            user: UserDto {
                id: 7,
                username: "listener".into(),
                email: "listener@example.com".into(),
                roles: vec!["User".into()],
                ..UserDto::default()
            },
        }
    }

    fn headers_with(set_cookie: &str) -> HeaderMap {
        // Echo the name=value part back as a browser would.
        let pair = set_cookie.split(';').next().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {pair}")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_cookie_round_trip() {
        let bridge = bridge("cookie-key-for-tests");
        let principal = AuthPrincipal::from_login(&login_response(), false);
        let cookie = bridge.issue(&principal).unwrap();

        assert!(cookie.starts_with("MusicApp.Auth="));
        assert!(cookie.contains("HttpOnly") && cookie.contains("SameSite=Lax"));
        assert!(!cookie.contains("Max-Age"));

        let read = bridge.read(&headers_with(&cookie)).unwrap();
        assert_eq!(read, principal);
        assert!(read.has_role("User"));
    }

    #[test]
    fn test_persistent_cookie_has_max_age() {
        let bridge = bridge("cookie-key-for-tests");
        let principal = AuthPrincipal::from_login(&login_response(), true);
        let cookie = bridge.issue(&principal).unwrap();
        assert!(cookie.ends_with("Max-Age=604800"));
    }

    #[test]
    fn test_cookie_signed_with_other_key_is_ignored() {
        let cookie = bridge("key-one")
            .issue(&AuthPrincipal::from_login(&login_response(), false))
            .unwrap();
        assert!(bridge("key-two").read(&headers_with(&cookie)).is_none());
    }

    #[test]
    fn test_reconcile_only_when_something_changed() {
        let principal = AuthPrincipal::from_login(&login_response(), false);
        let ctx = principal.call_context();
        let same = login_response().user;
        assert!(principal.reconcile(&ctx, Some(&same)).is_none());

        let renamed = UserDto {
            username: "renamed".into(),
            ..same
        };
        let next = principal.reconcile(&ctx, Some(&renamed)).unwrap();
        assert_eq!(next.username, "renamed");
        assert_eq!(next.token, principal.token);
    }

    #[test]
    fn test_clear_cookie_expires_immediately() {
        assert!(bridge("k").clear().contains("Max-Age=0"));
    }
}
