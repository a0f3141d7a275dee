use std::env;

use tracing::warn;

pub const DEFAULT_JWT_KEY: &str = "MusicAppSecretKey12345678901234567890";
pub const DEFAULT_JWT_ISSUER: &str = "MusicAppIssuer";
pub const DEFAULT_JWT_AUDIENCE: &str = "MusicAppAudience";
const DEFAULT_SESSION_COOKIE_KEY: &str = "MusicAppCookieKey12345678901234567890";

/// Backend (JSON API) configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs the API on the in-memory credential store.
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub frontend_origin: String,
    pub auth: AuthConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "5117".into())
                .parse()?,
            frontend_origin: env::var("FRONTEND_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5085".into()),
            auth: AuthConfig::from_env()?,
        })
    }
}

/// Everything the token issuer and password hasher need. Built once at startup
/// and handed to the services by value, so tests can run with isolated keys.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub signing_key: String,
    pub issuer: String,
    pub audience: String,
    pub session_ttl_hours: i64,
    pub refresh_ttl_days: i64,
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signing_key: DEFAULT_JWT_KEY.into(),
            issuer: DEFAULT_JWT_ISSUER.into(),
            audience: DEFAULT_JWT_AUDIENCE.into(),
            session_ttl_hours: 24,
            refresh_ttl_days: 7,
            bcrypt_cost: 12,
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            signing_key: with_fallback("JWT_KEY", &defaults.signing_key),
            issuer: with_fallback("JWT_ISSUER", &defaults.issuer),
            audience: with_fallback("JWT_AUDIENCE", &defaults.audience),
            session_ttl_hours: env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".into())
                .parse()?,
            refresh_ttl_days: env::var("REFRESH_TOKEN_EXPIRY_DAYS")
                .unwrap_or_else(|_| "7".into())
                .parse()?,
            bcrypt_cost: env::var("BCRYPT_COST")
                .unwrap_or_else(|_| "12".into())
                .parse()?,
        })
    }
}

/// Frontend (session bridge) configuration.
#[derive(Debug, Clone)]
pub struct FrontendConfig {
    pub api_base_url: String,
    pub host: String,
    pub port: u16,
    pub session_cookie_key: String,
    pub session_cookie_secure: bool,
    pub api_timeout_seconds: u64,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5117".into(),
            host: "0.0.0.0".into(),
            port: 5085,
            session_cookie_key: DEFAULT_SESSION_COOKIE_KEY.into(),
            session_cookie_secure: true,
            api_timeout_seconds: 30,
        }
    }
}

impl FrontendConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            api_base_url: env::var("API_BASE_URL").unwrap_or(defaults.api_base_url),
            host: env::var("FRONTEND_HOST").unwrap_or(defaults.host),
            port: env::var("FRONTEND_PORT")
                .unwrap_or_else(|_| "5085".into())
                .parse()?,
            session_cookie_key: with_fallback("SESSION_COOKIE_KEY", &defaults.session_cookie_key),
            session_cookie_secure: env::var("SESSION_COOKIE_SECURE")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            api_timeout_seconds: env::var("API_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "30".into())
                .parse()?,
        })
    }
}

/// Reads `key`, falling back to a fixed development value. The fallback is kept
/// for compatibility with existing deployments but is unsafe in production.
fn with_fallback(key: &str, fallback: &str) -> String {
    match env::var(key) {
        Ok(value) => value,
        Err(_) => {
            warn!("{key} is not set; falling back to the built-in development value");
            fallback.to_string()
        }
    }
}
