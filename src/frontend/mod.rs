//! Server-rendered frontend surface: the session cookie bridge and the
//! account endpoints that drive it through the API client.

pub mod account;
pub mod session;

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::Redirect,
    routing::{get, post},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::{client::ApiClient, config::FrontendConfig, errors};
use session::{AuthPrincipal, SessionBridge};

/// Where anonymous visitors of a signed-in page are sent.
pub const LOGIN_PAGE: &str = "/Home/Index?authModal=login";

#[derive(Clone)]
pub struct FrontendState {
    pub config: Arc<FrontendConfig>,
    pub api: ApiClient,
    pub sessions: Arc<SessionBridge>,
}

impl FrontendState {
    pub fn new(config: FrontendConfig) -> anyhow::Result<Self> {
        let api = ApiClient::new(
            &config.api_base_url,
            std::time::Duration::from_secs(config.api_timeout_seconds),
        )?;
        let sessions = Arc::new(SessionBridge::new(&config)?);
        Ok(Self {
            config: Arc::new(config),
            api,
            sessions,
        })
    }
}

/// Extractor for pages that need a signed-in visitor.
pub struct SignedIn(pub AuthPrincipal);

impl FromRequestParts<FrontendState> for SignedIn {
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, state: &FrontendState) -> Result<Self, Self::Rejection> {
        state
            .sessions
            .read(&parts.headers)
            .map(SignedIn)
            .ok_or_else(|| Redirect::to(LOGIN_PAGE))
    }
}

pub fn router(state: FrontendState) -> Router {
    Router::new()
        .route("/account/login", post(account::login))
        .route("/account/register", post(account::register))
        .route("/account/logout", post(account::logout))
        .route("/account/profile", get(account::profile))
        .layer(CatchPanicLayer::custom(errors::panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
