// Library exports for the binaries and integration tests
pub mod client;
pub mod config;
pub mod db;
pub mod errors;
pub mod frontend;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use config::Config;
use db::store::CredentialStore;
use services::{auth::AuthService, password::PasswordHasher, tokens::TokenIssuer};

/// Application state shared across all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn CredentialStore>,
    pub issuer: Arc<TokenIssuer>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// Wires the services together. Fails on auth misconfiguration.
    pub fn new(config: Config, store: Arc<dyn CredentialStore>) -> anyhow::Result<Self> {
        let issuer = Arc::new(TokenIssuer::new(&config.auth, store.clone())?);
        let hasher = PasswordHasher::new(config.auth.bcrypt_cost);
        let auth = Arc::new(AuthService::new(store.clone(), issuer.clone(), hasher));
        Ok(Self {
            config: Arc::new(config),
            store,
            issuer,
            auth,
        })
    }
}

/// The API router with CORS, request tracing and panic handling applied.
pub fn app(state: AppState) -> Router {
    let frontend_origin = state.config.frontend_origin.clone();
    let cors_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let Ok(o) = origin.to_str() else {
            return false;
        };
        // Always allow localhost / 127.0.0.1 for local development
        o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1") || o == frontend_origin
    });

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(cors_origin);

    routes::api_router()
        .layer(CatchPanicLayer::custom(errors::panic_response))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
