#![allow(dead_code)]

use std::sync::Arc;

use axum_test::TestServer;
use musicapp_auth::{
    app,
    config::{AuthConfig, Config},
    db::{self, memory::MemoryCredentialStore},
    services::password::PasswordHasher,
    AppState,
};

pub const TEST_BCRYPT_COST: u32 = 4;

pub fn test_auth_config() -> AuthConfig {
    AuthConfig {
        signing_key: "integration-test-signing-key-0123456789".into(),
        bcrypt_cost: TEST_BCRYPT_COST,
        ..AuthConfig::default()
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: None,
        host: "127.0.0.1".into(),
        port: 0,
        frontend_origin: "http://localhost:5085".into(),
        auth: test_auth_config(),
    }
}

/// API state over an in-memory store holding the demo accounts.
pub async fn test_state() -> (AppState, Arc<MemoryCredentialStore>) {
    let store = Arc::new(MemoryCredentialStore::new());
    db::seed_demo_users(store.as_ref(), &PasswordHasher::new(TEST_BCRYPT_COST))
        .await
        .unwrap();
    let state = AppState::new(test_config(), store.clone()).unwrap();
    (state, store)
}

pub async fn test_server() -> (TestServer, AppState) {
    let (state, _) = test_state().await;
    let server = TestServer::new(app(state.clone())).unwrap();
    (server, state)
}

/// Runs the API on a real local port, for tests driving it over HTTP.
pub async fn spawn_api() -> (String, AppState) {
    let (state, _) = test_state().await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}"), state)
}
