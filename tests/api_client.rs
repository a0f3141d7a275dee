mod common;

use std::{sync::Arc, time::Duration};

use serde::Deserialize;
use serde_json::{json, Value};
use wiremock::{
    matchers::{body_json, header, header_exists, method, path},
    Mock, MockServer, ResponseTemplate,
};

use musicapp_auth::{
    client::{
        error::{GENERIC_USER_MESSAGE, LOGIN_REDIRECT},
        tokens::{MemoryTokenStore, StoredTokens, TokenStore},
        ApiClient, ApiError, CallContext,
    },
    models::user::{TokenResponse, UserDto},
};

#[derive(Debug, Default, Deserialize, PartialEq)]
struct Playlist {
    name: String,
}

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
}

fn signed_in_store(token: &str, refresh: &str) -> Arc<MemoryTokenStore> {
    let store = Arc::new(MemoryTokenStore::new());
    store
        .save(&StoredTokens {
            token: Some(token.into()),
            refresh_token: Some(refresh.into()),
        })
        .unwrap();
    store
}

#[tokio::test]
async fn test_success_false_on_200_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/playlists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": false, "message": "X" })))
        .mount(&server)
        .await;

    let err = client(&server)
        .post::<_, Value>(&CallContext::anonymous(), "api/playlists", &json!({ "name": "a" }))
        .await
        .unwrap_err();
    assert!(matches!(&err, ApiError::Rejected { message: Some(m), .. } if m == "X"));
    assert_eq!(err.user_message(), "X");
}

#[tokio::test]
async fn test_no_content_and_empty_body_yield_default() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/playlists/1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/playlists/1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let api = client(&server);
    let ctx = CallContext::anonymous();
    let deleted: Playlist = api.delete(&ctx, "api/playlists/1").await.unwrap();
    assert_eq!(deleted, Playlist::default());
    let fetched: Playlist = api.get(&ctx, "api/playlists/1").await.unwrap();
    assert_eq!(fetched, Playlist::default());
}

#[tokio::test]
async fn test_error_status_keeps_backend_message() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/playlists/1"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "message": "Name is required" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/playlists/2"))
        .respond_with(ResponseTemplate::new(500).set_body_string("stack trace here"))
        .mount(&server)
        .await;

    let api = client(&server);
    let ctx = CallContext::anonymous();

    let err = api
        .put::<_, Playlist>(&ctx, "api/playlists/1", &json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(reqwest::StatusCode::BAD_REQUEST));
    assert_eq!(err.user_message(), "Name is required");

    let err = api.get::<Playlist>(&ctx, "api/playlists/2").await.unwrap_err();
    assert!(matches!(err, ApiError::Status { message: None, .. }));
    assert_eq!(err.user_message(), GENERIC_USER_MESSAGE);
}

#[tokio::test]
async fn test_401_with_bearer_refreshes_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/playlists"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "name": "Mine" }])))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/playlists"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh-token"))
        .and(body_json(json!({ "refreshToken": "r0" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "fresh", "refreshToken": "r1" })))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server);
    let store = signed_in_store("stale", "r0");
    let ctx = CallContext::client_side(store.clone());

    let err = api.get::<Vec<Playlist>>(&ctx, "api/playlists").await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { refreshed: true, .. }));
    assert_eq!(err.user_message(), "Your session was refreshed. Please try again.");

    let saved = store.snapshot();
    assert_eq!(saved.token.as_deref(), Some("fresh"));
    assert_eq!(saved.refresh_token.as_deref(), Some("r1"));

    // The caller retries; the new token goes out.
    let playlists: Vec<Playlist> = api.get(&ctx, "api/playlists").await.unwrap();
    assert_eq!(playlists.len(), 1);
}

#[tokio::test]
async fn test_failed_refresh_expires_the_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh-token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid refresh token" })))
        .expect(1)
        .mount(&server)
        .await;

    let store = signed_in_store("stale", "revoked");
    let ctx = CallContext::client_side(store.clone());

    let err = client(&server).get::<UserDto>(&ctx, "api/auth/me").await.unwrap_err();
    match &err {
        ApiError::SessionExpired { redirect } => assert_eq!(redirect, LOGIN_REDIRECT),
        other => panic!("expected session expiry, got {other:?}"),
    }
    assert!(err.login_redirect().is_some());
    assert_eq!(store.snapshot(), StoredTokens::default());
    assert!(ctx.signed_out());
    assert_eq!(ctx.bearer_token(), None);
}

#[tokio::test]
async fn test_401_without_bearer_does_not_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid email or password" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh-token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = client(&server)
        .post::<_, TokenResponse>(
            &CallContext::anonymous(),
            "api/auth/login",
            &json!({ "email": "a@b.c", "password": "x" }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { refreshed: false, .. }));
    assert_eq!(err.user_message(), "Invalid email or password");
}

#[tokio::test]
async fn test_failed_login_with_stored_session_leaves_it_alone() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(1)
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid email or password" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "t9", "refreshToken": "r9" })))
        .expect(0)
        .mount(&server)
        .await;

    let store = signed_in_store("stale", "live-refresh");
    let ctx = CallContext::client_side(store.clone());

    let err = client(&server)
        .post::<_, TokenResponse>(&ctx, "api/auth/login", &json!({ "email": "u", "password": "wrong" }))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { refreshed: false, .. }));
    assert_eq!(err.user_message(), "Invalid email or password");
    assert_eq!(store.snapshot().token.as_deref(), Some("stale"));
    assert_eq!(store.snapshot().refresh_token.as_deref(), Some("live-refresh"));
    assert!(!ctx.signed_out());
}

#[tokio::test]
async fn test_tokens_in_a_response_body_are_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "t1",
            "refreshToken": "r1",
            "user": { "id": 1, "username": "u", "email": "u@example.com", "firstName": "", "lastName": "" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1, "username": "u", "email": "u@example.com", "firstName": "", "lastName": ""
        })))
        .mount(&server)
        .await;

    let api = client(&server);
    let store = Arc::new(MemoryTokenStore::new());
    let ctx = CallContext::client_side(store.clone());

    let response: TokenResponse = api
        .post(&ctx, "api/auth/login", &json!({ "email": "u", "password": "p" }))
        .await
        .unwrap();
    assert_eq!(response.user.username, "u");
    assert_eq!(store.snapshot().token.as_deref(), Some("t1"));

    let me: UserDto = api.get(&ctx, "api/auth/me").await.unwrap();
    assert_eq!(me.id, 1);
}

#[tokio::test]
async fn test_against_the_real_api() {
    let (base_url, _) = common::spawn_api().await;
    let api = ApiClient::new(&base_url, Duration::from_secs(5)).unwrap();
    let store = Arc::new(MemoryTokenStore::new());
    let ctx = CallContext::client_side(store.clone());

    let _: TokenResponse = api
        .post(&ctx, "api/auth/login", &json!({ "email": "admin@example.com", "password": "Admin@123" }))
        .await
        .unwrap();
    let me: UserDto = api.get(&ctx, "api/auth/me").await.unwrap();
    assert_eq!(me.username, "admin");
    assert!(me.roles.contains(&"Admin".to_string()));

    // A corrupted bearer is recovered through the stored refresh token.
    let refresh = store.snapshot().refresh_token;
    store
        .save(&StoredTokens {
            token: Some("corrupted".into()),
            refresh_token: refresh.clone(),
        })
        .unwrap();
    let err = api.get::<UserDto>(&ctx, "api/auth/me").await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { refreshed: true, .. }));
    assert_ne!(store.snapshot().refresh_token, refresh);
    let me: UserDto = api.get(&ctx, "api/auth/me").await.unwrap();
    assert_eq!(me.username, "admin");
}
