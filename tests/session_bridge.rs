mod common;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum_test::{TestResponse, TestServer};
use serde_json::{json, Value};

use musicapp_auth::{
    config::FrontendConfig,
    frontend::{self, session::SESSION_COOKIE, FrontendState, LOGIN_PAGE},
    AppState,
};

struct Harness {
    frontend: TestServer,
    api: TestServer,
    state: FrontendState,
    _api_state: AppState,
}

async fn harness() -> Harness {
    let (base_url, api_state) = common::spawn_api().await;
    let config = FrontendConfig {
        api_base_url: base_url,
        session_cookie_key: "frontend-test-cookie-key-0123456789".into(),
        session_cookie_secure: false,
        api_timeout_seconds: 5,
        ..FrontendConfig::default()
    };
    let state = FrontendState::new(config).unwrap();
    Harness {
        frontend: TestServer::new(frontend::router(state.clone())).unwrap(),
        api: TestServer::new(musicapp_auth::app(api_state.clone())).unwrap(),
        state,
        _api_state: api_state,
    }
}

/// The `Set-Cookie` header of a response, if any.
fn set_cookie(response: &TestResponse) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// The `name=value` pair to send back in a `Cookie` header.
fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap_or_default().to_string()
}

fn cookie_header(pair: &str) -> HeaderValue {
    HeaderValue::from_str(pair).unwrap()
}

async fn sign_in(h: &Harness, remember_me: bool) -> String {
    let response = h
        .frontend
        .post("/account/login")
        .json(&json!({
            "usernameOrEmail": "user@example.com",
            "password": "User@123",
            "rememberMe": remember_me
        }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["redirectUrl"], "/");
    set_cookie(&response).expect("login sets the session cookie")
}

#[tokio::test]
async fn test_login_issues_a_signed_cookie() {
    let h = harness().await;

    let session = sign_in(&h, false).await;
    assert!(session.starts_with(&format!("{SESSION_COOKIE}=")));
    assert!(session.contains("HttpOnly"));
    assert!(session.contains("SameSite=Lax"));
    assert!(!session.contains("Max-Age"));

    let remembered = sign_in(&h, true).await;
    assert!(remembered.contains("Max-Age=604800"));

    let mut headers = HeaderMap::new();
    headers.insert(header::COOKIE, cookie_header(&cookie_pair(&remembered)));
    let principal = h.state.sessions.read(&headers).unwrap();
    assert_eq!(principal.email, "user@example.com");
    assert!(principal.has_role("User"));
    assert!(principal.persistent);
    assert!(!principal.token.is_empty());
}

#[tokio::test]
async fn test_login_failure_is_a_200_with_message() {
    let h = harness().await;
    let response = h
        .frontend
        .post("/account/login")
        .json(&json!({ "email": "user@example.com", "password": "wrong" }))
        .await;
    response.assert_status_ok();
    assert!(set_cookie(&response).is_none());
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Invalid email or password");
}

#[tokio::test]
async fn test_profile_requires_a_session() {
    let h = harness().await;
    let response = h.frontend.get("/account/profile").await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], LOGIN_PAGE);

    let tampered = h
        .frontend
        .get("/account/profile")
        .add_header(header::COOKIE, cookie_header(&format!("{SESSION_COOKIE}=not.a.jwt")))
        .await;
    tampered.assert_status(StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_profile_with_valid_session() {
    let h = harness().await;
    let pair = cookie_pair(&sign_in(&h, false).await);

    let response = h
        .frontend
        .get("/account/profile")
        .add_header(header::COOKIE, cookie_header(&pair))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["user"]["username"], "user");
    // Nothing changed, so the cookie is left alone.
    assert!(set_cookie(&response).is_none());
}

#[tokio::test]
async fn test_rotated_tokens_are_written_back_to_the_cookie() {
    let h = harness().await;
    let pair = cookie_pair(&sign_in(&h, false).await);
    let mut headers = HeaderMap::new();
    headers.insert(header::COOKIE, cookie_header(&pair));
    let mut principal = h.state.sessions.read(&headers).unwrap();
    let original_refresh = principal.refresh_token.clone();

    // A bearer the API no longer accepts, with a live refresh token.
    principal.token = "expired-bearer".into();
    let stale = cookie_pair(&h.state.sessions.issue(&principal).unwrap());

    let response = h
        .frontend
        .get("/account/profile")
        .add_header(header::COOKIE, cookie_header(&stale))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let reissued = set_cookie(&response).expect("rotated tokens re-issue the cookie");

    let mut headers = HeaderMap::new();
    headers.insert(header::COOKIE, cookie_header(&cookie_pair(&reissued)));
    let next = h.state.sessions.read(&headers).unwrap();
    assert_ne!(next.token, "expired-bearer");
    assert_ne!(next.refresh_token, original_refresh);
    assert_eq!(next.sub, principal.sub);

    let retried = h
        .frontend
        .get("/account/profile")
        .add_header(header::COOKIE, cookie_header(&cookie_pair(&reissued)))
        .await;
    retried.assert_status_ok();
}

#[tokio::test]
async fn test_unrecoverable_session_redirects_and_clears() {
    let h = harness().await;
    let pair = cookie_pair(&sign_in(&h, false).await);
    let mut headers = HeaderMap::new();
    headers.insert(header::COOKIE, cookie_header(&pair));
    let mut principal = h.state.sessions.read(&headers).unwrap();

    h.api
        .post("/api/auth/revoke-token")
        .authorization_bearer(&principal.token)
        .json(&json!({ "refreshToken": principal.refresh_token }))
        .await
        .assert_status_ok();

    principal.token = "expired-bearer".into();
    let stale = cookie_pair(&h.state.sessions.issue(&principal).unwrap());

    let response = h
        .frontend
        .get("/account/profile")
        .add_header(header::COOKIE, cookie_header(&stale))
        .await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/Home/Index?authModal=login&error=Your+session+has+expired"
    );
    let cleared = set_cookie(&response).unwrap();
    assert!(cleared.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_logout_revokes_and_clears() {
    let h = harness().await;
    let pair = cookie_pair(&sign_in(&h, false).await);
    let mut headers = HeaderMap::new();
    headers.insert(header::COOKIE, cookie_header(&pair));
    let principal = h.state.sessions.read(&headers).unwrap();

    let response = h
        .frontend
        .post("/account/logout")
        .add_header(header::COOKIE, cookie_header(&pair))
        .await;
    response.assert_status_ok();
    assert!(set_cookie(&response).unwrap().contains("Max-Age=0"));

    h.api
        .post("/api/auth/refresh-token")
        .json(&json!({ "refreshToken": principal.refresh_token }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    // Logging out without a session still clears the cookie.
    let anonymous = h.frontend.post("/account/logout").await;
    anonymous.assert_status_ok();
    assert!(set_cookie(&anonymous).unwrap().contains("Max-Age=0"));
}

#[tokio::test]
async fn test_register_signs_the_new_user_in() {
    let h = harness().await;
    let response = h
        .frontend
        .post("/account/register")
        .json(&json!({
            "username": "fresh",
            "email": "fresh@example.com",
            "password": "Fresh@123",
            "confirmPassword": "Fresh@123",
            "firstName": "Fresh",
            "lastName": "Face"
        }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["redirectUrl"], "/account/profile");
    assert!(set_cookie(&response).unwrap().contains("Max-Age=604800"));

    let duplicate = h
        .frontend
        .post("/account/register")
        .json(&json!({
            "username": "fresh2",
            "email": "fresh@example.com",
            "password": "Fresh@123",
            "confirmPassword": "Fresh@123",
            "firstName": "Fresh",
            "lastName": "Face"
        }))
        .await;
    let body: Value = duplicate.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Email already exists");
}
