use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{session::AuthPrincipal, FrontendState, SignedIn, LOGIN_PAGE};
use crate::{
    client::{ApiError, CallContext},
    errors::AppError,
    models::user::{RegisterRequest, RegisterResponse, TokenResponse, UserDto},
    routes::ApiJson,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginForm {
    #[serde(alias = "usernameOrEmail")]
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

fn succeeded(redirect_url: &str) -> Json<Value> {
    Json(json!({ "success": true, "redirectUrl": redirect_url }))
}

fn failed(message: impl Into<String>) -> Json<Value> {
    Json(json!({ "success": false, "message": message.into() }))
}

fn with_cookie(mut response: Response, cookie: &str) -> Result<Response, AppError> {
    let value = HeaderValue::from_str(cookie).map_err(anyhow::Error::from)?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(response)
}

/// Logs in against the API and builds the session principal.
async fn sign_in(
    state: &FrontendState,
    email: &str,
    password: &str,
    persistent: bool,
) -> Result<AuthPrincipal, ApiError> {
    let response: TokenResponse = state
        .api
        .post(
            &CallContext::anonymous(),
            "api/auth/login",
            &json!({ "email": email, "password": password }),
        )
        .await?;

    if response.token.is_empty() {
        return Err(ApiError::Rejected {
            status: StatusCode::OK,
            message: None,
        });
    }
    Ok(AuthPrincipal::from_login(&response, persistent))
}

/// POST /account/login. Failures are a 200 with `success: false`.
pub async fn login(
    State(state): State<FrontendState>,
    ApiJson(form): ApiJson<LoginForm>,
) -> Result<Response, AppError> {
    if form.email.trim().is_empty() || form.password.is_empty() {
        return Ok(failed("Username or Email and Password are required").into_response());
    }

    match sign_in(&state, &form.email, &form.password, form.remember_me).await {
        Ok(principal) => {
            info!(user_id = principal.sub, "Signed in");
            let cookie = state.sessions.issue(&principal)?;
            with_cookie(succeeded("/").into_response(), &cookie)
        }
        Err(e) => {
            info!("Sign-in failed: {e}");
            Ok(failed(e.user_message()).into_response())
        }
    }
}

/// POST /account/register. Registers through the API, then signs the new
/// user in with a persistent cookie.
pub async fn register(
    State(state): State<FrontendState>,
    ApiJson(form): ApiJson<RegisterRequest>,
) -> Result<Response, AppError> {
    if let Err(message) = form.validate() {
        return Ok(failed(message).into_response());
    }

    let registered: Result<RegisterResponse, ApiError> = state
        .api
        .post(&CallContext::anonymous(), "api/auth/register", &form)
        .await;
    if let Err(e) = registered {
        info!("Registration failed: {e}");
        return Ok(failed(e.user_message()).into_response());
    }

    match sign_in(&state, &form.email, &form.password, true).await {
        Ok(principal) => {
            let cookie = state.sessions.issue(&principal)?;
            with_cookie(succeeded("/account/profile").into_response(), &cookie)
        }
        Err(e) => {
            // The account exists; let the visitor log in by hand.
            info!("Sign-in after registration failed: {e}");
            Ok(succeeded(LOGIN_PAGE).into_response())
        }
    }
}

async fn revoke(state: &FrontendState, ctx: &CallContext, refresh_token: &str) -> Result<Value, ApiError> {
    state
        .api
        .post(ctx, "api/auth/revoke-token", &json!({ "refreshToken": refresh_token }))
        .await
}

/// POST /account/logout. Revocation is best effort; the cookie is always cleared.
pub async fn logout(State(state): State<FrontendState>, headers: HeaderMap) -> Result<Response, AppError> {
    if let Some(principal) = state.sessions.read(&headers) {
        let ctx = principal.call_context();
        let mut result = revoke(&state, &ctx, &principal.refresh_token).await;

        // An expired bearer was refreshed on the way, which rotated the refresh
        // token. Revoke the replacement instead.
        if let Err(ApiError::Unauthorized { refreshed: true, .. }) = &result {
            if let Some(rotated) = ctx.refresh_token() {
                result = revoke(&state, &ctx, &rotated).await;
            }
        }
        if let Err(e) = result {
            debug!("Ignoring revoke failure during logout: {e}");
        }
        info!(user_id = principal.sub, "Signed out");
    }

    with_cookie(succeeded("/").into_response(), &state.sessions.clear())
}

/// GET /account/profile. Re-issues the cookie whenever the API rotated the
/// token during the call or the profile no longer matches the cookie.
pub async fn profile(
    State(state): State<FrontendState>,
    SignedIn(principal): SignedIn,
) -> Result<Response, AppError> {
    let ctx = principal.call_context();

    match state.api.get::<UserDto>(&ctx, "api/auth/me").await {
        Ok(user) => {
            let next = principal.reconcile(&ctx, Some(&user));
            let response = Json(json!({ "success": true, "user": user })).into_response();
            match next {
                Some(next) => with_cookie(response, &state.sessions.issue(&next)?),
                None => Ok(response),
            }
        }
        Err(ApiError::SessionExpired { redirect }) => {
            info!(user_id = principal.sub, "Session expired; signing out");
            with_cookie(Redirect::to(&redirect).into_response(), &state.sessions.clear())
        }
        Err(e) => {
            let status = match &e {
                ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
                _ => StatusCode::BAD_GATEWAY,
            };
            let response = (status, failed(e.user_message())).into_response();
            match principal.reconcile(&ctx, None) {
                Some(next) => with_cookie(response, &state.sessions.issue(&next)?),
                None => Ok(response),
            }
        }
    }
}
