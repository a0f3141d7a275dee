use axum::{extract::State, Json};
use serde_json::{json, Value};

use super::ApiJson;
use crate::{
    errors::AppError,
    middleware::auth::RequireAdmin,
    models::{
        auth::AuthenticatedUser,
        user::{
            AssignRoleRequest, LoginRequest, RefreshTokenRequest, RegisterRequest, RegisterResponse, Role,
            TokenPair, TokenResponse, UserDto,
        },
    },
    services::auth::{LoginOutcome, RefreshOutcome, RegisterOutcome},
    AppState,
};

/// Same text for unknown users and wrong passwords.
pub const INVALID_CREDENTIALS: &str = "Invalid email or password";

pub async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AppError> {
    body.validate().map_err(AppError::Validation)?;

    match state.auth.register(&body).await? {
        RegisterOutcome::Created(user) => Ok(Json(RegisterResponse {
            message: "Registration successful".into(),
            user,
        })),
        RegisterOutcome::EmailTaken => Err(AppError::Conflict("Email already exists".into())),
        RegisterOutcome::UsernameTaken => Err(AppError::Conflict("Username already exists".into())),
    }
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    body.validate().map_err(AppError::Validation)?;

    match state.auth.login(&body.email, &body.password).await? {
        LoginOutcome::Authenticated(response) => Ok(Json(response)),
        LoginOutcome::Rejected(_) => Err(AppError::Unauthorized(INVALID_CREDENTIALS.into())),
    }
}

pub async fn refresh_token(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RefreshTokenRequest>,
) -> Result<Json<TokenPair>, AppError> {
    if body.refresh_token.trim().is_empty() {
        return Err(AppError::Validation("Refresh token is required".into()));
    }

    match state.auth.refresh(&body.refresh_token).await? {
        RefreshOutcome::Refreshed(pair) => Ok(Json(pair)),
        RefreshOutcome::Unauthorized => Err(AppError::Unauthorized("Invalid refresh token".into())),
    }
}

/// Bearer required. Possession of the refresh token value is the capability;
/// it is not checked against the caller's identity.
pub async fn revoke_token(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    ApiJson(body): ApiJson<RefreshTokenRequest>,
) -> Result<Json<Value>, AppError> {
    if body.refresh_token.trim().is_empty() {
        return Err(AppError::Validation("Refresh token is required".into()));
    }

    if state.auth.revoke(&body.refresh_token).await? {
        Ok(Json(json!({ "message": "Token revoked successfully" })))
    } else {
        Err(AppError::Validation("Token revocation failed".into()))
    }
}

pub async fn assign_role(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiJson(body): ApiJson<AssignRoleRequest>,
) -> Result<Json<Value>, AppError> {
    let role: Role = body
        .role_name
        .parse()
        .map_err(|e: anyhow::Error| AppError::Validation(e.to_string()))?;

    if !state.auth.assign_role(body.user_id, role).await? {
        return Err(AppError::Validation("User not found".into()));
    }

    tracing::info!(admin_id = admin.user_id, target = body.user_id, role = %role, "Admin assigned role");
    Ok(Json(json!({ "message": format!("Role {role} assigned successfully") })))
}

pub async fn me(State(state): State<AppState>, user: AuthenticatedUser) -> Result<Json<UserDto>, AppError> {
    state
        .auth
        .current_user(user.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".into()))
}
