use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    errors::AppError,
    models::{auth::AuthenticatedUser, user::Role},
    AppState,
};

/// Pulls the bearer token out of the `Authorization` header.
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("Missing or malformed Authorization header".into()))?;

        state
            .issuer
            .validate_session_token(token)
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))
    }
}

/// Extractor for endpoints restricted to the `Admin` role.
pub struct RequireAdmin(pub AuthenticatedUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if !user.has_role(Role::Admin) {
            return Err(AppError::Forbidden("Admin role required".into()));
        }
        Ok(RequireAdmin(user))
    }
}
