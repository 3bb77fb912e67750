// handlers/auth/session.rs - login, refresh, logout, me, resource-token

use axum::{
    extract::State,
    http::HeaderMap,
    Extension,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{credentials, IssuedTokens, UserContext};
use crate::database::User;
use crate::error::{ApiError, DomainError};
use crate::middleware::{expired_refresh_cookie, refresh_cookie, ApiResponse, ApiResult, Json};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: User,
    #[serde(flatten)]
    pub tokens: IssuedTokens,
}

/**
 * POST /api/auth/login - exchange email and password for a session
 *
 * Input: `{"email": "...", "password": "..."}`
 *
 * Output: the user plus `accessToken`, `tokenType`, `expiresIn`,
 * `refreshToken` and `refreshExpiresAt`. The refresh token is also set as an
 * HttpOnly cookie.
 *
 * 401 for an unknown email or wrong password (same message for both),
 * 403 while the email address is unverified.
 */
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, ApiResponse<SessionResponse>), ApiError> {
    let email = body.email.trim().to_lowercase();
    let (user, tokens) = state.auth.login(&email, &body.password).await?;

    let jar = jar.add(refresh_cookie(
        tokens.refresh_token.clone(),
        state.config.security.require_https,
    ));
    Ok((jar, ApiResponse::success(SessionResponse { user, tokens })))
}

/// POST /api/auth/refresh - rotate the refresh token from the header or cookie
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<(CookieJar, ApiResponse<IssuedTokens>), ApiError> {
    let raw = credentials::refresh_token(&headers).ok_or_else(|| ApiError::unauthorized("Refresh token required"))?;

    let authentication = state.auth.refresh(&raw).await?;
    let tokens = authentication
        .reissued
        .ok_or_else(|| DomainError::Internal("refresh produced no credentials".to_string()))?;

    let jar = jar.add(refresh_cookie(
        tokens.refresh_token.clone(),
        state.config.security.require_https,
    ));
    Ok((jar, ApiResponse::success(tokens)))
}

/// POST /api/auth/logout - revoke the refresh token and clear the cookie
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    jar: CookieJar,
) -> Result<(CookieJar, ApiResponse<()>), ApiError> {
    state.auth.logout(&user.user_id).await?;
    Ok((jar.add(expired_refresh_cookie()), ApiResponse::no_content()))
}

/// GET /api/auth/me
pub async fn me(State(state): State<AppState>, Extension(user): Extension<UserContext>) -> ApiResult<User> {
    let user = state
        .store
        .find_user(&user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(ApiResponse::success(user))
}

#[derive(Debug, Deserialize)]
pub struct ResourceTokenRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTokenResponse {
    pub resource_token: String,
    pub expires_at: DateTime<Utc>,
}

/// POST /api/auth/resource-token - re-enter the password to unlock profile operations
pub async fn resource_token(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Json(body): Json<ResourceTokenRequest>,
) -> ApiResult<ResourceTokenResponse> {
    let (resource_token, expires_at) = state.auth.issue_resource_token(&user.user_id, &body.password).await?;

    Ok(ApiResponse::created(ResourceTokenResponse {
        resource_token,
        expires_at,
    }))
}
