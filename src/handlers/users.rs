// handlers/users.rs - /api/users

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Extension,
};
use serde::Deserialize;
use tracing::info;

use crate::auth::{password, Role, RoleSet, UserContext};
use crate::database::{DirectoryKind, User};
use crate::error::{ApiError, DomainError};
use crate::mail;
use crate::middleware::{ApiResponse, ApiResult, Json};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub city_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub city_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub password: String,
    pub confirm_password: String,
}

pub(crate) fn require_name(name: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::Validation("Name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

/// Lowercased, validated and not taken by anyone else.
pub(crate) async fn available_email(state: &AppState, email: &str) -> Result<String, DomainError> {
    let email = email.trim().to_lowercase();
    password::validate_email(&email)?;
    if state.store.email_exists(&email).await? {
        return Err(DomainError::AlreadyExists("User with this email".to_string()));
    }
    Ok(email)
}

async fn existing_city(state: &AppState, city_id: Option<String>) -> Result<Option<String>, DomainError> {
    if let Some(id) = &city_id {
        if !state.store.entry_exists(DirectoryKind::City, id).await? {
            return Err(DomainError::NotFound("City".to_string()));
        }
    }
    Ok(city_id)
}

/// The owner may act on their own profile; anyone holding an admin role may act on any.
fn ensure_owner_or_admin(caller: &UserContext, id: &str) -> Result<(), DomainError> {
    if caller.user_id == id || caller.roles.has_admin_role() {
        Ok(())
    } else {
        Err(DomainError::UserRoleViolation("Access to another user's profile is not allowed".to_string()))
    }
}

async fn load_user(state: &AppState, id: &str) -> Result<User, DomainError> {
    state
        .store
        .find_user(id)
        .await?
        .ok_or_else(|| DomainError::NotFound("User".to_string()))
}

/**
 * POST /api/users - sign up
 *
 * Input: `{"name", "email", "password", "confirmPassword", "cityId"?}`
 *
 * Creates an unverified `ROLE_USER` account and mails a verification link.
 * Callers that already hold a refresh token are refused before this runs.
 */
pub async fn create(State(state): State<AppState>, Json(body): Json<SignupRequest>) -> ApiResult<User> {
    let name = require_name(&body.name)?;
    let email = available_email(&state, &body.email).await?;
    if body.password != body.confirm_password {
        return Err(DomainError::PasswordMismatch.into());
    }
    let hash = state.auth.hash_password(&body.password)?;

    let mut user = User::new(name, email, hash, RoleSet::of(&[Role::User]));
    user.city_id = existing_city(&state, body.city_id).await?;
    state.store.insert_user(&user).await?;

    let token = state.auth.issue_verify_token(&user.id).await?;
    let (subject, text) = mail::verification_message(&state.config.mail.verification_base_url, &token);
    state.mailer.send(&user.email, &subject, &text).await?;

    info!(user_id = %user.id, "User signed up");
    Ok(ApiResponse::created(user))
}

/// GET /api/users - every account holding `ROLE_USER`
pub async fn list(State(state): State<AppState>) -> ApiResult<Vec<User>> {
    Ok(ApiResponse::success(state.store.list_users_with_role(Role::User).await?))
}

/// GET /api/users/:id
pub async fn get(
    State(state): State<AppState>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
) -> ApiResult<User> {
    ensure_owner_or_admin(&caller, &id)?;
    Ok(ApiResponse::success(load_user(&state, &id).await?))
}

/// PUT /api/users/:id - name, email and city
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
    Json(body): Json<UpdateUserRequest>,
) -> ApiResult<User> {
    ensure_owner_or_admin(&caller, &id)?;
    let mut user = load_user(&state, &id).await?;

    if let Some(name) = body.name {
        user.name = require_name(&name)?;
    }
    if let Some(email) = body.email {
        if !email.trim().eq_ignore_ascii_case(&user.email) {
            user.email = available_email(&state, &email).await?;
        }
    }
    if body.city_id.is_some() {
        user.city_id = existing_city(&state, body.city_id).await?;
    }

    state.store.update_user(&user).await?;
    Ok(ApiResponse::success(user))
}

/// DELETE /api/users/:id - requires the caller's resource token
pub async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<()> {
    ensure_owner_or_admin(&caller, &id)?;
    state.auth.require_resource_token(&headers, &caller.user_id).await?;

    if !state.store.delete_user(&id).await? {
        return Err(ApiError::not_found("User not found"));
    }

    info!(user_id = %id, deleted_by = %caller.user_id, "User deleted");
    Ok(ApiResponse::no_content())
}

/// PATCH /api/users/:id/password - owner only, requires the resource token
pub async fn change_password(
    State(state): State<AppState>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ChangePasswordRequest>,
) -> ApiResult<()> {
    if caller.user_id != id {
        return Err(DomainError::UserRoleViolation("Only the owner may change a password".to_string()).into());
    }
    state.auth.require_resource_token(&headers, &id).await?;
    if body.password != body.confirm_password {
        return Err(DomainError::PasswordMismatch.into());
    }

    let mut user = load_user(&state, &id).await?;
    state.auth.change_password(&mut user, &body.password).await?;
    Ok(ApiResponse::no_content())
}
