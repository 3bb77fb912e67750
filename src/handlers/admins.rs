// handlers/admins.rs - /api/admins

use axum::{
    extract::{Path, State},
    Extension,
};
use serde::Deserialize;
use tracing::info;

use super::users::{available_email, require_name};
use crate::auth::{Role, RoleSet, UserContext};
use crate::database::User;
use crate::error::DomainError;
use crate::middleware::{ApiResponse, ApiResult, Json};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateAdminRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAdminRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

async fn load_admin(state: &AppState, id: &str) -> Result<User, DomainError> {
    match state.store.find_user(id).await? {
        Some(user) if user.is_admin() => Ok(user),
        _ => Err(DomainError::NotFound("Admin".to_string())),
    }
}

/// Plain admins only see themselves; super admins see everyone.
fn ensure_self_or_super(caller: &UserContext, id: &str) -> Result<(), DomainError> {
    if caller.user_id == id || caller.roles.contains(Role::SuperAdmin) {
        Ok(())
    } else {
        Err(DomainError::UserRoleViolation("Only a super admin may manage other admins".to_string()))
    }
}

/// GET /api/admins
pub async fn list(State(state): State<AppState>) -> ApiResult<Vec<User>> {
    Ok(ApiResponse::success(state.store.list_users_with_role(Role::Admin).await?))
}

/// POST /api/admins - create a verified `ROLE_ADMIN` account
pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<UserContext>,
    Json(body): Json<CreateAdminRequest>,
) -> ApiResult<User> {
    let name = require_name(&body.name)?;
    let email = available_email(&state, &body.email).await?;
    let hash = state.auth.hash_password(&body.password)?;

    let mut admin = User::new(name, email, hash, RoleSet::of(&[Role::Admin]));
    admin.verified = true;
    state.store.insert_user(&admin).await?;

    info!(admin_id = %admin.id, created_by = %caller.user_id, "Admin created");
    Ok(ApiResponse::created(admin))
}

/// GET /api/admins/:id
pub async fn get(
    State(state): State<AppState>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
) -> ApiResult<User> {
    ensure_self_or_super(&caller, &id)?;
    Ok(ApiResponse::success(load_admin(&state, &id).await?))
}

/// PUT /api/admins/:id
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
    Json(body): Json<UpdateAdminRequest>,
) -> ApiResult<User> {
    ensure_self_or_super(&caller, &id)?;
    let mut admin = load_admin(&state, &id).await?;

    if let Some(name) = body.name {
        admin.name = require_name(&name)?;
    }
    if let Some(email) = body.email {
        if !email.trim().eq_ignore_ascii_case(&admin.email) {
            admin.email = available_email(&state, &email).await?;
        }
    }

    state.store.update_user(&admin).await?;
    Ok(ApiResponse::success(admin))
}

/// DELETE /api/admins/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    load_admin(&state, &id).await?;
    state.store.delete_user(&id).await?;

    info!(admin_id = %id, deleted_by = %caller.user_id, "Admin deleted");
    Ok(ApiResponse::no_content())
}
