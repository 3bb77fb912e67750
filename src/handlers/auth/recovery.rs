// handlers/auth/recovery.rs - password recovery and email verification

use axum::extract::State;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::database::User;
use crate::error::DomainError;
use crate::mail;
use crate::middleware::{ApiResponse, ApiResult, Json};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RecoveryRequest {
    pub email: String,
}

/// POST /api/auth/recovery - mail a reset code
///
/// Always 202 so the response does not reveal whether the address is registered.
pub async fn recovery(State(state): State<AppState>, Json(body): Json<RecoveryRequest>) -> ApiResult<Value> {
    let email = body.email.trim().to_lowercase();

    if let Some((user, code)) = state.auth.issue_reset_code(&email).await? {
        let (subject, text) = mail::recovery_message(&code, state.auth.reset_code_minutes());
        state
            .mailer
            .send(&user.email, &subject, &text)
            .await?;
        info!(user_id = %user.id, "Recovery code sent");
    }

    Ok(ApiResponse::accepted(json!({
        "message": "If the address is registered, a recovery code has been sent"
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryConfirmRequest {
    pub email: String,
    pub code: String,
    pub password: String,
    pub confirm_password: String,
}

/// POST /api/auth/recovery/confirm - set a new password with the mailed code
pub async fn recovery_confirm(
    State(state): State<AppState>,
    Json(body): Json<RecoveryConfirmRequest>,
) -> ApiResult<Value> {
    if body.password != body.confirm_password {
        return Err(DomainError::PasswordMismatch.into());
    }

    let email = body.email.trim().to_lowercase();
    state
        .auth
        .confirm_reset_code(&email, body.code.trim(), &body.password)
        .await?;

    Ok(ApiResponse::success(json!({ "message": "Password updated" })))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub token: String,
}

/// POST /api/auth/verify - confirm the email address from the signup mail
pub async fn verify(State(state): State<AppState>, Json(body): Json<VerifyRequest>) -> ApiResult<User> {
    let user = state.auth.confirm_verify_token(body.token.trim()).await?;
    Ok(ApiResponse::success(user))
}
