use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::credentials::{self, CredentialKind, CredentialRecord};
use super::password;
use super::{JwtError, JwtKeys, RoleSet};
use crate::config::SecurityConfig;
use crate::database::{Store, User};
use crate::error::DomainError;

/// Authenticated principal, injected into request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: String,
    pub roles: RoleSet,
}

/// Credentials handed back to the client after login or refresh.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedTokens {
    pub access_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Authentication {
    pub context: UserContext,
    /// Set when the session was renewed from a refresh token.
    pub reissued: Option<IssuedTokens>,
}

/// Wrong guesses allowed against one recovery code before it is discarded.
pub const MAX_RESET_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy)]
struct Lifetimes {
    refresh: Duration,
    reset: Duration,
    verify: Duration,
    resource: Duration,
}

pub struct AuthService {
    store: Arc<dyn Store>,
    keys: JwtKeys,
    lifetimes: Lifetimes,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, security: &SecurityConfig) -> Result<Self, JwtError> {
        Ok(Self {
            store,
            keys: JwtKeys::from_config(security)?,
            lifetimes: Lifetimes {
                refresh: Duration::days(security.refresh_token_days),
                reset: Duration::minutes(security.reset_code_minutes),
                verify: Duration::hours(security.verify_token_hours),
                resource: Duration::minutes(security.resource_token_minutes),
            },
            bcrypt_cost: security.bcrypt_cost,
        })
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    pub fn reset_code_minutes(&self) -> i64 {
        self.lifetimes.reset.num_minutes()
    }

    /// Resolve the caller from request headers.
    ///
    /// A valid bearer JWT wins and is trusted as-is. Otherwise the refresh
    /// token (header or cookie) is checked against the store and, if valid,
    /// rotated. Unknown or expired refresh tokens yield `None` and leave the
    /// store untouched. Store failures are errors, never `None`.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Option<Authentication>, DomainError> {
        if let Some(token) = credentials::bearer_token(headers) {
            match self.keys.validate(token) {
                Ok(claims) => {
                    return Ok(Some(Authentication {
                        context: UserContext {
                            user_id: claims.sub,
                            roles: claims.roles,
                        },
                        reissued: None,
                    }));
                }
                Err(e) => debug!("Bearer token rejected, trying refresh token: {}", e),
            }
        }

        let Some(raw) = credentials::refresh_token(headers) else {
            return Ok(None);
        };

        match self.refresh(&raw).await {
            Ok(authentication) => Ok(Some(authentication)),
            Err(DomainError::TokenExpired(_)) | Err(DomainError::TokenInvalid(_)) => Ok(None),
            Err(other) => Err(other),
        }
    }

    /// Exchange a refresh token for a new access token, rotating the refresh token.
    pub async fn refresh(&self, raw: &str) -> Result<Authentication, DomainError> {
        let record = self
            .store
            .find_credential(CredentialKind::Refresh, &credentials::digest(raw))
            .await?
            .ok_or(DomainError::TokenInvalid("Refresh token"))?;

        if record.is_expired() {
            debug!(user_id = %record.user_id, "Refresh token expired");
            return Err(DomainError::TokenExpired("Refresh token"));
        }

        let user = self
            .store
            .find_user(&record.user_id)
            .await?
            .ok_or(DomainError::TokenInvalid("Refresh token"))?;

        // only one of several concurrent refreshes may win the old token
        let (tokens, next) = self.sign_tokens(&user)?;
        if !self
            .store
            .rotate_credential(CredentialKind::Refresh, &record.token_hash, &next)
            .await?
        {
            warn!(user_id = %user.id, "Refresh token was rotated concurrently");
            return Err(DomainError::TokenInvalid("Refresh token"));
        }
        info!(user_id = %user.id, "Session renewed from refresh token");

        Ok(Authentication {
            context: UserContext {
                user_id: user.id,
                roles: user.roles,
            },
            reissued: Some(tokens),
        })
    }

    /// Sign a JWT and store a fresh refresh token, replacing any previous one.
    pub async fn issue_tokens(&self, user: &User) -> Result<IssuedTokens, DomainError> {
        let (tokens, record) = self.sign_tokens(user)?;
        self.store.put_credential(CredentialKind::Refresh, &record).await?;
        Ok(tokens)
    }

    fn sign_tokens(&self, user: &User) -> Result<(IssuedTokens, CredentialRecord), DomainError> {
        let claims = self.keys.claims_for(&user.id, user.roles.clone());
        let access_token = self
            .keys
            .generate(&claims)
            .map_err(|e| DomainError::Internal(e.to_string()))?;

        let refresh_token = credentials::generate_refresh_token();
        let record = CredentialRecord::new(user.id.clone(), &refresh_token, self.lifetimes.refresh);
        let tokens = IssuedTokens {
            access_token,
            token_type: "Bearer",
            expires_in: self.keys.ttl().num_seconds(),
            refresh_token,
            refresh_expires_at: record.expires_at,
        };
        Ok((tokens, record))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(User, IssuedTokens), DomainError> {
        let user = match self.store.find_user_by_email(email).await? {
            Some(user) if password::verify_password(password, &user.password_hash) => user,
            _ => {
                warn!("Failed login attempt");
                return Err(DomainError::InvalidCredentials);
            }
        };

        if !user.verified {
            return Err(DomainError::AccountNotVerified);
        }

        let tokens = self.issue_tokens(&user).await?;
        info!(user_id = %user.id, "User logged in");
        Ok((user, tokens))
    }

    pub async fn logout(&self, user_id: &str) -> Result<(), DomainError> {
        self.store.delete_credential(CredentialKind::Refresh, user_id).await?;
        info!(user_id, "User logged out");
        Ok(())
    }

    /// Enforce the password policy and hash.
    pub fn hash_password(&self, password: &str) -> Result<String, DomainError> {
        password::validate_password_policy(password)?;
        password::hash_password(password, self.bcrypt_cost)
    }

    pub async fn issue_verify_token(&self, user_id: &str) -> Result<String, DomainError> {
        let raw = credentials::generate_opaque_token();
        let record = CredentialRecord::new(user_id, &raw, self.lifetimes.verify);
        self.store.put_credential(CredentialKind::Verify, &record).await?;
        Ok(raw)
    }

    pub async fn confirm_verify_token(&self, raw: &str) -> Result<User, DomainError> {
        let record = self
            .store
            .find_credential(CredentialKind::Verify, &credentials::digest(raw))
            .await?
            .ok_or(DomainError::TokenInvalid("Verify token"))?;

        if record.is_expired() {
            return Err(DomainError::TokenExpired("Verify token"));
        }

        let mut user = self
            .store
            .find_user(&record.user_id)
            .await?
            .ok_or(DomainError::TokenInvalid("Verify token"))?;

        user.verified = true;
        self.store.update_user(&user).await?;
        self.store.delete_credential(CredentialKind::Verify, &user.id).await?;
        info!(user_id = %user.id, "Email address verified");
        Ok(user)
    }

    /// Issue a recovery code for the account behind `email`, if there is one.
    pub async fn issue_reset_code(&self, email: &str) -> Result<Option<(User, String)>, DomainError> {
        let Some(user) = self.store.find_user_by_email(email).await? else {
            debug!("Recovery requested for unknown email");
            return Ok(None);
        };

        let code = credentials::generate_reset_code();
        let record = CredentialRecord::new(user.id.clone(), &code, self.lifetimes.reset);
        self.store.put_credential(CredentialKind::Reset, &record).await?;
        Ok(Some((user, code)))
    }

    /// Set a new password using a recovery code. Revokes the current session.
    ///
    /// The code reached the user's mailbox, so a successful reset also marks
    /// the email as verified. After `MAX_RESET_ATTEMPTS` wrong guesses the
    /// code is discarded and a new one has to be requested.
    pub async fn confirm_reset_code(&self, email: &str, code: &str, new_password: &str) -> Result<(), DomainError> {
        let mut user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(DomainError::TokenInvalid("Reset code"))?;

        let record = self
            .store
            .find_credential_for_user(CredentialKind::Reset, &user.id)
            .await?
            .ok_or(DomainError::TokenInvalid("Reset code"))?;

        if record.is_expired() {
            return Err(DomainError::TokenExpired("Reset code"));
        }
        if !record.matches(code) {
            let attempts = self.store.record_failed_attempt(CredentialKind::Reset, &user.id).await?;
            warn!(user_id = %user.id, attempts, "Reset code mismatch");
            if attempts >= MAX_RESET_ATTEMPTS {
                self.store.delete_credential(CredentialKind::Reset, &user.id).await?;
                warn!(user_id = %user.id, "Reset code discarded after too many attempts");
            }
            return Err(DomainError::TokenInvalid("Reset code"));
        }

        user.password_hash = self.hash_password(new_password)?;
        user.verified = true;
        self.store.update_user(&user).await?;
        self.store.delete_credential(CredentialKind::Reset, &user.id).await?;
        self.store.delete_credential(CredentialKind::Refresh, &user.id).await?;
        info!(user_id = %user.id, "Password reset with recovery code");
        Ok(())
    }

    /// Store a new password for `user` and end every session and resource
    /// token that was issued under the old one.
    pub async fn change_password(&self, user: &mut User, new_password: &str) -> Result<(), DomainError> {
        user.password_hash = self.hash_password(new_password)?;
        self.store.update_user(user).await?;
        self.store.delete_credential(CredentialKind::Refresh, &user.id).await?;
        self.store.delete_credential(CredentialKind::Resource, &user.id).await?;
        info!(user_id = %user.id, "Password changed, credentials revoked");
        Ok(())
    }

    /// Re-check the caller's password and hand out a short-lived resource token.
    pub async fn issue_resource_token(
        &self,
        user_id: &str,
        password: &str,
    ) -> Result<(String, DateTime<Utc>), DomainError> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("User".to_string()))?;

        if !password::verify_password(password, &user.password_hash) {
            return Err(DomainError::InvalidCredentials);
        }

        let raw = credentials::generate_opaque_token();
        let record = CredentialRecord::new(user.id, &raw, self.lifetimes.resource);
        self.store.put_credential(CredentialKind::Resource, &record).await?;
        Ok((raw, record.expires_at))
    }

    /// The request must carry the resource token issued to `user_id`.
    pub async fn require_resource_token(&self, headers: &HeaderMap, user_id: &str) -> Result<(), DomainError> {
        let raw = credentials::resource_token(headers).ok_or(DomainError::ResourceTokenRequired)?;

        match self
            .store
            .find_credential_for_user(CredentialKind::Resource, user_id)
            .await?
        {
            Some(record) if !record.is_expired() && record.matches(raw) => Ok(()),
            _ => {
                warn!(user_id, "Resource token missing, expired or mismatched");
                Err(DomainError::ResourceTokenRequired)
            }
        }
    }
}
