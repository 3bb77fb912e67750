use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

/// Request/response header carrying the refresh token.
pub const REFRESH_TOKEN_HEADER: &str = "refresh-token";
/// Cookie carrying the refresh token.
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
/// Header carrying the resource token for profile-scoped operations.
pub const RESOURCE_TOKEN_HEADER: &str = "resource-token";

const REFRESH_TOKEN_LENGTH: usize = 64;
const OPAQUE_TOKEN_LENGTH: usize = 32;

/// Stored credential families. Each is unique per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    Refresh,
    Reset,
    Verify,
    Resource,
}

impl CredentialKind {
    pub fn table(&self) -> &'static str {
        match self {
            CredentialKind::Refresh => "refresh_tokens",
            CredentialKind::Reset => "reset_codes",
            CredentialKind::Verify => "verify_tokens",
            CredentialKind::Resource => "resource_tokens",
        }
    }
}

/// Persisted form of a credential: only the digest is kept.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CredentialRecord {
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn new(user_id: impl Into<String>, raw: &str, ttl: Duration) -> Self {
        Self {
            user_id: user_id.into(),
            token_hash: digest(raw),
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    pub fn matches(&self, raw: &str) -> bool {
        self.token_hash == digest(raw)
    }
}

/// SHA-256 hex digest used as the lookup key for stored credentials.
pub fn digest(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn generate_refresh_token() -> String {
    random_alphanumeric(REFRESH_TOKEN_LENGTH)
}

pub fn generate_opaque_token() -> String {
    random_alphanumeric(OPAQUE_TOKEN_LENGTH)
}

/// Six digit recovery code, zero padded.
pub fn generate_reset_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32))
}

/// Bearer token from the Authorization header, if well formed.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Refresh token from the dedicated header, falling back to the cookie.
pub fn refresh_token(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(REFRESH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    from_header.or_else(|| {
        CookieJar::from_headers(headers)
            .get(REFRESH_TOKEN_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    })
}

pub fn resource_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(RESOURCE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
