use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use crate::auth::{Role, RoleSet};
use crate::config::AppConfig;
use crate::database::{MemoryStore, User, UserStore};
use crate::mail::MemoryMailer;
use crate::state::AppState;

pub const TEST_PASSWORD: &str = "Secret123";

/// In-process application over the memory store and mailer.
pub struct TestContext {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<MemoryMailer>,
}

impl TestContext {
    pub fn new() -> anyhow::Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(MemoryMailer::new());
        let state = AppState::new(AppConfig::development(), store.clone(), mailer.clone())?;
        Ok(Self { state, store, mailer })
    }

    pub fn router(&self) -> Router {
        crate::app(self.state.clone())
    }

    /// Verified account with `TEST_PASSWORD`.
    pub async fn create_user(&self, email: &str, roles: &[Role]) -> anyhow::Result<User> {
        let hash = self.state.auth.hash_password(TEST_PASSWORD)?;
        let mut user = User::new("Test User", email, hash, RoleSet::of(roles));
        user.verified = true;
        self.store.insert_user(&user).await?;
        Ok(user)
    }

    pub fn bearer(&self, user: &User) -> anyhow::Result<String> {
        let claims = self.state.auth.keys().claims_for(&user.id, user.roles.clone());
        Ok(format!("Bearer {}", self.state.auth.keys().generate(&claims)?))
    }

    pub async fn send(&self, request: Request<Body>) -> anyhow::Result<(StatusCode, Value)> {
        let response = self.router().oneshot(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, body))
    }
}

pub fn get(uri: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::empty()).expect("valid request")
}
