#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use family_benefits_api::auth::{Role, RoleSet};
use family_benefits_api::config::AppConfig;
use family_benefits_api::database::{MemoryStore, User, UserStore};
use family_benefits_api::mail::MemoryMailer;
use family_benefits_api::{app, AppState};

pub const PASSWORD: &str = "Secret123";

/// One in-process application per test: memory store, memory mailer.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<MemoryMailer>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl TestApp {
    pub fn new() -> Result<Self> {
        Self::with_config(AppConfig::development())
    }

    pub fn with_config(config: AppConfig) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(MemoryMailer::new());
        let state = AppState::new(config, store.clone(), mailer.clone())?;
        Ok(Self { state, store, mailer })
    }

    /// Verified account whose password is `PASSWORD`.
    pub async fn user(&self, email: &str, roles: &[Role]) -> Result<User> {
        let hash = self.state.auth.hash_password(PASSWORD)?;
        let mut user = User::new("Test User", email, hash, RoleSet::of(roles));
        user.verified = true;
        self.store.insert_user(&user).await?;
        Ok(user)
    }

    pub fn bearer(&self, user: &User) -> Result<String> {
        let keys = self.state.auth.keys();
        let token = keys.generate(&keys.claims_for(&user.id, user.roles.clone()))?;
        Ok(format!("Bearer {}", token))
    }

    pub fn request(&self, method: Method, uri: &str) -> RequestBuilder {
        RequestBuilder {
            inner: Request::builder().method(method).uri(uri),
            body: None,
            raw: None,
        }
    }

    pub async fn send(&self, request: RequestBuilder) -> Result<TestResponse> {
        let request = request.build()?;
        let response = app(self.state.clone()).oneshot(request).await?;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await?.to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };

        Ok(TestResponse { status, headers, body })
    }
}

pub struct RequestBuilder {
    inner: axum::http::request::Builder,
    body: Option<Value>,
    raw: Option<String>,
}

impl RequestBuilder {
    pub fn auth(mut self, bearer: &str) -> Self {
        self.inner = self.inner.header(header::AUTHORIZATION, bearer);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.inner = self.inner.header(name, value);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Send `text` verbatim as an `application/json` body.
    pub fn raw_json(mut self, text: &str) -> Self {
        self.raw = Some(text.to_string());
        self
    }

    fn build(self) -> Result<Request<Body>> {
        let inner = self.inner;
        Ok(match (self.body, self.raw) {
            (Some(body), _) => inner
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            (None, Some(text)) => inner
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(text))?,
            (None, None) => inner.body(Body::empty())?,
        })
    }
}
