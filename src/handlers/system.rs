// handlers/system.rs - GET / and GET /health

use axum::extract::State;
use serde_json::json;

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

/// GET / - service description
pub async fn root() -> ApiResult<serde_json::Value> {
    Ok(ApiResponse::success(json!({
        "name": "Family Benefits API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Directory of family benefits by city, institution and eligibility criteria",
        "endpoints": {
            "auth": "/api/auth/{login,refresh,logout,me,recovery,recovery/confirm,verify,resource-token}",
            "users": "/api/users[/:id[/password]]",
            "admins": "/api/admins[/:id]",
            "cities": "/api/cities[/:id]",
            "institutions": "/api/institutions[/:id]",
            "benefits": "/api/benefits[/:id[/{cities,institutions,criteria}/:id]]",
            "criteria": "/api/criteria[/:id]",
            "criterion_types": "/api/criterion-types[/:id]",
        }
    })))
}

/// GET /health - 503 when the store does not answer
pub async fn health(State(state): State<AppState>) -> ApiResult<serde_json::Value> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!("Health check failed: {}", e);
        ApiError::service_unavailable("Store unavailable")
    })?;

    Ok(ApiResponse::success(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
        "store": "ok",
    })))
}
