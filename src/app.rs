use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::credentials::{REFRESH_TOKEN_HEADER, RESOURCE_TOKEN_HEADER};
use crate::config::SecurityConfig;
use crate::database::DirectoryKind;
use crate::handlers::{self, directory};
use crate::middleware::access_filter;
use crate::state::AppState;

/// The full HTTP surface. Every request passes the access filter first.
pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(handlers::system::root))
        .route("/health", get(handlers::system::health))
        .merge(auth_routes())
        .merge(user_routes())
        .merge(admin_routes())
        .merge(directory::link_routes());

    for kind in DirectoryKind::ALL {
        router = router.merge(directory::routes(kind));
    }

    let router = router
        .layer(middleware::from_fn_with_state(state.clone(), access_filter))
        .layer(DefaultBodyLimit::max(state.config.api.max_request_size_bytes));

    let router = if state.config.api.enable_request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    };

    let router = if state.config.security.enable_cors {
        router.layer(cors_layer(&state.config.security))
    } else {
        router
    };

    router.with_state(state)
}

fn auth_routes() -> Router<AppState> {
    use handlers::auth;

    Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/resource-token", post(auth::resource_token))
        .route("/api/auth/recovery", post(auth::recovery))
        .route("/api/auth/recovery/confirm", post(auth::recovery_confirm))
        .route("/api/auth/verify", post(auth::verify))
}

fn user_routes() -> Router<AppState> {
    use handlers::users;

    Router::new()
        .route("/api/users", get(users::list).post(users::create))
        .route(
            "/api/users/:id",
            get(users::get).put(users::update).delete(users::delete),
        )
        .route("/api/users/:id/password", patch(users::change_password))
}

fn admin_routes() -> Router<AppState> {
    use handlers::admins;

    Router::new()
        .route("/api/admins", get(admins::list).post(admins::create))
        .route(
            "/api/admins/:id",
            get(admins::get).put(admins::update).delete(admins::delete),
        )
}

/// Wildcard origin when none are configured (or `*` is listed).
fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter(|origin| origin.as_str() != "*")
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if origins.is_empty() || security.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(REFRESH_TOKEN_HEADER),
            HeaderName::from_static(RESOURCE_TOKEN_HEADER),
        ])
        .expose_headers([header::AUTHORIZATION, HeaderName::from_static(REFRESH_TOKEN_HEADER)])
        .allow_credentials(true)
}
