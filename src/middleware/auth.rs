use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use tracing::{debug, warn};

use crate::auth::credentials::{self, REFRESH_TOKEN_COOKIE, REFRESH_TOKEN_HEADER};
use crate::auth::{AuthService, Authentication, IssuedTokens};
use crate::error::{ApiError, DomainError};
use crate::routing::{Access, RouteMatch, RouteTable};
use crate::state::AppState;

/// Outcome of checking one request against the route table.
#[derive(Debug)]
pub enum Decision {
    /// Pass through without a session
    Public,
    /// 401
    Unauthenticated,
    /// 403. Carries credentials when the session was renewed on the way in.
    Unauthorized { reissued: Option<IssuedTokens> },
    /// 405
    MethodNotAllowed,
    /// 404
    NotFound,
    Authorized(Authentication),
}

/// Classify the request and resolve the caller when the route needs one.
pub async fn decide(
    routes: &RouteTable,
    auth: &AuthService,
    method: &Method,
    path: &str,
    headers: &HeaderMap,
) -> Result<Decision, DomainError> {
    let access = match routes.classify(method, path) {
        RouteMatch::Matched(access) => access,
        RouteMatch::MethodNotAllowed => return Ok(Decision::MethodNotAllowed),
        RouteMatch::Unrouted => return Ok(Decision::NotFound),
    };

    let decision = match access {
        Access::Public => Decision::Public,
        Access::Anonymous => {
            if credentials::refresh_token(headers).is_some() {
                Decision::Unauthorized { reissued: None }
            } else {
                Decision::Public
            }
        }
        Access::Authenticated => match auth.authenticate(headers).await? {
            Some(authentication) => Decision::Authorized(authentication),
            None => Decision::Unauthenticated,
        },
        Access::Roles(accepted) => match auth.authenticate(headers).await? {
            None => Decision::Unauthenticated,
            Some(authentication) if authentication.context.roles.allows(&accepted) => {
                Decision::Authorized(authentication)
            }
            Some(authentication) => {
                warn!(
                    user_id = %authentication.context.user_id,
                    roles = %authentication.context.roles,
                    required = %accepted,
                    "Role check failed for {} {}",
                    method,
                    path
                );
                Decision::Unauthorized {
                    reissued: authentication.reissued,
                }
            }
        },
    };

    Ok(decision)
}

/// Gatekeeper for every request: short-circuits 401/403/404/405, otherwise
/// injects the [`UserContext`](crate::auth::UserContext) and runs the handler.
pub async fn access_filter(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let decision = match decide(&state.routes, &state.auth, &method, &path, request.headers()).await {
        Ok(decision) => decision,
        Err(e) => return ApiError::from(e).into_response(),
    };
    debug!("{} {} -> {:?}", method, path, decision_name(&decision));

    let secure = state.config.security.require_https;

    match decision {
        Decision::Public => next.run(request).await,
        Decision::NotFound => ApiError::not_found(format!("No route for {} {}", method, path)).into_response(),
        Decision::MethodNotAllowed => {
            ApiError::method_not_allowed(format!("Method {} not allowed on {}", method, path)).into_response()
        }
        Decision::Unauthenticated => ApiError::unauthorized("Authentication required").into_response(),
        Decision::Unauthorized { reissued } => {
            let mut response = ApiError::forbidden("Insufficient permissions").into_response();
            if let Some(tokens) = reissued {
                attach_tokens(response.headers_mut(), &tokens, secure);
            }
            response
        }
        Decision::Authorized(Authentication { context, reissued }) => {
            request.extensions_mut().insert(context);
            let mut response = next.run(request).await;
            if let Some(tokens) = reissued {
                attach_tokens(response.headers_mut(), &tokens, secure);
            }
            response
        }
    }
}

fn decision_name(decision: &Decision) -> &'static str {
    match decision {
        Decision::Public => "public",
        Decision::Unauthenticated => "unauthenticated",
        Decision::Unauthorized { .. } => "unauthorized",
        Decision::MethodNotAllowed => "method not allowed",
        Decision::NotFound => "not found",
        Decision::Authorized(_) => "authorized",
    }
}

/// HttpOnly cookie scoped to the API carrying the refresh token.
pub fn refresh_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((REFRESH_TOKEN_COOKIE, token))
        .http_only(true)
        .path("/api")
        .same_site(SameSite::Strict)
        .secure(secure)
        .build()
}

/// Cookie that makes the browser drop its refresh token.
pub fn expired_refresh_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build((REFRESH_TOKEN_COOKIE, "")).path("/api").build();
    cookie.make_removal();
    cookie
}

/// Put re-issued credentials on an outgoing response.
pub fn attach_tokens(headers: &mut HeaderMap, tokens: &IssuedTokens, secure: bool) {
    let values = (
        HeaderValue::from_str(&format!("Bearer {}", tokens.access_token)),
        HeaderValue::from_str(&tokens.refresh_token),
        HeaderValue::from_str(&refresh_cookie(tokens.refresh_token.clone(), secure).to_string()),
    );

    match values {
        (Ok(authorization), Ok(refresh), Ok(cookie)) => {
            headers.insert(header::AUTHORIZATION, authorization);
            headers.insert(REFRESH_TOKEN_HEADER, refresh);
            headers.append(header::SET_COOKIE, cookie);
        }
        _ => warn!("Re-issued credentials are not valid header values; not attached"),
    }
}
