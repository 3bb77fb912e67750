mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use chrono::Duration;
use serde_json::json;

use common::{TestApp, PASSWORD};
use family_benefits_api::auth::{Claims, Role, RoleSet};

#[tokio::test]
async fn login_returns_tokens_and_sets_cookie() -> Result<()> {
    let app = TestApp::new()?;
    let user = app.user("parent@example.com", &[Role::User]).await?;

    let res = app
        .send(
            app.request(Method::POST, "/api/auth/login")
                .json(json!({ "email": "Parent@Example.com", "password": PASSWORD })),
        )
        .await?;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["user"]["id"], user.id.as_str());
    assert_eq!(res.body["data"]["tokenType"], "Bearer");
    assert!(res.body["data"]["accessToken"].as_str().is_some());
    let refresh = res.body["data"]["refreshToken"].as_str().unwrap_or_default();
    assert_eq!(refresh.len(), 64);

    let cookie = res.header("set-cookie").unwrap_or_default();
    assert!(cookie.starts_with(&format!("refresh_token={}", refresh)));
    assert!(cookie.contains("HttpOnly"));
    Ok(())
}

#[tokio::test]
async fn login_failures() -> Result<()> {
    let app = TestApp::new()?;
    app.user("parent@example.com", &[Role::User]).await?;

    let wrong = app
        .send(
            app.request(Method::POST, "/api/auth/login")
                .json(json!({ "email": "parent@example.com", "password": "Wrong1234" })),
        )
        .await?;
    let unknown = app
        .send(
            app.request(Method::POST, "/api/auth/login")
                .json(json!({ "email": "nobody@example.com", "password": PASSWORD })),
        )
        .await?;

    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.body["error"]["message"], unknown.body["error"]["message"]);
    Ok(())
}

#[tokio::test]
async fn signup_verify_then_login() -> Result<()> {
    let app = TestApp::new()?;

    let res = app
        .send(app.request(Method::POST, "/api/users").json(json!({
            "name": "New Parent",
            "email": "new@example.com",
            "password": PASSWORD,
            "confirmPassword": PASSWORD,
        })))
        .await?;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["data"]["verified"], false);

    let login = json!({ "email": "new@example.com", "password": PASSWORD });
    let res = app
        .send(app.request(Method::POST, "/api/auth/login").json(login.clone()))
        .await?;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let mail = app.mailer.last_to("new@example.com").expect("verification mail");
    let token = mail
        .text
        .split("token=")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .expect("token in link")
        .to_string();

    let res = app
        .send(app.request(Method::POST, "/api/auth/verify").json(json!({ "token": token })))
        .await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["verified"], true);

    let res = app.send(app.request(Method::POST, "/api/auth/login").json(login)).await?;
    assert_eq!(res.status, StatusCode::OK);

    let res = app
        .send(app.request(Method::POST, "/api/auth/verify").json(json!({ "token": token })))
        .await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn refresh_endpoint_rotates_token() -> Result<()> {
    let app = TestApp::new()?;
    let user = app.user("parent@example.com", &[Role::User]).await?;
    let issued = app.state.auth.issue_tokens(&user).await?;

    let res = app
        .send(app.request(Method::POST, "/api/auth/refresh").header("refresh-token", &issued.refresh_token))
        .await?;
    assert_eq!(res.status, StatusCode::OK);
    let rotated = res.body["data"]["refreshToken"].as_str().unwrap_or_default().to_string();
    assert_ne!(rotated, issued.refresh_token);

    // old token is spent
    let res = app
        .send(app.request(Method::POST, "/api/auth/refresh").header("refresh-token", &issued.refresh_token))
        .await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    // the cookie works as well as the header
    let res = app
        .send(
            app.request(Method::POST, "/api/auth/refresh")
                .header("cookie", &format!("refresh_token={}", rotated)),
        )
        .await?;
    assert_eq!(res.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn refresh_without_token_is_unauthorized() -> Result<()> {
    let app = TestApp::new()?;
    let res = app.send(app.request(Method::POST, "/api/auth/refresh")).await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["success"], false);
    Ok(())
}

#[tokio::test]
async fn expired_jwt_is_renewed_from_refresh_token() -> Result<()> {
    let app = TestApp::new()?;
    let user = app.user("parent@example.com", &[Role::User]).await?;
    let issued = app.state.auth.issue_tokens(&user).await?;

    let stale = Claims::new(&user.id, RoleSet::of(&[Role::User]), "family-benefits-api", Duration::minutes(-5));
    let stale = app.state.auth.keys().generate(&stale)?;

    let res = app
        .send(
            app.request(Method::GET, "/api/auth/me")
                .auth(&format!("Bearer {}", stale))
                .header("refresh-token", &issued.refresh_token),
        )
        .await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["id"], user.id.as_str());

    let new_jwt = res.header("authorization").unwrap_or_default().trim_start_matches("Bearer ");
    assert!(app.state.auth.keys().validate(new_jwt).is_ok());
    let new_refresh = res.header("refresh-token").unwrap_or_default();
    assert_ne!(new_refresh, issued.refresh_token);
    assert!(res.header("set-cookie").unwrap_or_default().contains("Path=/api"));

    // the old refresh token no longer authenticates
    let res = app
        .send(app.request(Method::GET, "/api/auth/me").header("refresh-token", &issued.refresh_token))
        .await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn logout_revokes_session() -> Result<()> {
    let app = TestApp::new()?;
    let user = app.user("parent@example.com", &[Role::User]).await?;
    let issued = app.state.auth.issue_tokens(&user).await?;
    let bearer = app.bearer(&user)?;

    let res = app.send(app.request(Method::POST, "/api/auth/logout").auth(&bearer)).await?;
    assert_eq!(res.status, StatusCode::NO_CONTENT);
    assert!(res.header("set-cookie").unwrap_or_default().contains("Max-Age=0"));

    let res = app
        .send(app.request(Method::POST, "/api/auth/refresh").header("refresh-token", &issued.refresh_token))
        .await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn resource_token_requires_password() -> Result<()> {
    let app = TestApp::new()?;
    let user = app.user("parent@example.com", &[Role::User]).await?;
    let bearer = app.bearer(&user)?;

    let res = app
        .send(
            app.request(Method::POST, "/api/auth/resource-token")
                .auth(&bearer)
                .json(json!({ "password": "Wrong1234" })),
        )
        .await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = app
        .send(
            app.request(Method::POST, "/api/auth/resource-token")
                .auth(&bearer)
                .json(json!({ "password": PASSWORD })),
        )
        .await?;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["data"]["resourceToken"].as_str().map(str::len), Some(32));
    Ok(())
}
