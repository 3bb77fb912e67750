mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{TestApp, PASSWORD};
use family_benefits_api::auth::Role;
use family_benefits_api::database::new_id;

#[tokio::test]
async fn signup_refused_when_refresh_token_present() -> Result<()> {
    let app = TestApp::new()?;
    let body = json!({
        "name": "Parent",
        "email": "parent@example.com",
        "password": PASSWORD,
        "confirmPassword": PASSWORD,
    });

    let res = app
        .send(
            app.request(Method::POST, "/api/users")
                .header("refresh-token", "anything")
                .json(body.clone()),
        )
        .await?;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert!(app.mailer.sent().is_empty());

    let res = app
        .send(
            app.request(Method::POST, "/api/users")
                .header("cookie", "refresh_token=anything")
                .json(body.clone()),
        )
        .await?;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app.send(app.request(Method::POST, "/api/users").json(body)).await?;
    assert_eq!(res.status, StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn admin_is_not_implicitly_a_user() -> Result<()> {
    let app = TestApp::new()?;
    let admin = app.user("admin@example.com", &[Role::Admin]).await?;
    let bearer = app.bearer(&admin)?;

    let res = app
        .send(app.request(Method::GET, &format!("/api/users/{}", admin.id)).auth(&bearer))
        .await?;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.body["error"]["code"], "FORBIDDEN");
    Ok(())
}

#[tokio::test]
async fn super_admin_is_not_implicitly_an_admin() -> Result<()> {
    let app = TestApp::new()?;
    let root = app.user("root@example.com", &[Role::SuperAdmin]).await?;
    let bearer = app.bearer(&root)?;

    let res = app
        .send(app.request(Method::POST, "/api/cities").auth(&bearer).json(json!({ "name": "Minsk" })))
        .await?;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app.send(app.request(Method::GET, "/api/admins").auth(&bearer)).await?;
    assert_eq!(res.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn missing_or_bad_credentials_are_unauthorized() -> Result<()> {
    let app = TestApp::new()?;

    let res = app.send(app.request(Method::GET, "/api/users")).await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = app
        .send(app.request(Method::GET, "/api/users").auth("Bearer not.a.jwt"))
        .await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = app
        .send(app.request(Method::GET, "/api/auth/me").header("refresh-token", "never-issued"))
        .await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn wrong_method_and_unknown_path() -> Result<()> {
    let app = TestApp::new()?;

    let res = app.send(app.request(Method::PATCH, "/api/cities")).await?;
    assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.body["error"]["code"], "METHOD_NOT_ALLOWED");

    let res = app.send(app.request(Method::GET, "/api/cities/too-short")).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let long_id = format!("{}abcdefg", new_id());
    let res = app
        .send(app.request(Method::GET, &format!("/api/criterion-types/{}", long_id)))
        .await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn public_reads_need_no_session() -> Result<()> {
    let app = TestApp::new()?;
    for segment in ["cities", "institutions", "benefits", "criteria", "criterion-types"] {
        let res = app.send(app.request(Method::GET, &format!("/api/{}", segment))).await?;
        assert_eq!(res.status, StatusCode::OK, "{}", segment);
        assert_eq!(res.body["data"], json!([]));
    }
    Ok(())
}

#[tokio::test]
async fn denied_request_still_returns_rotated_credentials() -> Result<()> {
    let app = TestApp::new()?;
    let admin = app.user("admin@example.com", &[Role::Admin]).await?;
    let issued = app.state.auth.issue_tokens(&admin).await?;

    let res = app
        .send(
            app.request(Method::GET, &format!("/api/users/{}", admin.id))
                .header("refresh-token", &issued.refresh_token),
        )
        .await?;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    let rotated = res.header("refresh-token").unwrap_or_default();
    assert_eq!(rotated.len(), 64);
    assert_ne!(rotated, issued.refresh_token);
    Ok(())
}
