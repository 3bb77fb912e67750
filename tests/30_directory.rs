mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use common::TestApp;
use family_benefits_api::auth::Role;
use family_benefits_api::database::new_id;

struct Admin {
    app: TestApp,
    bearer: String,
}

impl Admin {
    async fn new() -> Result<Self> {
        let app = TestApp::new()?;
        let admin = app.user("admin@example.com", &[Role::Admin]).await?;
        let bearer = app.bearer(&admin)?;
        Ok(Self { app, bearer })
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> Result<common::TestResponse> {
        let mut request = self.app.request(method, uri).auth(&self.bearer);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.app.send(request).await
    }

    async fn create(&self, segment: &str, body: Value) -> Result<String> {
        let res = self.call(Method::POST, &format!("/api/{}", segment), Some(body)).await?;
        assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
        Ok(res.body["data"]["id"].as_str().unwrap_or_default().to_string())
    }
}

#[tokio::test]
async fn city_crud() -> Result<()> {
    let admin = Admin::new().await?;
    let id = admin.create("cities", json!({ "name": "Minsk" })).await?;
    assert_eq!(id.len(), 32);

    let res = admin.app.send(admin.app.request(Method::GET, &format!("/api/cities/{}", id))).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"], json!({ "id": id, "name": "Minsk" }));

    let res = admin
        .call(Method::PUT, &format!("/api/cities/{}", id), Some(json!({ "name": "Brest" })))
        .await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["name"], "Brest");

    let res = admin.call(Method::DELETE, &format!("/api/cities/{}", id), None).await?;
    assert_eq!(res.status, StatusCode::NO_CONTENT);

    let res = admin.app.send(admin.app.request(Method::GET, &format!("/api/cities/{}", id))).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn duplicate_and_blank_names_rejected() -> Result<()> {
    let admin = Admin::new().await?;
    admin.create("criterion-types", json!({ "name": "Income" })).await?;

    let res = admin
        .call(Method::POST, "/api/criterion-types", Some(json!({ "name": "income" })))
        .await?;
    assert_eq!(res.status, StatusCode::CONFLICT);

    let res = admin.call(Method::POST, "/api/criterion-types", Some(json!({ "name": "  " }))).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn institutions_require_an_existing_city() -> Result<()> {
    let admin = Admin::new().await?;

    let res = admin.call(Method::POST, "/api/institutions", Some(json!({ "name": "School 1" }))).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = admin
        .call(
            Method::POST,
            "/api/institutions",
            Some(json!({ "name": "School 1", "cityId": new_id() })),
        )
        .await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let city = admin.create("cities", json!({ "name": "Minsk" })).await?;
    let res = admin
        .call(Method::POST, "/api/institutions", Some(json!({ "name": "School 1", "cityId": city })))
        .await?;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["data"]["cityId"], city.as_str());

    // city is referenced now
    let res = admin.call(Method::DELETE, &format!("/api/cities/{}", city), None).await?;
    assert_eq!(res.status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn criteria_belong_to_a_type() -> Result<()> {
    let admin = Admin::new().await?;
    let kind = admin.create("criterion-types", json!({ "name": "Family size" })).await?;
    let criterion = admin
        .create("criteria", json!({ "name": "Three or more children", "criterionTypeId": kind }))
        .await?;

    let res = admin.app.send(admin.app.request(Method::GET, &format!("/api/criteria/{}", criterion))).await?;
    assert_eq!(res.body["data"]["criterionTypeId"], kind.as_str());
    Ok(())
}

#[tokio::test]
async fn benefit_links() -> Result<()> {
    let admin = Admin::new().await?;
    let benefit = admin
        .create("benefits", json!({ "name": "School meals", "description": "Free lunch" }))
        .await?;
    let city = admin.create("cities", json!({ "name": "Minsk" })).await?;

    let link = format!("/api/benefits/{}/cities/{}", benefit, city);
    let res = admin.call(Method::POST, &link, None).await?;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["data"]["cityIds"], json!([city]));
    assert_eq!(res.body["data"]["description"], "Free lunch");

    let res = admin.call(Method::POST, &link, None).await?;
    assert_eq!(res.status, StatusCode::CONFLICT);

    let res = admin
        .call(Method::POST, &format!("/api/benefits/{}/criteria/{}", benefit, new_id()), None)
        .await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = admin.app.send(admin.app.request(Method::GET, &format!("/api/benefits/{}", benefit))).await?;
    assert_eq!(res.body["data"]["cityIds"], json!([city]));
    assert_eq!(res.body["data"]["criterionIds"], json!([]));

    // deleting the city drops the link
    admin.call(Method::DELETE, &format!("/api/cities/{}", city), None).await?;
    let res = admin.app.send(admin.app.request(Method::GET, &format!("/api/benefits/{}", benefit))).await?;
    assert_eq!(res.body["data"]["cityIds"], json!([]));
    Ok(())
}

#[tokio::test]
async fn plain_users_cannot_write() -> Result<()> {
    let app = TestApp::new()?;
    let user = app.user("parent@example.com", &[Role::User]).await?;
    let bearer = app.bearer(&user)?;

    let res = app
        .send(app.request(Method::POST, "/api/benefits").auth(&bearer).json(json!({ "name": "X" })))
        .await?;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    Ok(())
}
