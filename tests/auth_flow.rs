mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_json, body_to_vec, TestApp};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct CurrentUser {
    username: String,
    is_super_admin: bool,
}

#[tokio::test]
async fn login_and_me_roundtrip() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let password = "s3cret";
    let user_id = app.insert_user("alice", password).await?;
    app.grant_super_admin(user_id).await?;

    let token = app.login_token("alice", password).await?;

    let response = app.get("/api/auth/me", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let user: CurrentUser = serde_json::from_slice(&body)?;

    assert_eq!(user.username, "alice");
    assert!(user.is_super_admin);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn wrong_password_and_unknown_user_look_the_same() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    app.insert_user("bob", "correct-horse").await?;

    for payload in [
        json!({ "username": "bob", "password": "battery-staple" }),
        json!({ "username": "nobody", "password": "correct-horse" }),
    ] {
        let response = app.post_json("/api/auth/login", &payload, None).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_to_json(response.into_body()).await?;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let response = app
        .post_json("/api/get-calls", &json!({}), None)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .post_json("/api/get-calls", &json!({}), Some("not-a-jwt"))
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);

    app.cleanup().await?;
    Ok(())
}
