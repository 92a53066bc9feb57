use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

use annotater_api::database::models::Role;

mod common;
use common::TestApp;

#[tokio::test]
async fn test_sign_up_and_sign_in() -> Result<()> {
    let app = TestApp::spawn().await?;

    let user = app.sign_up("alice", "wonderland-42").await?;
    assert_eq!(user["handle"], "alice");
    assert_eq!(user["role"], "user");
    assert!(user.get("password_hash").is_none(), "hash must never be serialized");

    let res = app
        .client()
        .post(app.url("/user/SignIn"))
        .json(&json!({ "handle": "alice", "password": "wonderland-42" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["user"]["handle"], "alice");
    assert_eq!(body["data"]["user"]["role"], "user");
    assert!(body["data"]["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["data"]["expires_in"], 3600);

    Ok(())
}

#[tokio::test]
async fn test_duplicate_handle_conflicts() -> Result<()> {
    let app = TestApp::spawn().await?;
    app.sign_up("alice", "wonderland-42").await?;

    let res = app
        .client()
        .post(app.url("/user/SignUp"))
        .json(&json!({ "handle": "alice", "password": "another-password" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let body: Value = res.json().await?;
    assert_eq!(body["error"], true);
    assert_eq!(body["code"], "CONFLICT");

    Ok(())
}

#[tokio::test]
async fn test_weak_password_rejected() -> Result<()> {
    let app = TestApp::spawn().await?;

    let res = app
        .client()
        .post(app.url("/user/SignUp"))
        .json(&json!({ "handle": "bob", "password": "short" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert_eq!(body["code"], "VALIDATION_ERROR");

    Ok(())
}

#[tokio::test]
async fn test_wrong_password_and_unknown_handle_look_alike() -> Result<()> {
    let app = TestApp::spawn().await?;
    app.sign_up("alice", "wonderland-42").await?;

    let mut messages = Vec::new();
    for (handle, password) in [("alice", "not-her-password"), ("nobody", "wonderland-42")] {
        let res = app
            .client()
            .post(app.url("/user/SignIn"))
            .json(&json!({ "handle": handle, "password": password }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: Value = res.json().await?;
        messages.push(body["message"].clone());
    }
    assert_eq!(messages[0], messages[1]);

    Ok(())
}

#[tokio::test]
async fn test_malformed_body_is_invalid_json() -> Result<()> {
    let app = TestApp::spawn().await?;

    let res = app
        .client()
        .post(app.url("/user/SignIn"))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert_eq!(body["code"], "INVALID_JSON");

    Ok(())
}

#[tokio::test]
async fn test_change_role_requires_admin() -> Result<()> {
    let app = TestApp::spawn().await?;
    let controller = app.user_with_role("carol", Role::Controller).await?;
    let target = app.sign_up("dave", "dave-password").await?;

    // controllers are below the admin gate
    let res = app
        .client()
        .post(app.url("/user/role"))
        .bearer_auth(&controller)
        .json(&json!({ "user_id": target["id"], "role": "controller" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app
        .client()
        .post(app.url("/user/role"))
        .bearer_auth(app.admin_token().await?)
        .json(&json!({ "user_id": target["id"], "role": "controller" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    // the new role shows up on the next sign-in
    let token = app.sign_in("dave", "dave-password").await?;
    let me: Value = app
        .client()
        .get(app.url("/user/me"))
        .bearer_auth(&token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(me["data"]["role"], "controller");

    Ok(())
}

#[tokio::test]
async fn test_change_role_of_unknown_user() -> Result<()> {
    let app = TestApp::spawn().await?;

    let res = app
        .client()
        .post(app.url("/user/role"))
        .bearer_auth(app.admin_token().await?)
        .json(&json!({ "user_id": uuid::Uuid::new_v4(), "role": "admin" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_list_users_hides_hashes() -> Result<()> {
    let app = TestApp::spawn().await?;
    app.sign_up("alice", "wonderland-42").await?;

    let body: Value = app
        .client()
        .get(app.url("/user/getUsers"))
        .bearer_auth(app.admin_token().await?)
        .send()
        .await?
        .json()
        .await?;

    let users = body["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|u| u.get("password_hash").is_none()));
    assert!(users.iter().any(|u| u["handle"] == "root" && u["role"] == "admin"));

    Ok(())
}
