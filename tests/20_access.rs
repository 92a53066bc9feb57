use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use annotater_api::auth::AuthUser;
use annotater_api::database::models::Role;

mod common;
use common::TestApp;

/// One representative route per gate.
const USER_ROUTE: (Method, &str) = (Method::GET, "/document/getDocumentsMeta");
const CONTROLLER_ROUTE: (Method, &str) = (Method::GET, "/annotType/getsAll");
const ADMIN_ROUTE: (Method, &str) = (Method::GET, "/user/getUsers");

async fn call(router: Router, (method, path): (Method, &str), token: Option<&str>) -> Result<(StatusCode, Value)> {
    let mut request = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let response = router.oneshot(request.body(Body::empty())?).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, body))
}

fn identity(role: Role) -> AuthUser {
    AuthUser {
        user_id: Uuid::new_v4(),
        handle: format!("{}-caller", role),
        role,
    }
}

#[tokio::test]
async fn test_health_is_public() -> Result<()> {
    let app = TestApp::spawn().await?;
    let (status, body) = call(app.router(), (Method::GET, "/health"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["database"], "memory");
    Ok(())
}

#[tokio::test]
async fn test_missing_token_is_unauthorized_on_every_gate() -> Result<()> {
    let app = TestApp::spawn().await?;
    for route in [USER_ROUTE, CONTROLLER_ROUTE, ADMIN_ROUTE] {
        let (status, body) = call(app.router(), route.clone(), None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", route.1);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }
    Ok(())
}

#[tokio::test]
async fn test_garbage_token_is_unauthorized() -> Result<()> {
    let app = TestApp::spawn().await?;
    let (status, _) = call(app.router(), USER_ROUTE, Some("not.a.token")).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_non_bearer_scheme_is_unauthorized() -> Result<()> {
    let app = TestApp::spawn().await?;
    let token = app.tokens.issue(&identity(Role::Admin))?;

    let request = Request::builder()
        .uri(USER_ROUTE.1)
        .header(header::AUTHORIZATION, format!("Basic {}", token))
        .body(Body::empty())?;
    let response = app.router().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_expired_admin_token_is_unauthorized_not_forbidden() -> Result<()> {
    let app = TestApp::spawn().await?;
    let expired = app
        .tokens
        .issue_at(&identity(Role::Admin), Utc::now() - Duration::hours(2))?;

    for route in [USER_ROUTE, CONTROLLER_ROUTE, ADMIN_ROUTE] {
        let (status, body) = call(app.router(), route.clone(), Some(&expired)).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", route.1);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }
    Ok(())
}

#[tokio::test]
async fn test_token_signed_with_another_key_is_unauthorized() -> Result<()> {
    let app = TestApp::spawn().await?;
    let foreign = annotater_api::auth::TokenService::new("some-other-secret", Duration::hours(1))?
        .issue(&identity(Role::Admin))?;

    let (status, _) = call(app.router(), ADMIN_ROUTE, Some(&foreign)).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_role_gates() -> Result<()> {
    let app = TestApp::spawn().await?;

    let cases = [
        (Role::User, USER_ROUTE, StatusCode::OK),
        (Role::User, CONTROLLER_ROUTE, StatusCode::FORBIDDEN),
        (Role::User, ADMIN_ROUTE, StatusCode::FORBIDDEN),
        (Role::Controller, USER_ROUTE, StatusCode::OK),
        (Role::Controller, CONTROLLER_ROUTE, StatusCode::OK),
        (Role::Controller, ADMIN_ROUTE, StatusCode::FORBIDDEN),
        (Role::Admin, USER_ROUTE, StatusCode::OK),
        (Role::Admin, CONTROLLER_ROUTE, StatusCode::OK),
        (Role::Admin, ADMIN_ROUTE, StatusCode::OK),
    ];

    for (role, route, expected) in cases {
        let token = app.tokens.issue(&identity(role))?;
        let (status, body) = call(app.router(), route.clone(), Some(&token)).await?;
        assert_eq!(status, expected, "{} on {}", role, route.1);
        if expected == StatusCode::FORBIDDEN {
            assert_eq!(body["code"], "FORBIDDEN");
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_whoami_reflects_verified_claims() -> Result<()> {
    let app = TestApp::spawn().await?;
    let caller = identity(Role::Controller);
    let token = app.tokens.issue(&caller)?;

    let (status, body) = call(app.router(), (Method::GET, "/user/me"), Some(&token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], caller.user_id.to_string());
    assert_eq!(body["data"]["handle"], caller.handle);
    assert_eq!(body["data"]["role"], "controller");
    Ok(())
}
