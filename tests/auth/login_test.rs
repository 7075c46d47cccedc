use axum::http::StatusCode;
use serde_json::{json, Value};

use crate::common::{login_user, register_user, test_password, TestContext};

// =============================================================================
// INTEGRATION TESTS - LOGIN ENDPOINT
// =============================================================================

#[tokio::test]
async fn test_login_returns_token_pair_and_opens_session() {
    let ctx = TestContext::new().await;
    let (username, email) = register_user(&ctx).await;

    let body = login_user(&ctx, &email).await;

    assert!(body["access_token"].as_str().is_some());
    assert!(body["refresh_token"].as_str().is_some());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["mfa_required"], false);
    assert_eq!(body["user"]["username"], username);
    assert_eq!(ctx.sessions.count(), 1);

    // The access token resolves back to the same account.
    let me = ctx
        .server
        .get("/auth/me")
        .authorization_bearer(body["access_token"].as_str().unwrap())
        .await;
    me.assert_status_ok();
    let me_body: Value = me.json();
    assert_eq!(me_body["username"], username);
}

#[tokio::test]
async fn test_login_accepts_username_as_identifier() {
    let ctx = TestContext::new().await;
    let (username, _email) = register_user(&ctx).await;

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "username_or_email": &username,
            "password": test_password()
        }))
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_login_wrong_password_unauthorized() {
    let ctx = TestContext::new().await;
    let (_username, email) = register_user(&ctx).await;

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "username_or_email": &email,
            "password": "WrongPassword123!"
        }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(ctx.sessions.count(), 0);
}

#[tokio::test]
async fn test_login_unknown_user_not_found() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "username_or_email": "nobody@example.com",
            "password": test_password()
        }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_login_records_last_login() {
    let ctx = TestContext::new().await;
    let (_username, email) = register_user(&ctx).await;

    assert!(ctx.users.get_by_email(&email).unwrap().last_login.is_none());
    login_user(&ctx, &email).await;
    assert!(ctx.users.get_by_email(&email).unwrap().last_login.is_some());
}

#[tokio::test]
async fn test_suspended_account_cannot_login() {
    let ctx = TestContext::new().await;
    let (_username, email) = register_user(&ctx).await;

    ctx.users.mutate(&email, |u| {
        u.status = outlet_auth::modules::auth::model::UserStatus::Suspended;
    });

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "username_or_email": &email,
            "password": test_password()
        }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
}
