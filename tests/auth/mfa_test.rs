use axum::http::StatusCode;
use serde_json::{json, Value};

use crate::common::{login_user, register_user, test_password, TestContext};

// =============================================================================
// INTEGRATION TESTS - MFA ENROLLMENT & STEP-UP
// =============================================================================

/// Register, log in, and enroll an authenticator. Returns (email, secret,
/// access_token from the enrollment session).
async fn enroll_mfa(ctx: &TestContext) -> (String, String, String) {
    let (username, email) = register_user(ctx).await;
    let login = login_user(ctx, &email).await;
    let access_token = login["access_token"].as_str().unwrap().to_string();

    let setup = ctx
        .server
        .post("/auth/mfa/setup")
        .authorization_bearer(&access_token)
        .await;
    setup.assert_status_ok();
    let setup_body: Value = setup.json();
    let secret = setup_body["secret"].as_str().unwrap().to_string();
    assert!(setup_body["otpauth_url"]
        .as_str()
        .unwrap()
        .starts_with("otpauth://totp/"));

    let code = ctx.totp.current_code(&secret, &username).unwrap();
    let enable = ctx
        .server
        .post("/auth/mfa/enable")
        .authorization_bearer(&access_token)
        .json(&json!({ "code": code }))
        .await;
    enable.assert_status_ok();

    (email, secret, access_token)
}

#[tokio::test]
async fn test_mfa_setup_and_enable() {
    let ctx = TestContext::new().await;
    let (email, _secret, _token) = enroll_mfa(&ctx).await;

    let stored = ctx.users.get_by_email(&email).unwrap();
    assert!(stored.mfa_enabled);
    assert!(stored.mfa_secret.is_some());
}

#[tokio::test]
async fn test_enable_rejects_wrong_code() {
    let ctx = TestContext::new().await;
    let (_username, email) = register_user(&ctx).await;
    let login = login_user(&ctx, &email).await;
    let access_token = login["access_token"].as_str().unwrap();

    let setup = ctx
        .server
        .post("/auth/mfa/setup")
        .authorization_bearer(access_token)
        .await;
    setup.assert_status_ok();

    let enable = ctx
        .server
        .post("/auth/mfa/enable")
        .authorization_bearer(access_token)
        .json(&json!({ "code": "000000" }))
        .await;
    enable.assert_status(StatusCode::UNAUTHORIZED);

    assert!(!ctx.users.get_by_email(&email).unwrap().mfa_enabled);
}

#[tokio::test]
async fn test_login_without_code_requires_step_up() {
    let ctx = TestContext::new().await;
    let (email, _secret, _token) = enroll_mfa(&ctx).await;
    let sessions_before = ctx.sessions.count();

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "username_or_email": &email,
            "password": test_password()
        }))
        .await;

    // Password alone gets a step-up challenge, never tokens.
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["mfa_required"], true);
    assert!(body["access_token"].is_null());
    assert!(body["refresh_token"].is_null());
    assert_eq!(ctx.sessions.count(), sessions_before);
}

#[tokio::test]
async fn test_login_with_valid_code_succeeds() {
    let ctx = TestContext::new().await;
    let (email, secret, _token) = enroll_mfa(&ctx).await;
    let sessions_before = ctx.sessions.count();

    let username = ctx.users.get_by_email(&email).unwrap().username;
    let code = ctx.totp.current_code(&secret, &username).unwrap();

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "username_or_email": &email,
            "password": test_password(),
            "mfa_code": code
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["mfa_required"], false);
    assert!(body["access_token"].as_str().is_some());
    assert_eq!(ctx.sessions.count(), sessions_before + 1);
}

#[tokio::test]
async fn test_login_with_wrong_code_rejected() {
    let ctx = TestContext::new().await;
    let (email, secret, _token) = enroll_mfa(&ctx).await;

    let username = ctx.users.get_by_email(&email).unwrap().username;
    let real = ctx.totp.current_code(&secret, &username).unwrap();
    let wrong = if real == "000000" { "000001" } else { "000000" };

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "username_or_email": &email,
            "password": test_password(),
            "mfa_code": wrong
        }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_disable_mfa_requires_password() {
    let ctx = TestContext::new().await;
    let (email, _secret, access_token) = enroll_mfa(&ctx).await;

    let wrong = ctx
        .server
        .post("/auth/mfa/disable")
        .authorization_bearer(&access_token)
        .json(&json!({ "password": "WrongPassword123!" }))
        .await;
    wrong.assert_status(StatusCode::UNAUTHORIZED);
    assert!(ctx.users.get_by_email(&email).unwrap().mfa_enabled);

    let ok = ctx
        .server
        .post("/auth/mfa/disable")
        .authorization_bearer(&access_token)
        .json(&json!({ "password": test_password() }))
        .await;
    ok.assert_status_ok();

    let stored = ctx.users.get_by_email(&email).unwrap();
    assert!(!stored.mfa_enabled);
    assert!(stored.mfa_secret.is_none());

    // Plain password login works again.
    login_user(&ctx, &email).await;
}
