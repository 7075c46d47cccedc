use axum::http::StatusCode;
use serde_json::{json, Value};

use outlet_auth::modules::auth::model::{UserRole, UserStatus};

use crate::common::{login_user, register_user, test_password, TestContext};

// =============================================================================
// INTEGRATION TESTS - ADMIN SURFACE
// =============================================================================

/// Register an account, promote it, and log it in. Returns the admin's
/// access token.
async fn admin_token(ctx: &TestContext) -> String {
    let (_username, email) = register_user(ctx).await;
    ctx.users.mutate(&email, |u| u.role = UserRole::Admin);
    let login = login_user(ctx, &email).await;
    login["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_admin_routes_reject_non_admin() {
    let ctx = TestContext::new().await;
    let (_username, email) = register_user(&ctx).await;
    let login = login_user(&ctx, &email).await;
    let token = login["access_token"].as_str().unwrap();
    let user_id = ctx.users.get_by_email(&email).unwrap().id;

    let response = ctx
        .server
        .put(&format!("/auth/admin/users/{}/status", user_id))
        .authorization_bearer(token)
        .json(&json!({ "status": "SUSPENDED" }))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_suspends_account() {
    let ctx = TestContext::new().await;
    let token = admin_token(&ctx).await;
    let (_username, email) = register_user(&ctx).await;
    let user_id = ctx.users.get_by_email(&email).unwrap().id;

    let response = ctx
        .server
        .put(&format!("/auth/admin/users/{}/status", user_id))
        .authorization_bearer(&token)
        .json(&json!({ "status": "SUSPENDED" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "SUSPENDED");

    // The suspended account can no longer log in.
    let login = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "username_or_email": &email,
            "password": test_password()
        }))
        .await;
    login.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_updates_role() {
    let ctx = TestContext::new().await;
    let token = admin_token(&ctx).await;
    let (_username, email) = register_user(&ctx).await;
    let user_id = ctx.users.get_by_email(&email).unwrap().id;

    let response = ctx
        .server
        .put(&format!("/auth/admin/users/{}/role", user_id))
        .authorization_bearer(&token)
        .json(&json!({ "role": "MANAGER" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["role"], "MANAGER");

    assert_eq!(ctx.users.get_by_email(&email).unwrap().role, UserRole::Manager);
}

#[tokio::test]
async fn test_admin_unknown_user_not_found() {
    let ctx = TestContext::new().await;
    let token = admin_token(&ctx).await;

    let response = ctx
        .server
        .put("/auth/admin/users/no-such-user/status")
        .authorization_bearer(&token)
        .json(&json!({ "status": "SUSPENDED" }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_delete_marks_account_and_sweeps_sessions() {
    let ctx = TestContext::new().await;
    let token = admin_token(&ctx).await;
    let (_username, email) = register_user(&ctx).await;
    let login = login_user(&ctx, &email).await;
    let user_id = ctx.users.get_by_email(&email).unwrap().id;

    let response = ctx
        .server
        .delete(&format!("/auth/admin/users/{}", user_id))
        .authorization_bearer(&token)
        .await;
    response.assert_status_ok();

    // Soft delete: the row survives with a terminal status.
    let stored = ctx.users.get_by_email(&email).unwrap();
    assert_eq!(stored.status, UserStatus::Deleted);

    // Open sessions are swept, and the account cannot log back in.
    ctx.server
        .get("/auth/me")
        .authorization_bearer(login["access_token"].as_str().unwrap())
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    ctx.server
        .post("/auth/login")
        .json(&json!({
            "username_or_email": &email,
            "password": test_password()
        }))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}
