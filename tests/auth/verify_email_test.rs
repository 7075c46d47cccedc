use axum::http::StatusCode;
use serde_json::json;

use outlet_auth::modules::auth::model::UserStatus;

use crate::common::{register_user, TestContext};

// =============================================================================
// INTEGRATION TESTS - EMAIL VERIFICATION
// =============================================================================

#[tokio::test]
async fn test_verify_email_activates_account() {
    let ctx = TestContext::new().await;
    let (_username, email) = register_user(&ctx).await;

    let token = ctx
        .users
        .get_by_email(&email)
        .unwrap()
        .email_verification_token
        .unwrap();

    let response = ctx
        .server
        .post("/auth/verify-email")
        .json(&json!({ "token": token }))
        .await;
    response.assert_status_ok();

    let stored = ctx.users.get_by_email(&email).unwrap();
    assert!(stored.email_verified);
    assert_eq!(stored.status, UserStatus::Active);
    assert!(stored.email_verification_token.is_none());
}

#[tokio::test]
async fn test_verify_email_rejects_unknown_token() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/auth/verify-email")
        .json(&json!({ "token": "bogus-token" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_verification_token_is_single_use() {
    let ctx = TestContext::new().await;
    let (_username, email) = register_user(&ctx).await;

    let token = ctx
        .users
        .get_by_email(&email)
        .unwrap()
        .email_verification_token
        .unwrap();

    ctx.server
        .post("/auth/verify-email")
        .json(&json!({ "token": &token }))
        .await
        .assert_status_ok();

    ctx.server
        .post("/auth/verify-email")
        .json(&json!({ "token": &token }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_verification_does_not_reactivate_suspended_account() {
    let ctx = TestContext::new().await;
    let (_username, email) = register_user(&ctx).await;

    ctx.users.mutate(&email, |u| u.status = UserStatus::Suspended);

    let token = ctx
        .users
        .get_by_email(&email)
        .unwrap()
        .email_verification_token
        .unwrap();

    ctx.server
        .post("/auth/verify-email")
        .json(&json!({ "token": token }))
        .await
        .assert_status_ok();

    let stored = ctx.users.get_by_email(&email).unwrap();
    assert!(stored.email_verified);
    assert_eq!(stored.status, UserStatus::Suspended);
}
