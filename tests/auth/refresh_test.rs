use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use outlet_auth::modules::auth::interface::SessionRepository;

use crate::common::{login_user, register_user, TestContext};

// =============================================================================
// INTEGRATION TESTS - REFRESH ROTATION
// =============================================================================

#[tokio::test]
async fn test_refresh_rotates_pair_on_same_session() {
    let ctx = TestContext::new().await;
    let (_username, email) = register_user(&ctx).await;
    let login = login_user(&ctx, &email).await;
    let old_access = login["access_token"].as_str().unwrap();
    let old_refresh = login["refresh_token"].as_str().unwrap();

    let session_before = ctx
        .sessions
        .find_by_refresh_token(old_refresh)
        .await
        .unwrap()
        .unwrap();

    let response = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": old_refresh }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let new_access = body["access_token"].as_str().unwrap();
    let new_refresh = body["refresh_token"].as_str().unwrap();

    assert_ne!(new_access, old_access);
    assert_ne!(new_refresh, old_refresh);

    // Rotation replaces tokens in place rather than opening a second session.
    assert_eq!(ctx.sessions.count(), 1);
    let session_after = ctx
        .sessions
        .find_by_refresh_token(new_refresh)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session_after.id, session_before.id);

    // The rotated-away access token no longer authenticates.
    let me_old = ctx
        .server
        .get("/auth/me")
        .authorization_bearer(old_access)
        .await;
    me_old.assert_status(StatusCode::UNAUTHORIZED);

    let me_new = ctx
        .server
        .get("/auth/me")
        .authorization_bearer(new_access)
        .await;
    me_new.assert_status_ok();
}

#[tokio::test]
async fn test_refresh_token_is_single_use() {
    let ctx = TestContext::new().await;
    let (_username, email) = register_user(&ctx).await;
    let login = login_user(&ctx, &email).await;
    let old_refresh = login["refresh_token"].as_str().unwrap();

    let first = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": old_refresh }))
        .await;
    first.assert_status_ok();

    let second = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": old_refresh }))
        .await;
    second.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_expired_refresh_token_rejected() {
    let ctx = TestContext::new().await;
    let (_username, email) = register_user(&ctx).await;
    let login = login_user(&ctx, &email).await;
    let refresh_token = login["refresh_token"].as_str().unwrap();

    let user_id = ctx.users.get_by_email(&email).unwrap().id;
    ctx.sessions.mutate_all_for_user(&user_id, |s| {
        s.refresh_expires_at = Utc::now() - Duration::seconds(1);
    });

    let response = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": refresh_token }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_after_logout_rejected() {
    let ctx = TestContext::new().await;
    let (_username, email) = register_user(&ctx).await;
    let login = login_user(&ctx, &email).await;
    let access_token = login["access_token"].as_str().unwrap();
    let refresh_token = login["refresh_token"].as_str().unwrap();

    ctx.server
        .post("/auth/logout")
        .authorization_bearer(access_token)
        .await
        .assert_status_ok();

    let response = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": refresh_token }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_concurrent_refresh_has_single_winner() {
    let ctx = TestContext::new().await;
    let (_username, email) = register_user(&ctx).await;
    let login = login_user(&ctx, &email).await;
    let refresh_token = login["refresh_token"].as_str().unwrap();

    let (a, b) = tokio::join!(
        ctx.server
            .post("/auth/refresh")
            .json(&json!({ "refresh_token": refresh_token })),
        ctx.server
            .post("/auth/refresh")
            .json(&json!({ "refresh_token": refresh_token })),
    );

    let winners = [a.status_code(), b.status_code()]
        .iter()
        .filter(|s| **s == StatusCode::OK)
        .count();
    assert_eq!(winners, 1);
    assert_eq!(ctx.sessions.count(), 1);
}
