use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

use crate::AppState;
use super::controller;

pub fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(controller::register))
        .route("/login", post(controller::login))
        .route("/refresh", post(controller::refresh))
        .route("/logout", post(controller::logout))
        .route("/me", get(controller::me))
        .route("/verify-email", post(controller::verify_email))
        .route("/password/change", post(controller::change_password))
        .route("/password/forgot", post(controller::forgot_password))
        .route("/password/reset", post(controller::reset_password))
        .route("/mfa/setup", post(controller::mfa_setup))
        .route("/mfa/enable", post(controller::mfa_enable))
        .route("/mfa/disable", post(controller::mfa_disable))
        .route("/sessions", get(controller::list_sessions))
        .route("/sessions/revoke-all", post(controller::revoke_all_sessions))
        .route("/sessions/{id}/revoke", post(controller::revoke_session))
        .route("/admin/users/{id}/status", put(controller::admin_update_status))
        .route("/admin/users/{id}/role", put(controller::admin_update_role))
        .route("/admin/users/{id}/unlock", post(controller::admin_unlock))
        .route("/admin/users/{id}", delete(controller::admin_delete))
}
