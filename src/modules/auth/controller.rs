use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::AppState;
use crate::modules::auth::{
    interface::{AuthError, ClientInfo, LoginOutcome},
    model::User,
    schema::{
        ChangePasswordRequest, DisableMfaRequest, EnableMfaRequest, ErrorResponse,
        ForgotPasswordRequest, ForgotPasswordResponse, LoginRequest, LoginResponse,
        MessageResponse, MfaSetupResponse, RefreshTokenRequest, RefreshTokenResponse,
        RegisterRequest, RegisterResponse, ResetPasswordRequest, SessionListResponse,
        SessionResponse, UpdateRoleRequest, UpdateStatusRequest, UserResponse,
        VerifyEmailRequest,
    },
};

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<(StatusCode, Json<T>), ApiError>;

fn reject(e: AuthError) -> ApiError {
    (e.status_code(), Json(ErrorResponse::new(e.to_string())))
}

fn bad_request(msg: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(msg)))
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Missing bearer token")),
        ))
}

fn client_info(headers: &HeaderMap) -> ClientInfo {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    ClientInfo {
        ip_address: header_str("x-forwarded-for"),
        user_agent: header_str("user-agent"),
    }
}

/// Resolve the calling account from the bearer token. Token failures on
/// authenticated routes always surface as 401, never the codec's own codes.
async fn current_user(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = bearer_token(headers)?;
    state.engine.authenticate(token).await.map_err(|e| match e {
        AuthError::InvalidToken | AuthError::TokenExpired | AuthError::SessionExpired => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Invalid or expired token")),
        ),
        other => reject(other),
    })
}

fn require_admin(user: &User) -> Result<(), ApiError> {
    if user.role.is_admin() {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            Json(ErrorResponse::new("Administrator role required")),
        ))
    }
}

// =============================================================================
// REGISTRATION & LOGIN
// =============================================================================

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<RegisterResponse> {
    if let Err(e) = req.validate() {
        return Err(bad_request(e.to_string()));
    }

    let user = state
        .engine
        .register(
            &req.username,
            &req.email,
            &req.password,
            &req.confirm_password,
            crate::modules::auth::engine::Profile {
                first_name: req.first_name,
                last_name: req.last_name,
                phone_number: req.phone_number,
            },
        )
        .await
        .map_err(reject)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: UserResponse::from(&user),
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let outcome = state
        .engine
        .login(
            &req.username_or_email,
            &req.password,
            req.mfa_code.as_deref(),
            client_info(&headers),
        )
        .await
        .map_err(reject)?;

    let response = match outcome {
        LoginOutcome::LoggedIn { tokens, user } => LoginResponse {
            access_token: Some(tokens.access_token),
            refresh_token: Some(tokens.refresh_token),
            token_type: "Bearer",
            expires_in: Some(tokens.expires_in),
            mfa_required: false,
            user: UserResponse::from(&user),
        },
        LoginOutcome::MfaRequired { user } => LoginResponse {
            access_token: None,
            refresh_token: None,
            token_type: "Bearer",
            expires_in: None,
            mfa_required: true,
            user: UserResponse::from(&user),
        },
    };

    Ok((StatusCode::OK, Json(response)))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshTokenRequest>,
) -> ApiResult<RefreshTokenResponse> {
    let tokens = state
        .engine
        .refresh(&req.refresh_token)
        .await
        .map_err(reject)?;

    Ok((
        StatusCode::OK,
        Json(RefreshTokenResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: "Bearer",
            expires_in: tokens.expires_in,
        }),
    ))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<MessageResponse> {
    let token = bearer_token(&headers)?;
    state.engine.logout(token).await.map_err(reject)?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Logged out",
        }),
    ))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<UserResponse> {
    let user = current_user(&state, &headers).await?;
    Ok((StatusCode::OK, Json(UserResponse::from(&user))))
}

// =============================================================================
// PASSWORDS
// =============================================================================

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<MessageResponse> {
    if let Err(e) = req.validate() {
        return Err(bad_request(e.to_string()));
    }

    let user = current_user(&state, &headers).await?;
    state
        .engine
        .change_password(
            &user.id,
            &req.current_password,
            &req.new_password,
            &req.confirm_new_password,
        )
        .await
        .map_err(reject)?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Password changed",
        }),
    ))
}

pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<ForgotPasswordResponse> {
    if let Err(e) = req.validate() {
        return Err(bad_request(e.to_string()));
    }

    let reset_token = state
        .engine
        .request_password_reset(&req.email)
        .await
        .map_err(reject)?;

    Ok((
        StatusCode::OK,
        Json(ForgotPasswordResponse {
            message: "Password reset requested",
            reset_token,
        }),
    ))
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<MessageResponse> {
    if let Err(e) = req.validate() {
        return Err(bad_request(e.to_string()));
    }

    state
        .engine
        .reset_password(&req.token, &req.new_password)
        .await
        .map_err(reject)?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Password reset",
        }),
    ))
}

// =============================================================================
// EMAIL VERIFICATION
// =============================================================================

pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyEmailRequest>,
) -> ApiResult<MessageResponse> {
    state.engine.verify_email(&req.token).await.map_err(reject)?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Email verified",
        }),
    ))
}

// =============================================================================
// MFA
// =============================================================================

pub async fn mfa_setup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<MfaSetupResponse> {
    let user = current_user(&state, &headers).await?;
    let (secret, otpauth_url) = state
        .engine
        .generate_mfa_secret(&user.id)
        .await
        .map_err(reject)?;

    Ok((StatusCode::OK, Json(MfaSetupResponse { secret, otpauth_url })))
}

pub async fn mfa_enable(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<EnableMfaRequest>,
) -> ApiResult<MessageResponse> {
    let user = current_user(&state, &headers).await?;
    state
        .engine
        .enable_mfa(&user.id, &req.code)
        .await
        .map_err(reject)?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "MFA enabled",
        }),
    ))
}

pub async fn mfa_disable(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<DisableMfaRequest>,
) -> ApiResult<MessageResponse> {
    let user = current_user(&state, &headers).await?;
    state
        .engine
        .disable_mfa(&user.id, &req.password)
        .await
        .map_err(reject)?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "MFA disabled",
        }),
    ))
}

// =============================================================================
// SESSIONS
// =============================================================================

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<SessionListResponse> {
    let user = current_user(&state, &headers).await?;
    let sessions = state
        .engine
        .list_active_sessions(&user.id)
        .await
        .map_err(reject)?;

    Ok((
        StatusCode::OK,
        Json(SessionListResponse {
            sessions: sessions.iter().map(SessionResponse::from).collect(),
        }),
    ))
}

pub async fn revoke_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> ApiResult<MessageResponse> {
    let user = current_user(&state, &headers).await?;
    state
        .engine
        .revoke_session(&user.id, &session_id)
        .await
        .map_err(reject)?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Session revoked",
        }),
    ))
}

pub async fn revoke_all_sessions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<MessageResponse> {
    let user = current_user(&state, &headers).await?;
    state
        .engine
        .revoke_all_sessions(&user.id)
        .await
        .map_err(reject)?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "All sessions revoked",
        }),
    ))
}

// =============================================================================
// ADMINISTRATION
// =============================================================================

pub async fn admin_update_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<UserResponse> {
    let caller = current_user(&state, &headers).await?;
    require_admin(&caller)?;

    let user = state
        .engine
        .update_status(&user_id, req.status)
        .await
        .map_err(reject)?;

    Ok((StatusCode::OK, Json(UserResponse::from(&user))))
}

pub async fn admin_update_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(req): Json<UpdateRoleRequest>,
) -> ApiResult<UserResponse> {
    let caller = current_user(&state, &headers).await?;
    require_admin(&caller)?;

    let user = state
        .engine
        .update_role(&user_id, req.role)
        .await
        .map_err(reject)?;

    Ok((StatusCode::OK, Json(UserResponse::from(&user))))
}

pub async fn admin_unlock(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> ApiResult<MessageResponse> {
    let caller = current_user(&state, &headers).await?;
    require_admin(&caller)?;

    state.engine.unlock_account(&user_id).await.map_err(reject)?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Account unlocked",
        }),
    ))
}

pub async fn admin_delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> ApiResult<MessageResponse> {
    let caller = current_user(&state, &headers).await?;
    require_admin(&caller)?;

    state.engine.delete_account(&user_id).await.map_err(reject)?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Account deleted",
        }),
    ))
}
