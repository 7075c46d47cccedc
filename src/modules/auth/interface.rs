use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::model::{AuditLog, User, UserSession};

// =============================================================================
// REPOSITORY TRAITS
// =============================================================================

pub type Result<T> = std::result::Result<T, AuthError>;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;
    async fn find_by_username_or_email(&self, identifier: &str) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_by_reset_token(&self, token: &str) -> Result<Option<User>>;
    async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>>;
    async fn exists_by_username(&self, username: &str) -> Result<bool>;
    async fn exists_by_email(&self, email: &str) -> Result<bool>;
    /// Compare-and-swap on the loaded `version`; bumps it on success and
    /// returns `AuthError::Conflict` when another writer got there first.
    async fn update(&self, user: &mut User) -> Result<()>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &UserSession) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<UserSession>>;
    async fn find_by_access_token(&self, token: &str) -> Result<Option<UserSession>>;
    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<UserSession>>;
    /// Same compare-and-swap discipline as `UserRepository::update`.
    async fn update(&self, session: &mut UserSession) -> Result<()>;
    async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64>;
    async fn list_active_for_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserSession>>;
    /// Garbage collection: remove sessions whose refresh expiry predates
    /// the retention cutoff.
    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Append-only record of security events. Per-user ordering is preserved by
/// appending before the engine returns to the caller.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: AuditLog) -> Result<()>;
}

// =============================================================================
// ERROR TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("User not found")]
    UserNotFound,

    #[error("Session not found")]
    SessionNotFound,

    #[error("{0} already exists")]
    DuplicateUser(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is locked")]
    AccountLocked,

    #[error("Account is not active")]
    AccountInactive,

    #[error("Invalid MFA code")]
    InvalidMfaCode,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Session expired")]
    SessionExpired,

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Not authorized")]
    Unauthorized,

    #[error("Concurrent update conflict")]
    Conflict,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::SessionNotFound => StatusCode::NOT_FOUND,
            Self::DuplicateUser(_) => StatusCode::CONFLICT,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::AccountLocked => StatusCode::LOCKED,
            Self::AccountInactive => StatusCode::FORBIDDEN,
            Self::InvalidMfaCode => StatusCode::UNAUTHORIZED,
            Self::InvalidToken => StatusCode::BAD_REQUEST,
            Self::TokenExpired => StatusCode::BAD_REQUEST,
            Self::SessionExpired => StatusCode::UNAUTHORIZED,
            Self::PasswordMismatch => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::FORBIDDEN,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// =============================================================================
// ENGINE RESULT TYPES
// =============================================================================

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Terminal state of a login attempt that was not rejected.
#[derive(Debug)]
pub enum LoginOutcome {
    LoggedIn { tokens: TokenPair, user: User },
    /// Credentials checked out but the account requires an MFA code before
    /// any tokens are issued.
    MfaRequired { user: User },
}

#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}
