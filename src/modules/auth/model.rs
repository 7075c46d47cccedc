use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "snake_case")]
pub enum UserRole {
    Customer,
    Admin,
    Manager,
    OutletStaff,
    FactoryStaff,
    Owner,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Customer => "CUSTOMER",
            UserRole::Admin => "ADMIN",
            UserRole::Manager => "MANAGER",
            UserRole::OutletStaff => "OUTLET_STAFF",
            UserRole::FactoryStaff => "FACTORY_STAFF",
            UserRole::Owner => "OWNER",
        }
    }

    /// Roles allowed to perform administrative account operations.
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Owner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Inactive,
    Suspended,
    Deleted,
    PendingVerification,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "ACTIVE",
            UserStatus::Inactive => "INACTIVE",
            UserStatus::Suspended => "SUSPENDED",
            UserStatus::Deleted => "DELETED",
            UserStatus::PendingVerification => "PENDING_VERIFICATION",
        }
    }

    /// Statuses that may still log in. Pending accounts can authenticate so
    /// their owner can reach the email verification flow.
    pub fn can_login(&self) -> bool {
        matches!(self, UserStatus::Active | UserStatus::PendingVerification)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Expired,
    Revoked,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Login,
    FailedLogin,
    Logout,
    PasswordChange,
    PasswordResetRequest,
    PasswordResetComplete,
    EmailVerification,
    StatusChange,
    RoleChange,
    MfaEnable,
    MfaDisable,
    SessionRevoke,
    AccountUnlock,
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
    pub email_verified: bool,
    pub mfa_enabled: bool,
    pub mfa_secret: Option<String>,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<DateTime<Utc>>,
    pub email_verification_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped by every repository update.
    pub version: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct UserSession {
    pub id: String,
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl UserSession {
    pub fn is_refresh_expired(&self, now: DateTime<Utc>) -> bool {
        self.refresh_expires_at <= now
    }

    /// Active status alone is not enough: the access token must also be
    /// inside its validity window.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && self.expires_at > now
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AuditLog {
    pub id: String,
    pub user_id: Option<String>,
    pub action: AuditAction,
    pub description: String,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditLog {
    pub fn new(user_id: Option<&str>, action: AuditAction, description: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.map(str::to_string),
            action,
            description: description.to_string(),
            old_values: None,
            new_values: None,
            success: true,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(user_id: Option<&str>, action: AuditAction, description: &str) -> Self {
        Self {
            success: false,
            error_message: Some(description.to_string()),
            ..Self::new(user_id, action, description)
        }
    }

    pub fn with_values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_values = old;
        self.new_values = new;
        self
    }
}
