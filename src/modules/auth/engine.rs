use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::services::hashing;
use crate::services::jwt::{JwtService, TokenKind};
use crate::services::totp::TotpService;

use super::interface::{
    AuditSink, AuthError, ClientInfo, LoginOutcome, Result, SessionRepository, TokenPair,
    UserRepository,
};
use super::lockout::LockoutPolicy;
use super::model::{
    AuditAction, AuditLog, SessionStatus, User, UserRole, UserSession, UserStatus,
};

/// Bounded retry for optimistic-update conflicts. Invisible to the caller on
/// success; the operation's normal typed error surfaces on exhaustion.
const MAX_UPDATE_RETRIES: usize = 3;

/// Single-use password reset tokens stay valid for one hour.
fn reset_token_ttl() -> Duration {
    Duration::hours(1)
}

/// Profile fields captured at registration, opaque to the engine.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
}

/// Orchestrates credential verification, lockout, MFA step-up, token
/// issuance, refresh rotation, and session revocation over the abstract
/// stores. Holds no locks across store calls; per-row linearization is the
/// stores' compare-and-swap plus the bounded retry here.
#[derive(Clone)]
pub struct AuthEngine {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    audit: Arc<dyn AuditSink>,
    jwt: JwtService,
    totp: TotpService,
    lockout: LockoutPolicy,
}

impl AuthEngine {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        audit: Arc<dyn AuditSink>,
        jwt: JwtService,
        totp: TotpService,
        lockout: LockoutPolicy,
    ) -> Self {
        Self {
            users,
            sessions,
            audit,
            jwt,
            totp,
            lockout,
        }
    }

    // =========================================================================
    // REGISTRATION & ACCOUNT LOOKUP
    // =========================================================================

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        confirm_password: &str,
        profile: Profile,
    ) -> Result<User> {
        if password != confirm_password {
            return Err(AuthError::PasswordMismatch);
        }

        if self.users.exists_by_username(username).await? {
            return Err(AuthError::DuplicateUser("Username".to_string()));
        }
        if self.users.exists_by_email(email).await? {
            return Err(AuthError::DuplicateUser("Email".to_string()));
        }

        let password_hash = hashing::hash_password(password)
            .map_err(|e| AuthError::Internal(format!("Password hashing error: {}", e)))?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            first_name: profile.first_name,
            last_name: profile.last_name,
            phone_number: profile.phone_number,
            role: UserRole::Customer,
            status: UserStatus::PendingVerification,
            email_verified: false,
            mfa_enabled: false,
            mfa_secret: None,
            failed_login_attempts: 0,
            locked_until: None,
            last_login: None,
            password_reset_token: None,
            password_reset_expires: None,
            email_verification_token: Some(Uuid::new_v4().to_string()),
            created_at: now,
            updated_at: now,
            version: 0,
        };

        self.users.create(&user).await?;

        tracing::info!(user_id = %user.id, "User registered");
        self.audit(AuditLog::new(Some(&user.id), AuditAction::Create, "User registered"))
            .await;

        Ok(user)
    }

    pub async fn get_account(&self, user_id: &str) -> Result<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    // =========================================================================
    // LOGIN
    // =========================================================================

    pub async fn login(
        &self,
        username_or_email: &str,
        password: &str,
        mfa_code: Option<&str>,
        client: ClientInfo,
    ) -> Result<LoginOutcome> {
        let now = Utc::now();

        let user = match self.users.find_by_username_or_email(username_or_email).await? {
            Some(user) => user,
            None => {
                self.audit(AuditLog::failure(
                    None,
                    AuditAction::FailedLogin,
                    "Login attempt for unknown account",
                ))
                .await;
                return Err(AuthError::UserNotFound);
            }
        };

        if self.lockout.is_locked(&user, now) {
            self.audit(AuditLog::failure(
                Some(&user.id),
                AuditAction::FailedLogin,
                "Login attempt on locked account",
            ))
            .await;
            return Err(AuthError::AccountLocked);
        }

        if !user.status.can_login() {
            self.audit(AuditLog::failure(
                Some(&user.id),
                AuditAction::FailedLogin,
                "Login attempt on inactive account",
            ))
            .await;
            return Err(AuthError::AccountInactive);
        }

        let password_ok = hashing::verify_password(password, &user.password_hash)
            .map_err(|e| AuthError::Internal(format!("Hash verification error: {}", e)))?;

        if !password_ok {
            let user = self
                .update_user_with_retry(user, |u| self.lockout.record_failure(u, now))
                .await?;
            self.audit(AuditLog::failure(
                Some(&user.id),
                AuditAction::FailedLogin,
                "Invalid password",
            ))
            .await;
            return Err(AuthError::InvalidCredentials);
        }

        if user.mfa_enabled {
            match mfa_code {
                None => {
                    self.audit(AuditLog::new(Some(&user.id), AuditAction::Login, "MFA required"))
                        .await;
                    return Ok(LoginOutcome::MfaRequired { user });
                }
                Some(code) => {
                    if !self.verify_mfa_code(&user, code)? {
                        self.audit(AuditLog::failure(
                            Some(&user.id),
                            AuditAction::FailedLogin,
                            "Invalid MFA code",
                        ))
                        .await;
                        return Err(AuthError::InvalidMfaCode);
                    }
                }
            }
        }

        let user = self
            .update_user_with_retry(user, |u| {
                self.lockout.record_success(u);
                u.last_login = Some(now);
            })
            .await?;

        let tokens = self.open_session(&user, client).await?;

        tracing::info!(user_id = %user.id, "User logged in");
        self.audit(AuditLog::new(Some(&user.id), AuditAction::Login, "Successful login"))
            .await;

        Ok(LoginOutcome::LoggedIn { tokens, user })
    }

    async fn open_session(&self, user: &User, client: ClientInfo) -> Result<TokenPair> {
        let now = Utc::now();
        let access_token = self.jwt.issue(user, TokenKind::Access)?;
        let refresh_token = self.jwt.issue(user, TokenKind::Refresh)?;

        let session = UserSession {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            access_token: access_token.clone(),
            refresh_token: refresh_token.clone(),
            expires_at: now + Duration::seconds(self.jwt.access_token_duration_secs()),
            refresh_expires_at: now + Duration::seconds(self.jwt.refresh_token_duration_secs()),
            status: SessionStatus::Active,
            ip_address: client.ip_address,
            user_agent: client.user_agent,
            created_at: now,
            last_accessed_at: None,
            version: 0,
        };

        self.sessions.create(&session).await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.jwt.access_token_duration_secs(),
        })
    }

    // =========================================================================
    // TOKEN LIFECYCLE
    // =========================================================================

    /// Rotate the token pair in place on the session row. Exactly one winner
    /// under concurrent refreshes of the same token: the loser's compare-and-
    /// swap misses and it observes the same failure as a stale token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let now = Utc::now();

        let mut session = self
            .sessions
            .find_by_refresh_token(refresh_token)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        if session.status != SessionStatus::Active || session.is_refresh_expired(now) {
            return Err(AuthError::SessionExpired);
        }

        let user = self
            .users
            .find_by_id(&session.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let access_token = self.jwt.issue(&user, TokenKind::Access)?;
        let new_refresh_token = self.jwt.issue(&user, TokenKind::Refresh)?;

        session.access_token = access_token.clone();
        session.refresh_token = new_refresh_token.clone();
        session.expires_at = now + Duration::seconds(self.jwt.access_token_duration_secs());
        session.refresh_expires_at = now + Duration::seconds(self.jwt.refresh_token_duration_secs());
        session.last_accessed_at = Some(now);

        match self.sessions.update(&mut session).await {
            Ok(()) => {}
            // A concurrent refresh won the rotation; this token no longer
            // matches anything.
            Err(AuthError::Conflict) => return Err(AuthError::SessionNotFound),
            Err(e) => return Err(e),
        }

        tracing::info!(user_id = %user.id, "Token refreshed");

        Ok(TokenPair {
            access_token,
            refresh_token: new_refresh_token,
            expires_in: self.jwt.access_token_duration_secs(),
        })
    }

    pub async fn logout(&self, access_token: &str) -> Result<()> {
        let session = self
            .sessions
            .find_by_access_token(access_token)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        let user_id = session.user_id.clone();
        self.update_session_with_retry(session, |s| s.status = SessionStatus::Revoked)
            .await?;

        tracing::info!(user_id = %user_id, "User logged out");
        self.audit(AuditLog::new(Some(&user_id), AuditAction::Logout, "User logged out"))
            .await;

        Ok(())
    }

    /// Resolve the account behind a bearer token. The signature check alone
    /// is not authorization: a revoked or rotated-away session must fail even
    /// though the token still verifies.
    pub async fn authenticate(&self, access_token: &str) -> Result<User> {
        let now = Utc::now();
        let claims = self.jwt.validate(access_token, TokenKind::Access)?;

        let session = self
            .sessions
            .find_by_access_token(access_token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if !session.is_usable(now) {
            return Err(AuthError::InvalidToken);
        }

        let user = self
            .users
            .find_by_id(&claims.sub)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if !user.status.can_login() {
            return Err(AuthError::AccountInactive);
        }

        // Best effort; losing a last-accessed bump to a concurrent writer is
        // acceptable.
        let mut touched = session;
        touched.last_accessed_at = Some(now);
        let _ = self.sessions.update(&mut touched).await;

        Ok(user)
    }

    // =========================================================================
    // SESSION REVOCATION
    // =========================================================================

    pub async fn revoke_session(&self, user_id: &str, session_id: &str) -> Result<()> {
        let session = self
            .sessions
            .find_by_id(session_id)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        if session.user_id != user_id {
            return Err(AuthError::Unauthorized);
        }

        self.update_session_with_retry(session, |s| s.status = SessionStatus::Revoked)
            .await?;

        self.audit(AuditLog::new(Some(user_id), AuditAction::SessionRevoke, "Session revoked"))
            .await;

        Ok(())
    }

    /// Revoke every session the account owns. Idempotent; audited once per
    /// call, not once per session.
    pub async fn revoke_all_sessions(&self, user_id: &str) -> Result<u64> {
        let revoked = self.sessions.revoke_all_for_user(user_id).await?;

        tracing::info!(user_id = %user_id, revoked, "All sessions revoked");
        self.audit(AuditLog::new(
            Some(user_id),
            AuditAction::SessionRevoke,
            "All sessions revoked",
        ))
        .await;

        Ok(revoked)
    }

    pub async fn list_active_sessions(&self, user_id: &str) -> Result<Vec<UserSession>> {
        self.sessions.list_active_for_user(user_id, Utc::now()).await
    }

    /// Garbage-collect sessions whose refresh expiry is older than the
    /// retention period.
    pub async fn purge_expired_sessions(&self, retention: Duration) -> Result<u64> {
        self.sessions.delete_expired(Utc::now() - retention).await
    }

    // =========================================================================
    // PASSWORD MANAGEMENT
    // =========================================================================

    pub async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
        confirm_new_password: &str,
    ) -> Result<()> {
        let user = self.get_account(user_id).await?;

        let current_ok = hashing::verify_password(current_password, &user.password_hash)
            .map_err(|e| AuthError::Internal(format!("Hash verification error: {}", e)))?;
        if !current_ok {
            return Err(AuthError::InvalidCredentials);
        }

        if new_password != confirm_new_password {
            return Err(AuthError::PasswordMismatch);
        }

        let password_hash = hashing::hash_password(new_password)
            .map_err(|e| AuthError::Internal(format!("Password hashing error: {}", e)))?;

        self.update_user_with_retry(user, |u| u.password_hash = password_hash.clone())
            .await?;

        self.revoke_all_sessions(user_id).await?;

        tracing::info!(user_id = %user_id, "Password changed");
        self.audit(AuditLog::new(Some(user_id), AuditAction::PasswordChange, "Password changed"))
            .await;

        Ok(())
    }

    /// Issue a single-use reset token, replacing any prior one. The token is
    /// returned to the service layer; delivery is out of scope here.
    pub async fn request_password_reset(&self, email: &str) -> Result<String> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let token = Uuid::new_v4().to_string();
        let expires = Utc::now() + reset_token_ttl();

        let user = self
            .update_user_with_retry(user, |u| {
                u.password_reset_token = Some(token.clone());
                u.password_reset_expires = Some(expires);
            })
            .await?;

        tracing::info!(user_id = %user.id, "Password reset requested");
        self.audit(AuditLog::new(
            Some(&user.id),
            AuditAction::PasswordResetRequest,
            "Password reset requested",
        ))
        .await;

        Ok(token)
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        let user = self
            .users
            .find_by_reset_token(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        match user.password_reset_expires {
            Some(expires) if expires > Utc::now() => {}
            _ => return Err(AuthError::TokenExpired),
        }

        let password_hash = hashing::hash_password(new_password)
            .map_err(|e| AuthError::Internal(format!("Password hashing error: {}", e)))?;

        let user = self
            .update_user_with_retry(user, |u| {
                u.password_hash = password_hash.clone();
                u.password_reset_token = None;
                u.password_reset_expires = None;
            })
            .await?;

        self.revoke_all_sessions(&user.id).await?;

        tracing::info!(user_id = %user.id, "Password reset completed");
        self.audit(AuditLog::new(
            Some(&user.id),
            AuditAction::PasswordResetComplete,
            "Password reset completed",
        ))
        .await;

        Ok(())
    }

    // =========================================================================
    // EMAIL VERIFICATION
    // =========================================================================

    pub async fn verify_email(&self, token: &str) -> Result<()> {
        let user = self
            .users
            .find_by_verification_token(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let user = self
            .update_user_with_retry(user, |u| {
                u.email_verified = true;
                u.email_verification_token = None;
                if u.status == UserStatus::PendingVerification {
                    u.status = UserStatus::Active;
                }
            })
            .await?;

        tracing::info!(user_id = %user.id, "Email verified");
        self.audit(AuditLog::new(Some(&user.id), AuditAction::EmailVerification, "Email verified"))
            .await;

        Ok(())
    }

    // =========================================================================
    // MFA
    // =========================================================================

    /// Stage a new secret on the account; MFA stays off until a valid code
    /// proves the authenticator was enrolled.
    pub async fn generate_mfa_secret(&self, user_id: &str) -> Result<(String, String)> {
        let user = self.get_account(user_id).await?;

        let secret = self.totp.generate_secret();
        let url = self.totp.provisioning_url(&secret, &user.username)?;

        self.update_user_with_retry(user, |u| u.mfa_secret = Some(secret.clone()))
            .await?;

        self.audit(AuditLog::new(Some(user_id), AuditAction::MfaEnable, "MFA secret generated"))
            .await;

        Ok((secret, url))
    }

    pub async fn enable_mfa(&self, user_id: &str, code: &str) -> Result<()> {
        let user = self.get_account(user_id).await?;

        if !self.verify_mfa_code(&user, code)? {
            return Err(AuthError::InvalidMfaCode);
        }

        self.update_user_with_retry(user, |u| u.mfa_enabled = true)
            .await?;

        tracing::info!(user_id = %user_id, "MFA enabled");
        self.audit(AuditLog::new(Some(user_id), AuditAction::MfaEnable, "MFA enabled"))
            .await;

        Ok(())
    }

    /// Disabling requires the current password, not a code.
    pub async fn disable_mfa(&self, user_id: &str, password: &str) -> Result<()> {
        let user = self.get_account(user_id).await?;

        let password_ok = hashing::verify_password(password, &user.password_hash)
            .map_err(|e| AuthError::Internal(format!("Hash verification error: {}", e)))?;
        if !password_ok {
            return Err(AuthError::InvalidCredentials);
        }

        self.update_user_with_retry(user, |u| {
            u.mfa_enabled = false;
            u.mfa_secret = None;
        })
        .await?;

        tracing::info!(user_id = %user_id, "MFA disabled");
        self.audit(AuditLog::new(Some(user_id), AuditAction::MfaDisable, "MFA disabled"))
            .await;

        Ok(())
    }

    fn verify_mfa_code(&self, user: &User, code: &str) -> Result<bool> {
        match &user.mfa_secret {
            Some(secret) => self.totp.verify(secret, &user.username, code),
            None => Ok(false),
        }
    }

    // =========================================================================
    // ADMINISTRATION
    // =========================================================================

    pub async fn update_status(&self, user_id: &str, status: UserStatus) -> Result<User> {
        let user = self.get_account(user_id).await?;
        let old_status = user.status;

        let user = self
            .update_user_with_retry(user, |u| u.status = status)
            .await?;

        self.audit(
            AuditLog::new(Some(user_id), AuditAction::StatusChange, "User status changed")
                .with_values(
                    Some(old_status.as_str().to_string()),
                    Some(status.as_str().to_string()),
                ),
        )
        .await;

        Ok(user)
    }

    pub async fn update_role(&self, user_id: &str, role: UserRole) -> Result<User> {
        let user = self.get_account(user_id).await?;
        let old_role = user.role;

        let user = self.update_user_with_retry(user, |u| u.role = role).await?;

        self.audit(
            AuditLog::new(Some(user_id), AuditAction::RoleChange, "User role changed")
                .with_values(
                    Some(old_role.as_str().to_string()),
                    Some(role.as_str().to_string()),
                ),
        )
        .await;

        Ok(user)
    }

    /// Operator unlock: clears the failure counter and the lock timestamp.
    pub async fn unlock_account(&self, user_id: &str) -> Result<()> {
        let user = self.get_account(user_id).await?;

        self.update_user_with_retry(user, |u| self.lockout.record_success(u))
            .await?;

        tracing::info!(user_id = %user_id, "Account unlocked");
        self.audit(AuditLog::new(Some(user_id), AuditAction::AccountUnlock, "Account unlocked"))
            .await;

        Ok(())
    }

    /// Accounts are never physically removed; deletion is a status
    /// transition plus a full session sweep.
    pub async fn delete_account(&self, user_id: &str) -> Result<()> {
        let user = self.get_account(user_id).await?;

        self.update_user_with_retry(user, |u| u.status = UserStatus::Deleted)
            .await?;

        self.revoke_all_sessions(user_id).await?;

        tracing::info!(user_id = %user_id, "Account deleted");
        self.audit(AuditLog::new(Some(user_id), AuditAction::Delete, "User deleted"))
            .await;

        Ok(())
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    async fn update_user_with_retry<F>(&self, mut user: User, mutate: F) -> Result<User>
    where
        F: Fn(&mut User),
    {
        let mut attempts = 0;
        loop {
            mutate(&mut user);
            match self.users.update(&mut user).await {
                Ok(()) => return Ok(user),
                Err(AuthError::Conflict) if attempts < MAX_UPDATE_RETRIES => {
                    attempts += 1;
                    user = self
                        .users
                        .find_by_id(&user.id)
                        .await?
                        .ok_or(AuthError::UserNotFound)?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn update_session_with_retry<F>(
        &self,
        mut session: UserSession,
        mutate: F,
    ) -> Result<UserSession>
    where
        F: Fn(&mut UserSession),
    {
        let mut attempts = 0;
        loop {
            mutate(&mut session);
            match self.sessions.update(&mut session).await {
                Ok(()) => return Ok(session),
                Err(AuthError::Conflict) if attempts < MAX_UPDATE_RETRIES => {
                    attempts += 1;
                    session = self
                        .sessions
                        .find_by_id(&session.id)
                        .await?
                        .ok_or(AuthError::SessionNotFound)?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Audit writes never roll back the primary action; a failed append is
    /// logged and the operation proceeds.
    async fn audit(&self, entry: AuditLog) {
        if let Err(e) = self.audit.append(entry).await {
            tracing::warn!(error = %e, "Failed to append audit entry");
        }
    }
}
