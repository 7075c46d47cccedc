use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, Pool};

use super::interface::{AuditSink, AuthError, Result, SessionRepository, UserRepository};
use super::model::{AuditLog, SessionStatus, User, UserSession};

fn map_insert_error(e: sqlx::Error) -> AuthError {
    // MySQL duplicate key (error 1062) on a unique column
    let msg = e.to_string();
    if msg.contains("Duplicate entry") || msg.contains("1062") {
        AuthError::DuplicateUser("User".to_string())
    } else {
        AuthError::Database(e)
    }
}

// =============================================================================
// USERS
// =============================================================================

pub struct MySqlUserRepository {
    pool: Pool<MySql>,
}

impl MySqlUserRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for MySqlUserRepository {
    async fn create(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, username, email, password_hash, first_name, last_name,
                phone_number, role, status, email_verified, mfa_enabled,
                mfa_secret, failed_login_attempts, locked_until, last_login,
                password_reset_token, password_reset_expires,
                email_verification_token, created_at, updated_at, version
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone_number)
        .bind(user.role)
        .bind(user.status)
        .bind(user.email_verified)
        .bind(user.mfa_enabled)
        .bind(&user.mfa_secret)
        .bind(user.failed_login_attempts)
        .bind(user.locked_until)
        .bind(user.last_login)
        .bind(&user.password_reset_token)
        .bind(user.password_reset_expires)
        .bind(&user.email_verification_token)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.version)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_username_or_email(&self, identifier: &str) -> Result<Option<User>> {
        let user =
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ? OR email = ?")
                .bind(identifier)
                .bind(identifier)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<User>> {
        let user =
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE password_reset_token = ?")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>> {
        let user =
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE email_verification_token = ?")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(result.0 > 0)
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(result.0 > 0)
    }

    async fn update(&self, user: &mut User) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE users SET
                username = ?, email = ?, password_hash = ?, first_name = ?,
                last_name = ?, phone_number = ?, role = ?, status = ?,
                email_verified = ?, mfa_enabled = ?, mfa_secret = ?,
                failed_login_attempts = ?, locked_until = ?, last_login = ?,
                password_reset_token = ?, password_reset_expires = ?,
                email_verification_token = ?, updated_at = ?,
                version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone_number)
        .bind(user.role)
        .bind(user.status)
        .bind(user.email_verified)
        .bind(user.mfa_enabled)
        .bind(&user.mfa_secret)
        .bind(user.failed_login_attempts)
        .bind(user.locked_until)
        .bind(user.last_login)
        .bind(&user.password_reset_token)
        .bind(user.password_reset_expires)
        .bind(&user.email_verification_token)
        .bind(now)
        .bind(&user.id)
        .bind(user.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::Conflict);
        }

        user.updated_at = now;
        user.version += 1;
        Ok(())
    }
}

// =============================================================================
// SESSIONS
// =============================================================================

pub struct MySqlSessionRepository {
    pool: Pool<MySql>,
}

impl MySqlSessionRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for MySqlSessionRepository {
    async fn create(&self, session: &UserSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_sessions (
                id, user_id, access_token, refresh_token, expires_at,
                refresh_expires_at, status, ip_address, user_agent,
                created_at, last_accessed_at, version
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.access_token)
        .bind(&session.refresh_token)
        .bind(session.expires_at)
        .bind(session.refresh_expires_at)
        .bind(session.status)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.created_at)
        .bind(session.last_accessed_at)
        .bind(session.version)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserSession>> {
        let session = sqlx::query_as::<_, UserSession>("SELECT * FROM user_sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    async fn find_by_access_token(&self, token: &str) -> Result<Option<UserSession>> {
        let session =
            sqlx::query_as::<_, UserSession>("SELECT * FROM user_sessions WHERE access_token = ?")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        Ok(session)
    }

    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<UserSession>> {
        let session =
            sqlx::query_as::<_, UserSession>("SELECT * FROM user_sessions WHERE refresh_token = ?")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        Ok(session)
    }

    async fn update(&self, session: &mut UserSession) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE user_sessions SET
                access_token = ?, refresh_token = ?, expires_at = ?,
                refresh_expires_at = ?, status = ?, last_accessed_at = ?,
                version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&session.access_token)
        .bind(&session.refresh_token)
        .bind(session.expires_at)
        .bind(session.refresh_expires_at)
        .bind(session.status)
        .bind(session.last_accessed_at)
        .bind(&session.id)
        .bind(session.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::Conflict);
        }

        session.version += 1;
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE user_sessions
            SET status = ?, version = version + 1
            WHERE user_id = ? AND status = ?
            "#,
        )
        .bind(SessionStatus::Revoked)
        .bind(user_id)
        .bind(SessionStatus::Active)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_active_for_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserSession>> {
        let sessions = sqlx::query_as::<_, UserSession>(
            r#"
            SELECT * FROM user_sessions
            WHERE user_id = ? AND status = ? AND refresh_expires_at > ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(SessionStatus::Active)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE refresh_expires_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// AUDIT
// =============================================================================

pub struct MySqlAuditSink {
    pool: Pool<MySql>,
}

impl MySqlAuditSink {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for MySqlAuditSink {
    async fn append(&self, entry: AuditLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, user_id, action, description, old_values, new_values,
                success, error_message, timestamp
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(entry.action)
        .bind(&entry.description)
        .bind(&entry.old_values)
        .bind(&entry.new_values)
        .bind(entry.success)
        .bind(&entry.error_message)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
