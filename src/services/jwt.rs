use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::modules::auth::interface::AuthError;
use crate::modules::auth::model::{User, UserRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,        // user id
    pub username: String,
    pub role: UserRole,
    pub kind: TokenKind,
    pub exp: i64,           // expiration time
    pub iat: i64,           // issued at
    pub jti: String,        // unique token id
}

#[derive(Clone)]
pub struct JwtService {
    secret: String,
    access_token_duration: Duration,
    refresh_token_duration: Duration,
}

impl JwtService {
    pub fn new(secret: String) -> Self {
        Self::with_durations(secret, Duration::minutes(15), Duration::days(7))
    }

    pub fn with_durations(secret: String, access: Duration, refresh: Duration) -> Self {
        Self {
            secret,
            access_token_duration: access,
            refresh_token_duration: refresh,
        }
    }

    /// Sign a token for the user. The jti is a fresh uuid on every issuance,
    /// so two tokens for the same user never collide on the session store's
    /// uniqueness constraints.
    pub fn issue(&self, user: &User, kind: TokenKind) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = match kind {
            TokenKind::Access => now + self.access_token_duration,
            TokenKind::Refresh => now + self.refresh_token_duration,
        };

        let claims = Claims {
            sub: user.id.clone(),
            username: user.username.clone(),
            role: user.role,
            kind,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AuthError::Internal(format!("Token signing error: {}", e)))
    }

    /// Verify signature, parse claims, and check expiry and kind. A token of
    /// the wrong kind is invalid, not expired.
    pub fn validate(&self, token: &str, kind: TokenKind) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?;

        if data.claims.kind != kind {
            return Err(AuthError::InvalidToken);
        }

        Ok(data.claims)
    }

    pub fn access_token_duration_secs(&self) -> i64 {
        self.access_token_duration.num_seconds()
    }

    pub fn refresh_token_duration_secs(&self) -> i64 {
        self.refresh_token_duration.num_seconds()
    }
}
