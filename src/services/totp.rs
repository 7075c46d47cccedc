use totp_rs::{Algorithm, Secret, TOTP};

use crate::modules::auth::interface::AuthError;

// Google Authenticator compatible settings
const TOTP_DIGITS: usize = 6;
const TOTP_STEP: u64 = 30;
const TOTP_SKEW: u8 = 1;

/// Time-based one-time-code service for the MFA step-up.
#[derive(Clone)]
pub struct TotpService {
    issuer: String,
}

impl TotpService {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    /// Generate a fresh base32-encoded secret for enrollment.
    pub fn generate_secret(&self) -> String {
        Secret::generate_secret().to_encoded().to_string()
    }

    fn build(&self, secret_base32: &str, account_name: &str) -> Result<TOTP, AuthError> {
        let bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| AuthError::Internal(format!("Invalid TOTP secret: {:?}", e)))?;

        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP,
            bytes,
            Some(self.issuer.clone()),
            account_name.to_string(),
        )
        .map_err(|e| AuthError::Internal(format!("Failed to build TOTP: {}", e)))
    }

    /// Check a submitted code against the stored secret, allowing one time
    /// step of clock skew in either direction.
    pub fn verify(
        &self,
        secret_base32: &str,
        account_name: &str,
        code: &str,
    ) -> Result<bool, AuthError> {
        let totp = self.build(secret_base32, account_name)?;
        Ok(totp.check_current(code).unwrap_or(false))
    }

    /// otpauth:// provisioning URL for authenticator apps.
    pub fn provisioning_url(
        &self,
        secret_base32: &str,
        account_name: &str,
    ) -> Result<String, AuthError> {
        let totp = self.build(secret_base32, account_name)?;
        Ok(totp.get_url())
    }

    /// Current code for the secret. Used by tests and enrollment previews.
    pub fn current_code(&self, secret_base32: &str, account_name: &str) -> Result<String, AuthError> {
        let totp = self.build(secret_base32, account_name)?;
        totp.generate_current()
            .map_err(|e| AuthError::Internal(format!("Failed to generate TOTP: {}", e)))
    }
}
