use std::env;

use chrono::Duration;

/// Environment configuration
/// Loads and validates environment variables
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub lockout_max_attempts: i32,
    pub lockout_window_minutes: i64,
    pub rate_limit_burst: u32,
    pub totp_issuer: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set".to_string())?;

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| "JWT_SECRET must be set".to_string())?;

        let access_token_minutes = parse_or("ACCESS_TOKEN_MINUTES", 15)?;
        let refresh_token_days = parse_or("REFRESH_TOKEN_DAYS", 7)?;
        let lockout_max_attempts = parse_or("LOCKOUT_MAX_ATTEMPTS", 5)?;
        let lockout_window_minutes = parse_or("LOCKOUT_WINDOW_MINUTES", 15)?;
        let rate_limit_burst = parse_or("RATE_LIMIT_BURST", 10)?;

        let totp_issuer =
            env::var("TOTP_ISSUER").unwrap_or_else(|_| "outlet-platform".to_string());

        Ok(Self {
            database_url,
            jwt_secret,
            access_token_minutes,
            refresh_token_days,
            lockout_max_attempts,
            lockout_window_minutes,
            rate_limit_burst,
            totp_issuer,
        })
    }

    pub fn access_token_duration(&self) -> Duration {
        Duration::minutes(self.access_token_minutes)
    }

    pub fn refresh_token_duration(&self) -> Duration {
        Duration::days(self.refresh_token_days)
    }

    pub fn lockout_window(&self) -> Duration {
        Duration::minutes(self.lockout_window_minutes)
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, String> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| format!("{} must be a number", name)),
        Err(_) => Ok(default),
    }
}
