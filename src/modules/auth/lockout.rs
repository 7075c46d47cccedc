use chrono::{DateTime, Duration, Utc};

use super::model::User;

/// Account lockout policy.
///
/// Failed attempts accrue on the account row; once the counter reaches
/// `max_attempts` the account is locked for `lockout_window`. The lock check
/// is lazy: a `locked_until` in the past counts as unlocked without a write.
/// The counter itself is never zeroed by time alone, only by a successful
/// login or an explicit operator unlock, so a single failure after a lapsed
/// window re-locks the account immediately.
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_attempts: i32,
    pub lockout_window: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_window: Duration::minutes(15),
        }
    }
}

impl LockoutPolicy {
    pub fn new(max_attempts: i32, lockout_window: Duration) -> Self {
        Self {
            max_attempts,
            lockout_window,
        }
    }

    pub fn is_locked(&self, user: &User, now: DateTime<Utc>) -> bool {
        matches!(user.locked_until, Some(until) if until > now)
    }

    pub fn record_failure(&self, user: &mut User, now: DateTime<Utc>) {
        user.failed_login_attempts += 1;
        if user.failed_login_attempts >= self.max_attempts {
            user.locked_until = Some(now + self.lockout_window);
        }
    }

    pub fn record_success(&self, user: &mut User) {
        user.failed_login_attempts = 0;
        user.locked_until = None;
    }
}
