/// Login Attempt Tracker
///
/// Per-email failure counter with a lockout window. State lives in the
/// credential store; a lock expires lazily by comparing `locked_until` with
/// the current time, there is no sweep.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::configuration::SecuritySettings;
use crate::error::AppError;
use crate::store::CredentialStore;

/// Outcome of a pre-login check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginCheck {
    pub allowed: bool,
    pub remaining_attempts: u32,
}

#[derive(Clone)]
pub struct LoginAttemptTracker {
    store: Arc<dyn CredentialStore>,
    max_attempts: u32,
    lockout: Duration,
}

impl LoginAttemptTracker {
    pub fn new(store: Arc<dyn CredentialStore>, max_attempts: u32, lockout: Duration) -> Self {
        Self {
            store,
            max_attempts,
            lockout,
        }
    }

    pub fn from_settings(store: Arc<dyn CredentialStore>, settings: &SecuritySettings) -> Self {
        Self::new(
            store,
            settings.max_login_attempts,
            Duration::seconds(settings.lockout_duration_secs),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn lockout(&self) -> Duration {
        self.lockout
    }

    pub async fn check(&self, email: &str) -> Result<LoginCheck, AppError> {
        self.check_at(email, Utc::now()).await
    }

    /// Denies only while a lock is active. Otherwise reports the budget left,
    /// floored at zero.
    pub async fn check_at(&self, email: &str, now: DateTime<Utc>) -> Result<LoginCheck, AppError> {
        let Some(record) = self.store.find_login_attempt(email).await? else {
            return Ok(LoginCheck {
                allowed: true,
                remaining_attempts: self.max_attempts,
            });
        };

        if record.locked_until.map_or(false, |until| until > now) {
            return Ok(LoginCheck {
                allowed: false,
                remaining_attempts: 0,
            });
        }

        let used = u32::try_from(record.attempts.max(0)).unwrap_or(u32::MAX);
        Ok(LoginCheck {
            allowed: true,
            remaining_attempts: self.max_attempts.saturating_sub(used),
        })
    }

    pub async fn record_failure(&self, email: &str) -> Result<(), AppError> {
        self.record_failure_at(email, Utc::now()).await
    }

    /// Count one failure; lock the email once the count reaches the threshold.
    pub async fn record_failure_at(&self, email: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        let record = self.store.increment_login_attempts(email, now).await?;

        if i64::from(record.attempts) >= i64::from(self.max_attempts) {
            let until = now + self.lockout;
            self.store.lock_login_attempts(email, until).await?;
            tracing::warn!(
                email = %record.email,
                attempts = record.attempts,
                locked_until = %until,
                "Account locked after repeated failed logins"
            );
        } else {
            tracing::info!(email = %record.email, attempts = record.attempts, "Failed login recorded");
        }
        Ok(())
    }

    /// Only call after the password has been verified.
    pub async fn clear(&self, email: &str) -> Result<(), AppError> {
        self.store.delete_login_attempts(email).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn tracker() -> LoginAttemptTracker {
        LoginAttemptTracker::new(Arc::new(MemoryStore::default()), 5, Duration::minutes(15))
    }

    #[test]
    fn from_settings_reads_threshold_and_window() {
        let settings = SecuritySettings {
            bcrypt_cost: 4,
            max_login_attempts: 3,
            lockout_duration_secs: 600,
        };
        let tracker = LoginAttemptTracker::from_settings(Arc::new(MemoryStore::default()), &settings);
        assert_eq!(tracker.max_attempts(), 3);
        assert_eq!(tracker.lockout(), Duration::minutes(10));
    }

    #[tokio::test]
    async fn unknown_email_has_full_budget() {
        let check = tracker().check("new@example.com").await.unwrap();
        assert_eq!(
            check,
            LoginCheck {
                allowed: true,
                remaining_attempts: 5
            }
        );
    }

    #[tokio::test]
    async fn failures_reduce_remaining() {
        let tracker = tracker();
        let now = Utc::now();

        tracker.record_failure_at("a@b.co", now).await.unwrap();
        tracker.record_failure_at("a@b.co", now).await.unwrap();

        let check = tracker.check_at("a@b.co", now).await.unwrap();
        assert!(check.allowed);
        assert_eq!(check.remaining_attempts, 3);
    }

    #[tokio::test]
    async fn fifth_failure_locks_for_fifteen_minutes() {
        let tracker = tracker();
        let now = Utc::now();

        for _ in 0..4 {
            tracker.record_failure_at("a@b.co", now).await.unwrap();
        }
        assert!(tracker.check_at("a@b.co", now).await.unwrap().allowed);

        tracker.record_failure_at("a@b.co", now).await.unwrap();
        let locked = tracker.check_at("a@b.co", now).await.unwrap();
        assert!(!locked.allowed);
        assert_eq!(locked.remaining_attempts, 0);

        let almost = now + Duration::minutes(15) - Duration::seconds(1);
        assert!(!tracker.check_at("a@b.co", almost).await.unwrap().allowed);

        let after = now + Duration::minutes(15) + Duration::seconds(1);
        let check = tracker.check_at("a@b.co", after).await.unwrap();
        assert!(check.allowed);
        assert_eq!(check.remaining_attempts, 0);
    }

    #[tokio::test]
    async fn expired_lock_relocks_on_next_failure() {
        let tracker = tracker();
        let now = Utc::now();
        for _ in 0..5 {
            tracker.record_failure_at("a@b.co", now).await.unwrap();
        }

        let later = now + Duration::minutes(16);
        tracker.record_failure_at("a@b.co", later).await.unwrap();

        assert!(!tracker.check_at("a@b.co", later).await.unwrap().allowed);
        assert!(tracker
            .check_at("a@b.co", later + Duration::minutes(16))
            .await
            .unwrap()
            .allowed);
    }

    #[tokio::test]
    async fn clear_resets_the_record() {
        let tracker = tracker();
        for _ in 0..5 {
            tracker.record_failure("a@b.co").await.unwrap();
        }
        tracker.clear("a@b.co").await.unwrap();

        assert_eq!(tracker.check("a@b.co").await.unwrap().remaining_attempts, 5);
    }

    #[tokio::test]
    async fn counter_is_keyed_by_normalized_email() {
        let tracker = tracker();
        tracker.record_failure("User@Example.com ").await.unwrap();

        assert_eq!(tracker.check("user@example.com").await.unwrap().remaining_attempts, 4);
    }
}
