//! Per-user access keys for a provider, with usage quotas.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::provider::ProviderId;
use super::user::UserId;
use crate::error::DomainError;

entity_id!(
    /// Unique identifier for a ProviderKey.
    ProviderKeyId
);

text_enum!(
    Environment {
        Sandbox => "sandbox",
        Production => "production",
    }
);

/// Credential pair granting one user access to one provider in one environment.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ProviderKey {
    pub id: ProviderKeyId,
    pub provider_id: ProviderId,
    pub user_id: UserId,
    pub environment: Environment,
    /// Public half of the pair (`pk_...`).
    pub public_key: String,
    #[serde(skip)]
    pub secret_hash: String,
    pub is_active: bool,
    pub daily_limit: i64,
    pub monthly_limit: i64,
    pub daily_usage: i64,
    pub monthly_usage: i64,
    /// Day the usage counters refer to.
    pub usage_day: NaiveDate,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Usage snapshot as of a given instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ProviderKeyUsage {
    pub daily_usage: i64,
    pub monthly_usage: i64,
    pub daily_limit: i64,
    pub monthly_limit: i64,
    pub daily_remaining: i64,
    pub monthly_remaining: i64,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ProviderKey {
    pub const DEFAULT_DAILY_LIMIT: i64 = 1000;
    pub const DEFAULT_MONTHLY_LIMIT: i64 = 10_000;
    pub const DEFAULT_VALIDITY_DAYS: i64 = 365;

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider_id: ProviderId,
        user_id: UserId,
        environment: Environment,
        public_key: String,
        secret_hash: String,
        daily_limit: i64,
        monthly_limit: i64,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if daily_limit <= 0 || monthly_limit <= 0 {
            return Err(DomainError::validation("Usage limits must be positive"));
        }
        if daily_limit > monthly_limit {
            return Err(DomainError::validation(
                "daily_limit cannot exceed monthly_limit",
            ));
        }
        if expires_at.is_some_and(|exp| exp <= now) {
            return Err(DomainError::validation("expires_at must be in the future"));
        }

        Ok(Self {
            id: ProviderKeyId::new(),
            provider_id,
            user_id,
            environment,
            public_key,
            secret_hash,
            is_active: true,
            daily_limit,
            monthly_limit,
            daily_usage: 0,
            monthly_usage: 0,
            usage_day: now.date_naive(),
            expires_at: Some(
                expires_at.unwrap_or(now + Duration::days(Self::DEFAULT_VALIDITY_DAYS)),
            ),
            last_used_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Active and not expired.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now)
    }

    /// Counters as they would read at `now`, after day/month rollover.
    fn current_counters(&self, now: DateTime<Utc>) -> (i64, i64) {
        let today = now.date_naive();
        let daily = if self.usage_day == today {
            self.daily_usage
        } else {
            0
        };
        let monthly = if (self.usage_day.year(), self.usage_day.month()) == (today.year(), today.month())
        {
            self.monthly_usage
        } else {
            0
        };
        (daily, monthly)
    }

    pub fn usage(&self, now: DateTime<Utc>) -> ProviderKeyUsage {
        let (daily, monthly) = self.current_counters(now);
        ProviderKeyUsage {
            daily_usage: daily,
            monthly_usage: monthly,
            daily_limit: self.daily_limit,
            monthly_limit: self.monthly_limit,
            daily_remaining: (self.daily_limit - daily).max(0),
            monthly_remaining: (self.monthly_limit - monthly).max(0),
            last_used_at: self.last_used_at,
        }
    }

    /// Counts one use, refusing invalid keys and exhausted quotas.
    pub fn record_usage(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.is_active {
            return Err(DomainError::KeyInactive);
        }
        if self.is_expired(now) {
            return Err(DomainError::KeyExpired);
        }

        let (daily, monthly) = self.current_counters(now);
        if daily >= self.daily_limit {
            return Err(DomainError::QuotaExceeded {
                period: "daily",
                limit: self.daily_limit,
            });
        }
        if monthly >= self.monthly_limit {
            return Err(DomainError::QuotaExceeded {
                period: "monthly",
                limit: self.monthly_limit,
            });
        }

        self.daily_usage = daily + 1;
        self.monthly_usage = monthly + 1;
        self.usage_day = now.date_naive();
        self.last_used_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn reset_usage(&mut self, now: DateTime<Utc>) {
        self.daily_usage = 0;
        self.monthly_usage = 0;
        self.usage_day = now.date_naive();
        self.updated_at = now;
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key(now: DateTime<Utc>, daily: i64, monthly: i64) -> ProviderKey {
        ProviderKey::new(
            ProviderId::new(),
            UserId::new(),
            Environment::Sandbox,
            "pk_test".into(),
            "hash".into(),
            daily,
            monthly,
            None,
            now,
        )
        .unwrap()
    }

    #[test]
    fn test_default_expiry_is_one_year() {
        let now = Utc::now();
        let k = key(now, 10, 100);
        assert_eq!(k.expires_at, Some(now + Duration::days(365)));
        assert!(k.is_valid(now));
        assert!(!k.is_valid(now + Duration::days(365)));
    }

    #[test]
    fn test_daily_quota_enforced_and_rolls_over() {
        let day1 = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        let mut k = key(day1, 2, 100);
        k.record_usage(day1).unwrap();
        k.record_usage(day1).unwrap();
        assert!(matches!(
            k.record_usage(day1),
            Err(DomainError::QuotaExceeded { period: "daily", .. })
        ));

        let day2 = day1 + Duration::days(1);
        k.record_usage(day2).unwrap();
        let usage = k.usage(day2);
        assert_eq!(usage.daily_usage, 1);
        assert_eq!(usage.monthly_usage, 3);
        assert_eq!(usage.daily_remaining, 1);
    }

    #[test]
    fn test_monthly_counter_resets_in_new_month() {
        let march = Utc.with_ymd_and_hms(2026, 3, 31, 23, 0, 0).unwrap();
        let mut k = key(march, 5, 5);
        for _ in 0..5 {
            k.record_usage(march).unwrap();
        }
        let april = march + Duration::hours(2);
        assert_eq!(k.usage(april).monthly_usage, 0);
        k.record_usage(april).unwrap();
        assert_eq!(k.monthly_usage, 1);
    }

    #[test]
    fn test_inactive_or_expired_key_refused() {
        let now = Utc::now();
        let mut k = key(now, 5, 5);
        k.deactivate(now);
        assert_eq!(k.record_usage(now), Err(DomainError::KeyInactive));

        let mut k = key(now, 5, 5);
        let later = now + Duration::days(400);
        assert_eq!(k.record_usage(later), Err(DomainError::KeyExpired));
    }

    #[test]
    fn test_limits_validated() {
        let now = Utc::now();
        assert!(
            ProviderKey::new(
                ProviderId::new(),
                UserId::new(),
                Environment::Production,
                "pk".into(),
                "h".into(),
                50,
                10,
                None,
                now
            )
            .is_err()
        );
    }
}
