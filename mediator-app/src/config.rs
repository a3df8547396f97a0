//! Configuration loading from environment.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use mediator_hex::{FailurePolicy, RateLimiterState};
use mediator_repo::{CredentialCipher, MEMORY_URL};
use mediator_types::Environment;

/// Log line format, selected with `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'text' or 'json', got '{}'", other)),
        }
    }
}

/// Application configuration.
#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub rate_limit_requests: u64,
    pub rate_limit_window: Duration,
    pub rate_limit_failure_policy: FailurePolicy,
    /// Shared counter store; counters stay in process when unset.
    pub redis_url: Option<String>,
    /// Hex-encoded 256-bit key sealing provider credentials.
    pub credentials_key: Option<String>,
    pub provider_timeout: Duration,
    pub provider_environment: Environment,
    /// Zero disables the periodic provider probes.
    pub provider_check_interval: Duration,
    pub webhook_poll_interval: Duration,
    /// Age after which a `processing` webhook may be claimed again.
    pub webhook_lease: Duration,
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow!("DATABASE_URL environment variable is required"))?;

        let config = Self {
            port: parsed("PORT", 3000)?,
            database_url,
            rate_limit_requests: parsed(
                "RATE_LIMIT_REQUESTS_PER_MINUTE",
                RateLimiterState::DEFAULT_LIMIT,
            )?,
            rate_limit_window: Duration::from_secs(parsed(
                "RATE_LIMIT_WINDOW_SECONDS",
                RateLimiterState::DEFAULT_WINDOW.as_secs(),
            )?),
            rate_limit_failure_policy: parsed("RATE_LIMIT_FAILURE_POLICY", FailurePolicy::default())?,
            redis_url: env::var("REDIS_URL").ok().filter(|u| !u.trim().is_empty()),
            credentials_key: env::var("CREDENTIALS_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            provider_timeout: Duration::from_secs(parsed("PROVIDER_TIMEOUT_SECONDS", 10)?),
            provider_environment: parsed("PROVIDER_ENVIRONMENT", Environment::Sandbox)?,
            provider_check_interval: Duration::from_secs(parsed(
                "PROVIDER_CHECK_INTERVAL_SECONDS",
                3600,
            )?),
            webhook_poll_interval: Duration::from_millis(parsed("WEBHOOK_POLL_INTERVAL_MS", 1000)?),
            webhook_lease: Duration::from_secs(parsed("WEBHOOK_LEASE_SECONDS", 300)?),
            log_format: parsed("LOG_FORMAT", LogFormat::default())?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.rate_limit_requests == 0 {
            bail!("RATE_LIMIT_REQUESTS_PER_MINUTE must be greater than zero");
        }
        if self.rate_limit_window.is_zero() {
            bail!("RATE_LIMIT_WINDOW_SECONDS must be greater than zero");
        }
        if self.provider_timeout.is_zero() {
            bail!("PROVIDER_TIMEOUT_SECONDS must be greater than zero");
        }
        if self.webhook_poll_interval.is_zero() {
            bail!("WEBHOOK_POLL_INTERVAL_MS must be greater than zero");
        }
        if self.webhook_lease.is_zero() {
            bail!("WEBHOOK_LEASE_SECONDS must be greater than zero");
        }
        Ok(())
    }

    pub fn uses_memory_backend(&self) -> bool {
        self.database_url.starts_with(MEMORY_URL)
    }

    /// Scheme of `DATABASE_URL`, safe to log.
    pub fn backend(&self) -> &str {
        self.database_url
            .split_once(':')
            .map_or("unknown", |(scheme, _)| scheme)
    }

    /// Cipher for provider credentials.
    ///
    /// Persistent backends require `CREDENTIALS_KEY`; the in-memory backend
    /// falls back to a random per-process key.
    pub fn credential_cipher(&self) -> anyhow::Result<CredentialCipher> {
        match &self.credentials_key {
            Some(key) => CredentialCipher::from_hex(key.trim())
                .context("Invalid CREDENTIALS_KEY"),
            None if self.uses_memory_backend() => {
                tracing::warn!("CREDENTIALS_KEY not set; using an ephemeral key");
                Ok(CredentialCipher::ephemeral())
            }
            None => bail!("CREDENTIALS_KEY environment variable is required"),
        }
    }
}

/// Reads `name`, falling back to `default` when unset.
fn parsed<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid {}='{}': {}", name, raw, e)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(database_url: &str, credentials_key: Option<&str>) -> Config {
        Config {
            port: 3000,
            database_url: database_url.to_string(),
            rate_limit_requests: 100,
            rate_limit_window: Duration::from_secs(60),
            rate_limit_failure_policy: FailurePolicy::Closed,
            redis_url: None,
            credentials_key: credentials_key.map(str::to_string),
            provider_timeout: Duration::from_secs(10),
            provider_environment: Environment::Sandbox,
            provider_check_interval: Duration::from_secs(3600),
            webhook_poll_interval: Duration::from_millis(1000),
            webhook_lease: Duration::from_secs(300),
            log_format: LogFormat::Text,
        }
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_backend_hides_credentials() {
        let c = config("postgres://user:secret@db/mediator", None);
        assert_eq!(c.backend(), "postgres");
        assert!(!c.uses_memory_backend());
        assert!(config("memory://", None).uses_memory_backend());
    }

    #[test]
    fn test_credentials_key_required_for_persistent_backend() {
        assert!(config("postgres://db/mediator", None).credential_cipher().is_err());
        assert!(config("memory://", None).credential_cipher().is_ok());

        let key = "00".repeat(32);
        assert!(
            config("postgres://db/mediator", Some(&key))
                .credential_cipher()
                .is_ok()
        );
        assert!(
            config("postgres://db/mediator", Some("not-hex"))
                .credential_cipher()
                .is_err()
        );
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut c = config("memory://", None);
        c.rate_limit_window = Duration::ZERO;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_lease() {
        let mut c = config("memory://", None);
        assert!(c.validate().is_ok());
        c.webhook_lease = Duration::ZERO;
        assert!(c.validate().is_err());
    }
}
