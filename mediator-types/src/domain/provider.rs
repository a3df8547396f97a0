//! External provider configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::money::CurrencyCode;
use super::require_text;
use crate::error::DomainError;

entity_id!(
    /// Unique identifier for a Provider.
    ProviderId
);

text_enum!(
    ProviderType {
        Payment => "payment",
        Wallet => "wallet",
        Bank => "bank",
        Kyc => "kyc",
    }
);

text_enum!(
    /// Availability as last observed or set by an operator.
    ProviderStatus {
        Online => "online",
        Offline => "offline",
        Maintenance => "maintenance",
        Deprecated => "deprecated",
    }
);

text_enum!(
    /// How outbound requests to a remote system authenticate.
    AuthType {
        None => "none",
        ApiKey => "api_key",
        Bearer => "bearer",
        Basic => "basic",
    }
);

/// Opaque, encrypted-at-rest secret material (hex of nonce and ciphertext).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SealedSecret(pub String);

impl std::fmt::Debug for SealedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealedSecret(..)")
    }
}

/// Plain credentials before sealing. Never persisted or logged as-is.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ProviderCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Resolved authentication for one outbound request.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMaterial {
    None,
    ApiKey(String),
    Bearer(String),
    Basic { username: String, password: String },
}

impl std::fmt::Debug for AuthMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMaterial::None => f.write_str("None"),
            AuthMaterial::ApiKey(_) => f.write_str("ApiKey(***)"),
            AuthMaterial::Bearer(_) => f.write_str("Bearer(***)"),
            AuthMaterial::Basic { username, .. } => write!(f, "Basic({username}:***)"),
        }
    }
}

impl ProviderCredentials {
    /// Picks the credential fields required by `auth_type`.
    pub fn auth_material(&self, auth_type: AuthType) -> Result<AuthMaterial, DomainError> {
        let missing = |field: &str| {
            DomainError::validation(format!(
                "{} authentication requires credentials.{}",
                auth_type, field
            ))
        };
        match auth_type {
            AuthType::None => Ok(AuthMaterial::None),
            AuthType::ApiKey => self
                .api_key
                .clone()
                .map(AuthMaterial::ApiKey)
                .ok_or_else(|| missing("api_key")),
            AuthType::Bearer => self
                .token
                .clone()
                .map(AuthMaterial::Bearer)
                .ok_or_else(|| missing("token")),
            AuthType::Basic => match (&self.username, &self.password) {
                (Some(username), Some(password)) => Ok(AuthMaterial::Basic {
                    username: username.clone(),
                    password: password.clone(),
                }),
                _ => Err(missing("username/password")),
            },
        }
    }
}

/// An external payment, wallet, bank or KYC service.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Provider {
    pub id: ProviderId,
    pub name: String,
    /// Unique lower-case code used in URLs and as transaction target.
    pub code: String,
    pub provider_type: ProviderType,
    pub supported_currencies: Vec<String>,
    pub supported_countries: Vec<String>,
    pub base_url: String,
    pub status_path: String,
    pub submit_path: String,
    pub auth_type: AuthType,
    /// Outbound requests allowed per minute.
    pub rate_limit: i64,
    pub is_active: bool,
    pub status: ProviderStatus,
    pub status_message: Option<String>,
    #[serde(skip)]
    pub credentials: Option<SealedSecret>,
    #[serde(skip)]
    pub webhook_secret: String,
    pub last_check_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable provider settings.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub name: String,
    pub provider_type: ProviderType,
    pub supported_currencies: Vec<String>,
    pub supported_countries: Vec<String>,
    pub base_url: String,
    pub status_path: String,
    pub submit_path: String,
    pub auth_type: AuthType,
    pub rate_limit: i64,
    pub is_active: bool,
}

impl ProviderSettings {
    /// Validates and normalizes currency/country codes in place.
    pub fn normalize(&mut self) -> Result<(), DomainError> {
        require_text("name", &self.name, 100)?;
        validate_base_url(&self.base_url)?;
        validate_path("status_path", &self.status_path)?;
        validate_path("submit_path", &self.submit_path)?;
        if self.rate_limit <= 0 {
            return Err(DomainError::validation("rate_limit must be positive"));
        }
        self.supported_currencies = self
            .supported_currencies
            .iter()
            .map(|c| CurrencyCode::parse(c).map(String::from))
            .collect::<Result<_, _>>()?;
        self.supported_countries = self
            .supported_countries
            .iter()
            .map(|c| {
                let c = c.trim();
                if c.len() == 2 && c.chars().all(|ch| ch.is_ascii_alphabetic()) {
                    Ok(c.to_ascii_uppercase())
                } else {
                    Err(DomainError::validation(format!("Invalid country code: {}", c)))
                }
            })
            .collect::<Result<_, _>>()?;
        Ok(())
    }
}

impl Provider {
    pub const DEFAULT_RATE_LIMIT: i64 = 100;

    /// Registers a provider. New providers start `offline` until probed.
    pub fn new(
        code: String,
        mut settings: ProviderSettings,
        credentials: Option<SealedSecret>,
        webhook_secret: String,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        validate_code(&code)?;
        settings.normalize()?;

        Ok(Self {
            id: ProviderId::new(),
            name: settings.name,
            code,
            provider_type: settings.provider_type,
            supported_currencies: settings.supported_currencies,
            supported_countries: settings.supported_countries,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            status_path: settings.status_path,
            submit_path: settings.submit_path,
            auth_type: settings.auth_type,
            rate_limit: settings.rate_limit,
            is_active: settings.is_active,
            status: ProviderStatus::Offline,
            status_message: None,
            credentials,
            webhook_secret,
            last_check_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Current editable settings.
    pub fn settings(&self) -> ProviderSettings {
        ProviderSettings {
            name: self.name.clone(),
            provider_type: self.provider_type,
            supported_currencies: self.supported_currencies.clone(),
            supported_countries: self.supported_countries.clone(),
            base_url: self.base_url.clone(),
            status_path: self.status_path.clone(),
            submit_path: self.submit_path.clone(),
            auth_type: self.auth_type,
            rate_limit: self.rate_limit,
            is_active: self.is_active,
        }
    }

    pub fn apply_settings(
        &mut self,
        mut settings: ProviderSettings,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        settings.normalize()?;
        self.name = settings.name;
        self.provider_type = settings.provider_type;
        self.supported_currencies = settings.supported_currencies;
        self.supported_countries = settings.supported_countries;
        self.base_url = settings.base_url.trim_end_matches('/').to_string();
        self.status_path = settings.status_path;
        self.submit_path = settings.submit_path;
        self.auth_type = settings.auth_type;
        self.rate_limit = settings.rate_limit;
        self.is_active = settings.is_active;
        self.updated_at = now;
        Ok(())
    }

    pub fn status_url(&self) -> String {
        format!("{}{}", self.base_url, self.status_path)
    }

    pub fn submit_url(&self) -> String {
        format!("{}{}", self.base_url, self.submit_path)
    }

    pub fn supports_currency(&self, currency: &CurrencyCode) -> bool {
        self.supported_currencies.is_empty()
            || self
                .supported_currencies
                .iter()
                .any(|c| c == currency.as_str())
    }

    /// Records the outcome of a status probe.
    pub fn record_check(&mut self, healthy: bool, message: Option<String>, now: DateTime<Utc>) {
        self.status = if healthy {
            ProviderStatus::Online
        } else {
            ProviderStatus::Offline
        };
        self.status_message = message;
        self.last_check_at = Some(now);
        self.updated_at = now;
    }

    /// Operator override of the status.
    pub fn set_status(&mut self, status: ProviderStatus, message: Option<String>, now: DateTime<Utc>) {
        self.status = status;
        self.status_message = message;
        self.updated_at = now;
    }
}

/// Lower-case letters, digits, `_` and `-`, 2 to 50 characters.
pub fn validate_code(code: &str) -> Result<(), DomainError> {
    let valid_chars = code
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-'));
    if (2..=50).contains(&code.len()) && valid_chars {
        Ok(())
    } else {
        Err(DomainError::validation(format!(
            "Invalid provider code: {}",
            code
        )))
    }
}

pub fn validate_base_url(url: &str) -> Result<(), DomainError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(host) if !host.trim_matches('/').is_empty() && !host.contains(char::is_whitespace) => {
            Ok(())
        }
        _ => Err(DomainError::validation(format!("Invalid base_url: {}", url))),
    }
}

fn validate_path(field: &str, path: &str) -> Result<(), DomainError> {
    if path.starts_with('/') && !path.contains(char::is_whitespace) {
        Ok(())
    } else {
        Err(DomainError::validation(format!(
            "{} must start with '/'",
            field
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn settings() -> ProviderSettings {
        ProviderSettings {
            name: "eSewa".into(),
            provider_type: ProviderType::Wallet,
            supported_currencies: vec!["npr".into()],
            supported_countries: vec!["np".into()],
            base_url: "https://api.esewa.test/".into(),
            status_path: "/health".into(),
            submit_path: "/transactions".into(),
            auth_type: AuthType::ApiKey,
            rate_limit: 100,
            is_active: true,
        }
    }

    #[test]
    fn test_new_provider_normalizes() {
        let p = Provider::new("esewa".into(), settings(), None, "whsec_x".into(), Utc::now())
            .unwrap();
        assert_eq!(p.base_url, "https://api.esewa.test");
        assert_eq!(p.status_url(), "https://api.esewa.test/health");
        assert_eq!(p.supported_currencies, vec!["NPR"]);
        assert_eq!(p.supported_countries, vec!["NP"]);
        assert_eq!(p.status, ProviderStatus::Offline);
    }

    #[test]
    fn test_invalid_code_and_url_rejected() {
        assert!(validate_code("ESewa").is_err());
        assert!(validate_code("e").is_err());
        assert!(validate_base_url("ftp://x").is_err());
        assert!(validate_base_url("https://").is_err());

        let mut s = settings();
        s.rate_limit = 0;
        assert!(Provider::new("esewa".into(), s, None, String::new(), Utc::now()).is_err());
    }

    #[test]
    fn test_record_check_sets_status() {
        let now = Utc::now();
        let mut p = Provider::new("esewa".into(), settings(), None, String::new(), now).unwrap();
        p.record_check(true, None, now);
        assert_eq!(p.status, ProviderStatus::Online);
        assert_eq!(p.last_check_at, Some(now));

        p.record_check(false, Some("HTTP 503".into()), now);
        assert_eq!(p.status, ProviderStatus::Offline);
        assert_eq!(p.status_message.as_deref(), Some("HTTP 503"));
    }

    #[test]
    fn test_auth_material_requires_fields() {
        let creds = ProviderCredentials {
            api_key: Some("k".into()),
            ..Default::default()
        };
        assert_eq!(
            creds.auth_material(AuthType::ApiKey).unwrap(),
            AuthMaterial::ApiKey("k".into())
        );
        assert!(creds.auth_material(AuthType::Basic).is_err());
        assert_eq!(creds.auth_material(AuthType::None).unwrap(), AuthMaterial::None);
    }

    #[test]
    fn test_secrets_not_serialized_or_logged() {
        let creds = ProviderCredentials {
            token: Some("tok-123".into()),
            ..Default::default()
        };
        assert!(!format!("{:?}", creds).contains("tok-123"));

        let p = Provider::new(
            "esewa".into(),
            settings(),
            Some(SealedSecret("abcd".into())),
            "whsec_secret".into(),
            Utc::now(),
        )
        .unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert!(!json.contains("whsec_secret"));
        assert!(!json.contains("abcd"));
    }
}
