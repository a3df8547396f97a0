//! Domain models for the mediator service.

/// Declares a UUID-backed identifier newtype.
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize,
            ::utoipa::ToSchema,
        )]
        #[serde(transparent)]
        pub struct $name(::uuid::Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(::uuid::Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: ::uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> &::uuid::Uuid {
                &self.0
            }

            /// Returns the UUID value.
            pub fn into_uuid(self) -> ::uuid::Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ::uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(::uuid::Uuid::parse_str(s)?))
            }
        }
    };
}

/// Declares a closed enumeration stored and serialized as lower-case text.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize,
            ::utoipa::ToSchema,
        )]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Returns the storage/wire representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::error::DomainError::ValidationError(format!(
                        "Unknown {} value: {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

pub mod account;
pub mod api_key;
pub mod audit;
pub mod kyc;
pub mod money;
pub mod payment_method;
pub mod provider;
pub mod provider_key;
pub mod system_config;
pub mod transaction;
pub mod user;
pub mod webhook;

pub use account::{AccountType, BankAccount, BankAccountId};
pub use api_key::{ApiKey, ApiKeyId};
pub use audit::{AuditAction, AuditLog, AuditLogId};
pub use kyc::{DocumentType, KycDetails, KycProfile, KycProfileId, KycStatus};
pub use money::{CurrencyCode, Money};
pub use payment_method::{PaymentMethod, PaymentMethodId, PaymentMethodType};
pub use provider::{
    AuthMaterial, AuthType, Provider, ProviderCredentials, ProviderId, ProviderSettings,
    ProviderStatus, ProviderType, SealedSecret,
};
pub use provider_key::{Environment, ProviderKey, ProviderKeyId, ProviderKeyUsage};
pub use system_config::{SystemConfig, SystemConfigId, SystemType};
pub use transaction::{NewTransaction, Transaction, TransactionId, TransactionStatus};
pub use user::{Role, User, UserId};
pub use webhook::{ProviderWebhook, ProviderWebhookId, WebhookStatus};

/// Returns an error when a required text field is blank or too long.
pub(crate) fn require_text(
    field: &str,
    value: &str,
    max_len: usize,
) -> Result<(), crate::error::DomainError> {
    if value.trim().is_empty() {
        return Err(crate::error::DomainError::validation(format!(
            "{} cannot be empty",
            field
        )));
    }
    if value.chars().count() > max_len {
        return Err(crate::error::DomainError::validation(format!(
            "{} must be at most {} characters",
            field, max_len
        )));
    }
    Ok(())
}
