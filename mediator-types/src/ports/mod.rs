//! Port traits (interfaces) for the hexagonal architecture.

pub mod counter;
pub mod gateway;
pub mod repository;

pub use counter::{CounterStore, WindowCount};
pub use gateway::{ForwardResponse, ProbeOutcome, ProviderEndpoint, ProviderGateway};
pub use repository::{
    AccountMovement, AccountRepository, ApiKeyRepository, AuditLogRepository, KycRepository,
    PaymentMethodRepository, ProviderKeyRepository, ProviderRepository, Repository,
    SystemConfigRepository, TransactionRepository, UserRepository, WebhookRepository,
};
