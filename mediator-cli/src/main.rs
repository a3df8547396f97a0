//! Mediator CLI
//!
//! Command-line interface for the Mediator API.

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;

use mediator_client::MediatorClient;
use mediator_types::{
    AccountQuery, AccountType, BankAccountId, CreateAccountRequest, CreateApiKeyRequest,
    CreateProviderKeyRequest, CreateTransactionRequest, CurrencyCode, Environment,
    FailTransactionRequest, HealthStatus, MovementRequest, ProviderId, ProviderKeyId,
    ProviderKeyQuery, ProviderQuery, ProviderStatus, ProviderWebhookId, TransactionId,
    TransactionQuery, TransactionStatus, UpdateStatusRequest, WebhookQuery, WebhookStatus,
};

#[derive(Parser)]
#[command(name = "mediator")]
#[command(author, version, about = "Mediator API CLI client", long_about = None)]
struct Cli {
    /// Base URL of the Mediator API
    #[arg(
        long,
        env = "MEDIATOR_API_URL",
        default_value = "http://localhost:3000"
    )]
    api_url: String,

    /// API key for authentication
    #[arg(long, env = "MEDIATOR_API_KEY")]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the first administrator and print its API key
    Bootstrap {
        #[arg(long, default_value = "admin")]
        username: String,
        #[arg(long)]
        email: String,
    },
    /// Show the authenticated user
    Whoami,
    /// API key management
    Key {
        #[command(subcommand)]
        action: KeyCommands,
    },
    /// Bank account operations
    Account {
        #[command(subcommand)]
        action: AccountCommands,
    },
    /// Transaction operations
    Transaction {
        #[command(subcommand)]
        action: TransactionCommands,
    },
    /// Provider operations
    Provider {
        #[command(subcommand)]
        action: ProviderCommands,
    },
    /// Inbound provider webhook events
    Webhook {
        #[command(subcommand)]
        action: WebhookCommands,
    },
    /// Check API health
    Health,
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Create a new API key
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        expires_in_days: Option<i64>,
    },
    /// List API keys
    List,
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Register a bank account
    Create {
        #[arg(long)]
        number: String,
        #[arg(long)]
        bank: String,
        #[arg(long)]
        holder: String,
        /// savings, current or wallet
        #[arg(long, default_value = "savings")]
        account_type: AccountType,
        #[arg(long, default_value = "NPR")]
        currency: CurrencyCode,
    },
    /// Get account details
    Get { id: BankAccountId },
    /// List accounts
    List,
    /// Deposit funds
    Deposit {
        id: BankAccountId,
        #[arg(long)]
        amount: i64,
        #[arg(long, default_value = "NPR")]
        currency: CurrencyCode,
        #[arg(long)]
        reference: Option<String>,
    },
    /// Withdraw funds
    Withdraw {
        id: BankAccountId,
        #[arg(long)]
        amount: i64,
        #[arg(long, default_value = "NPR")]
        currency: CurrencyCode,
        #[arg(long)]
        reference: Option<String>,
    },
    /// Balance and recent transactions
    Statement { id: BankAccountId },
}

#[derive(Subcommand)]
enum TransactionCommands {
    /// Create a pending transaction
    Create {
        #[arg(long)]
        reference: String,
        #[arg(long)]
        source: String,
        /// Provider code
        #[arg(long)]
        target: String,
        #[arg(long, default_value = "payment")]
        transaction_type: String,
        #[arg(long)]
        amount: i64,
        #[arg(long, default_value = "NPR")]
        currency: CurrencyCode,
    },
    /// Get a transaction
    Get { id: TransactionId },
    /// List transactions
    List {
        #[arg(long)]
        status: Option<TransactionStatus>,
        #[arg(long)]
        target: Option<String>,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Forward a pending transaction to its provider
    Submit { id: TransactionId },
    /// Mark a pending transaction as failed
    Fail {
        id: TransactionId,
        #[arg(long)]
        message: String,
    },
}

#[derive(Subcommand)]
enum ProviderCommands {
    /// List providers
    List {
        #[arg(long)]
        status: Option<ProviderStatus>,
    },
    /// Get a provider
    Get { id: ProviderId },
    /// Probe the provider's status endpoint now
    Check { id: ProviderId },
    /// Set the provider status by hand
    SetStatus {
        id: ProviderId,
        #[arg(long)]
        status: ProviderStatus,
        #[arg(long)]
        message: Option<String>,
    },
    /// Transaction statistics for a provider
    Stats { id: ProviderId },
    /// Issue a new webhook signing secret
    RotateSecret { id: ProviderId },
    /// Issue a provider key pair
    CreateKey {
        provider_id: ProviderId,
        #[arg(long, default_value = "sandbox")]
        environment: Environment,
        #[arg(long)]
        daily_limit: Option<i64>,
        #[arg(long)]
        monthly_limit: Option<i64>,
    },
    /// List provider keys
    Keys {
        #[arg(long)]
        provider_id: Option<ProviderId>,
    },
    /// Usage of a provider key against its limits
    Usage { key_id: ProviderKeyId },
}

#[derive(Subcommand)]
enum WebhookCommands {
    /// List received events
    List {
        #[arg(long)]
        status: Option<WebhookStatus>,
        #[arg(long)]
        provider_id: Option<ProviderId>,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Get an event
    Get { id: ProviderWebhookId },
    /// Queue a failed event for another attempt
    Retry { id: ProviderWebhookId },
    /// Cancel an event
    Cancel { id: ProviderWebhookId },
    /// Counts per status
    Summary,
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut client = MediatorClient::new(&cli.api_url);
    if let Some(key) = cli.api_key {
        client = client.with_api_key(key);
    }

    match cli.command {
        Commands::Health => {
            let report = client.health().await?;
            print(&report)?;
            if report.status != HealthStatus::Healthy {
                std::process::exit(1);
            }
        }

        Commands::Bootstrap { username, email } => {
            let created = client.bootstrap(&username, &email).await?;
            print(&created)?;
        }

        Commands::Whoami => print(&client.me().await?)?,

        Commands::Key { action } => match action {
            KeyCommands::Create {
                name,
                expires_in_days,
            } => {
                let req = CreateApiKeyRequest {
                    name,
                    user_id: None,
                    expires_in_days,
                };
                print(&client.create_api_key(&req).await?)?;
            }
            KeyCommands::List => print(&client.list_api_keys().await?)?,
        },

        Commands::Account { action } => match action {
            AccountCommands::Create {
                number,
                bank,
                holder,
                account_type,
                currency,
            } => {
                let req = CreateAccountRequest {
                    account_number: number,
                    bank_name: bank,
                    holder_name: holder,
                    account_type,
                    currency,
                    user_id: None,
                };
                print(&client.create_account(&req).await?)?;
            }
            AccountCommands::Get { id } => print(&client.get_account(id).await?)?,
            AccountCommands::List => {
                print(&client.list_accounts(&AccountQuery::default()).await?)?
            }
            AccountCommands::Deposit {
                id,
                amount,
                currency,
                reference,
            } => {
                let req = MovementRequest {
                    amount,
                    currency,
                    reference,
                };
                print(&client.deposit(id, &req).await?)?;
            }
            AccountCommands::Withdraw {
                id,
                amount,
                currency,
                reference,
            } => {
                let req = MovementRequest {
                    amount,
                    currency,
                    reference,
                };
                print(&client.withdraw(id, &req).await?)?;
            }
            AccountCommands::Statement { id } => print(&client.statement(id).await?)?,
        },

        Commands::Transaction { action } => match action {
            TransactionCommands::Create {
                reference,
                source,
                target,
                transaction_type,
                amount,
                currency,
            } => {
                let req = CreateTransactionRequest {
                    reference,
                    source_system: source,
                    target_system: target,
                    transaction_type,
                    amount,
                    currency,
                    request_payload: None,
                };
                print(&client.create_transaction(&req).await?)?;
            }
            TransactionCommands::Get { id } => print(&client.get_transaction(id).await?)?,
            TransactionCommands::List {
                status,
                target,
                limit,
            } => {
                let query = TransactionQuery {
                    status,
                    target_system: target,
                    limit,
                    ..Default::default()
                };
                print(&client.list_transactions(&query).await?)?;
            }
            TransactionCommands::Submit { id } => {
                print(&client.submit_transaction(id).await?)?
            }
            TransactionCommands::Fail { id, message } => {
                let req = FailTransactionRequest {
                    error_message: message,
                    response_payload: None,
                };
                print(&client.fail_transaction(id, &req).await?)?;
            }
        },

        Commands::Provider { action } => match action {
            ProviderCommands::List { status } => {
                let query = ProviderQuery {
                    status,
                    ..Default::default()
                };
                print(&client.list_providers(&query).await?)?;
            }
            ProviderCommands::Get { id } => print(&client.get_provider(id).await?)?,
            ProviderCommands::Check { id } => {
                let result = client.check_provider_status(id).await?;
                print(&result)?;
                if !result.is_healthy {
                    std::process::exit(1);
                }
            }
            ProviderCommands::SetStatus {
                id,
                status,
                message,
            } => {
                let req = UpdateStatusRequest { status, message };
                print(&client.update_provider_status(id, &req).await?)?;
            }
            ProviderCommands::Stats { id } => print(&client.provider_statistics(id).await?)?,
            ProviderCommands::RotateSecret { id } => {
                print(&client.rotate_webhook_secret(id).await?)?
            }
            ProviderCommands::CreateKey {
                provider_id,
                environment,
                daily_limit,
                monthly_limit,
            } => {
                let req = CreateProviderKeyRequest {
                    provider_id,
                    environment,
                    daily_limit,
                    monthly_limit,
                    expires_at: None,
                    user_id: None,
                };
                print(&client.create_provider_key(&req).await?)?;
            }
            ProviderCommands::Keys { provider_id } => {
                let query = ProviderKeyQuery {
                    provider_id,
                    ..Default::default()
                };
                print(&client.list_provider_keys(&query).await?)?;
            }
            ProviderCommands::Usage { key_id } => {
                print(&client.provider_key_usage(key_id).await?)?
            }
        },

        Commands::Webhook { action } => match action {
            WebhookCommands::List {
                status,
                provider_id,
                limit,
            } => {
                let query = WebhookQuery {
                    status,
                    provider_id,
                    limit,
                    ..Default::default()
                };
                print(&client.list_webhooks(&query).await?)?;
            }
            WebhookCommands::Get { id } => print(&client.get_webhook(id).await?)?,
            WebhookCommands::Retry { id } => print(&client.retry_webhook(id).await?)?,
            WebhookCommands::Cancel { id } => print(&client.cancel_webhook(id).await?)?,
            WebhookCommands::Summary => print(&client.webhook_summary().await?)?,
        },
    }

    Ok(())
}
