//! sqlx adapter shared by the PostgreSQL and SQLite backends.
//!
//! Queries use `$N` placeholders, which both drivers accept, and native
//! column types (UUID, timestamps, JSON) that each driver maps on its own.
//! With both features enabled PostgreSQL is used.

use async_trait::async_trait;
use sqlx::Pool;

use mediator_types::{RepoError, Repository};

mod accounts;
mod api_keys;
mod audit;
mod kyc;
mod payment_methods;
mod provider_keys;
mod providers;
mod system_configs;
mod transactions;
mod types;
mod users;
mod webhooks;

#[cfg(feature = "postgres")]
pub(crate) type Db = sqlx::Postgres;
#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
pub(crate) type Db = sqlx::Sqlite;

#[cfg(feature = "postgres")]
const MIGRATIONS: &[(&str, &str)] = &[(
    "0001",
    include_str!("../../migrations/0001_create_tables_pg.sql"),
)];
#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
const MIGRATIONS: &[(&str, &str)] = &[(
    "0001",
    include_str!("../../migrations/0001_create_tables.sql"),
)];

// ─────────────────────────────────────────────────────────────────────────────
// SQL Repository
// ─────────────────────────────────────────────────────────────────────────────

/// Repository over a sqlx connection pool.
pub struct SqlRepo {
    pool: Pool<Db>,
}

impl SqlRepo {
    /// Connects and applies migrations.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = connect(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Db> {
        &self.pool
    }
}

#[cfg(feature = "postgres")]
async fn connect(database_url: &str) -> anyhow::Result<Pool<Db>> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
#[allow(clippy::collapsible_if)]
async fn connect(database_url: &str) -> anyhow::Result<Pool<Db>> {
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
    use std::str::FromStr;

    // On-disk databases need their directory; no-op for in-memory.
    if let Some(path) = database_url.strip_prefix("sqlite://") {
        let path = path.split('?').next().unwrap_or(path);
        if path != ":memory:" {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    Ok(SqlitePool::connect_with(options).await?)
}

/// Executes each migration, splitting statements on semicolons.
async fn run_migrations(pool: &Pool<Db>) -> anyhow::Result<()> {
    for (name, sql) in MIGRATIONS {
        for statement in sql.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt)
                    .execute(pool)
                    .await
                    .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
            }
        }
        tracing::debug!(migration = name, "migration applied");
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Error helpers
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn db_err(e: sqlx::Error) -> RepoError {
    RepoError::Database(e.to_string())
}

pub(crate) fn tx_err(e: sqlx::Error) -> RepoError {
    RepoError::Transaction(e.to_string())
}

/// Maps unique-constraint violations to `Conflict`.
pub(crate) fn write_err(e: sqlx::Error, conflict: &str) -> RepoError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepoError::Conflict(conflict.to_string())
        }
        _ => db_err(e),
    }
}

/// `NotFound` when an update touched no rows.
pub(crate) fn require_row(rows_affected: u64) -> Result<(), RepoError> {
    if rows_affected == 0 {
        Err(RepoError::NotFound)
    } else {
        Ok(())
    }
}

#[async_trait]
impl Repository for SqlRepo {
    async fn ping(&self) -> Result<(), RepoError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(db_err)
    }
}
