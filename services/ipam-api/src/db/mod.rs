//! Postgres access: pool, schema migrations and the inventory store.

mod error;
mod store;

pub use error::DbError;
pub use store::PgAddressStore;

use std::path::PathBuf;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

/// Pool settings. Reservation bursts hold one connection per in-flight
/// claim, so `max_connections` bounds useful `IPSCOPE_RESERVE_CONCURRENCY`.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/ipscope".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

impl DbConfig {
    /// Read `DATABASE_URL`, `DB_MAX_CONNECTIONS` and `DB_MIN_CONNECTIONS`;
    /// anything unset or unparseable keeps its default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let count = |name: &str, fallback: u32| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(fallback)
        };

        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| defaults.database_url.clone()),
            max_connections: count("DB_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: count("DB_MIN_CONNECTIONS", defaults.min_connections),
            ..defaults
        }
    }
}

/// Inventory schema lives next to the crate; the first two entries cover
/// running from the crate or the workspace root.
fn migration_dirs() -> [PathBuf; 3] {
    [
        PathBuf::from("./migrations"),
        PathBuf::from("services/ipam-api/migrations"),
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    ]
}

/// Handle on the inventory database.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to inventory database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect(&config.database_url)
            .await
            .map_err(DbError::Connect)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Readiness check: the inventory table must be reachable, not just the
    /// server.
    pub async fn health_check(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1 FROM ip_inventory LIMIT 1")
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;
        Ok(())
    }

    /// Apply the inventory schema from the first migration directory found.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        let dirs = migration_dirs();
        let mut last_error = None;

        for dir in &dirs {
            match Migrator::new(dir.clone()).await {
                Ok(migrator) => {
                    info!(migrations_dir = %dir.display(), "Applying inventory schema");
                    migrator.run(&self.pool).await.map_err(DbError::Migration)?;
                    return Ok(());
                }
                Err(e) => {
                    debug!(migrations_dir = %dir.display(), error = %e, "No migrations here");
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(DbError::MigrationDirNotFound {
            tried: dirs
                .iter()
                .map(|dir| dir.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            last_error: last_error.unwrap_or_else(|| "unknown error".to_string()),
        })
    }

    /// Store over `ip_inventory`, `subnets` and `sections`.
    pub fn address_store(&self) -> PgAddressStore {
        PgAddressStore::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.database_url, "postgres://localhost/ipscope");
    }

    #[test]
    fn test_migration_dirs_include_crate_dir() {
        let dirs = migration_dirs();
        assert!(dirs[2].ends_with("migrations"));
        assert!(dirs[2].starts_with(env!("CARGO_MANIFEST_DIR")));
    }
}
