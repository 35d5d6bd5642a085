use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::repositories::{DatabaseReturnStore, InMemoryReturnStore, SharedReturnStore};
use metrics::{counter, gauge};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Idle timeout duration
    pub idle_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Establishes a connection pool to the database with custom configuration
///
/// # Errors
/// Returns a `ServiceError::DatabaseError` if the connection cannot be established
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Configuring database connection"
    );

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    gauge!("returns_db.max_connections", config.max_connections as f64);

    let db_pool = Database::connect(opt).await.map_err(|e| {
        error!(error = %e, "Database connection establishment failed");
        counter!("returns_db.connection_failures", 1);
        ServiceError::DatabaseError(e)
    })?;

    info!("Database connection pool established successfully");
    Ok(db_pool)
}

/// Runs the embedded migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    info!("Running database migrations");
    let start = std::time::Instant::now();

    let result = crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(ServiceError::DatabaseError);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!(
            "Database migrations completed successfully in {:?}",
            elapsed
        ),
        Err(e) => error!("Database migrations failed after {:?}: {}", elapsed, e),
    }

    result
}

/// Builds the return store selected by `store_backend`, connecting and
/// migrating the database when needed.
pub async fn open_return_store(cfg: &AppConfig) -> Result<SharedReturnStore, ServiceError> {
    if cfg.uses_in_memory_store() {
        info!("Using in-memory return store; records are lost on restart");
        return Ok(Arc::new(InMemoryReturnStore::new()));
    }

    let pool = establish_connection_with_config(&DbConfig::from(cfg)).await?;
    if cfg.auto_migrate {
        run_migrations(&pool).await?;
    }

    let store = DatabaseReturnStore::open(Arc::new(pool), cfg.store_timeout()).await?;
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::return_record::NewReturnRecord;

    fn sqlite_config() -> AppConfig {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "an-identity-provider-secret-with-enough-entropy".into(),
            "127.0.0.1".into(),
            0,
            "development".into(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.auto_migrate = true;
        cfg
    }

    #[test]
    fn db_config_takes_pool_tuning_from_app_config() {
        let cfg = sqlite_config();
        let db_cfg = DbConfig::from(&cfg);
        assert_eq!(db_cfg.url, "sqlite::memory:");
        assert_eq!(db_cfg.max_connections, 1);
        assert_eq!(db_cfg.acquire_timeout, Duration::from_secs(8));
    }

    #[tokio::test]
    async fn opens_migrated_database_store() {
        let store = open_return_store(&sqlite_config()).await.unwrap();
        assert_eq!(store.backend_name(), "database");

        store
            .append(NewReturnRecord {
                order_id: "A1".into(),
                email: "x@y.com".into(),
                reason: "damaged".into(),
            })
            .await
            .unwrap();
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn opens_in_memory_store_without_database() {
        let mut cfg = sqlite_config();
        cfg.store_backend = "in-memory".into();
        cfg.database_url = "postgres://unreachable.invalid/returns".into();
        let store = open_return_store(&cfg).await.unwrap();
        assert_eq!(store.backend_name(), "in-memory");
    }
}
