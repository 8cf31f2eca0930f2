use crate::config::AppConfig;
use crate::errors::ServiceError;
use metrics::{counter, gauge, histogram};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

pub type DbPool = DatabaseConnection;

/// Pool settings, usually derived from [`AppConfig`]
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            // sqlx refuses a minimum above the maximum
            min_connections: cfg.db_min_connections.min(cfg.db_max_connections),
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Opens the pool. SQLite URLs get foreign keys enforced by sqlx, which the
/// detail tables rely on for cascade deletes.
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    let backend = config.url.split(':').next().unwrap_or("unknown");
    info!(backend, max_connections = config.max_connections, "Opening database pool");
    gauge!("multi_grn_db.max_connections", config.max_connections as f64);

    Database::connect(opt).await.map_err(|e| {
        error!(backend, error = %e, "Could not open database pool");
        counter!("multi_grn_db.connection_failures", 1);
        ServiceError::DatabaseError(e)
    })
}

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    establish_connection_with_config(&cfg.into()).await
}

/// Applies pending GRN schema migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    let started = Instant::now();
    crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(|e| {
            error!(error = %e, "Migrations failed");
            ServiceError::MigrationError(e.to_string())
        })?;
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "Migrations applied");
    Ok(())
}

/// Round-trips to the database; readiness uses this.
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    let started = Instant::now();
    match pool.ping().await {
        Ok(()) => {
            let elapsed = started.elapsed();
            debug!(?elapsed, "Database ping ok");
            histogram!("multi_grn_db.ping_seconds", elapsed.as_secs_f64());
            Ok(())
        }
        Err(e) => {
            counter!("multi_grn_db.connection_failures", 1);
            Err(ServiceError::DatabaseError(e))
        }
    }
}
