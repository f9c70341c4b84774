//! Database connection and management module
//!
//! This module provides connection management, pooling configuration, and
//! the database-backed services of the CRM core: the permission registry,
//! the deletion planner, and the cascade executor.

use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tracing::{info, warn};

pub mod cascade_executor;
pub mod deletion_planner;
pub mod deletion_service;
pub mod registry_service;

// Re-export services and their types for convenience
pub use cascade_executor::{CascadeExecutor, ExecutionReport};
pub use deletion_planner::{
    BlockedDeletion, DeletionPlan, DeletionPlanner, DependentSummary, EntityKind,
};
pub use deletion_service::{DeletionOutcome, DeletionRequest, DeletionService};
pub use registry_service::{ActorResolver, RegistryService};

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost:5432/crm".to_string()),
            max_connections: std::env::var("DATABASE_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)), // 10 minutes
            max_lifetime: Some(Duration::from_secs(1800)), // 30 minutes
        }
    }
}

/// Database connection manager
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    /// Create a new database manager with the given configuration
    pub async fn new(config: DatabaseConfig) -> Result<Self, sqlx::Error> {
        info!("Connecting to database");

        let mut pool_options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout);

        if let Some(idle_timeout) = config.idle_timeout {
            pool_options = pool_options.idle_timeout(idle_timeout);
        }

        if let Some(max_lifetime) = config.max_lifetime {
            pool_options = pool_options.max_lifetime(max_lifetime);
        }

        let pool = pool_options
            .connect(&config.database_url)
            .await
            .map_err(|e| {
                warn!("Failed to connect to database: {}", e);
                e
            })?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Create a new database manager with default configuration
    pub async fn with_default_config() -> Result<Self, sqlx::Error> {
        let config = DatabaseConfig::default();
        Self::new(config).await
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create a new permission registry service using this connection
    pub fn registry_service(&self) -> RegistryService {
        RegistryService::new(self.pool.clone())
    }

    /// Create a new deletion service using this connection
    pub fn deletion_service(&self) -> DeletionService {
        DeletionService::new(self.pool.clone())
    }

    /// Test database connectivity
    pub async fn test_connection(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
    }

    /// Verify that the CRM schema is present
    pub async fn verify_schema(&self) -> Result<(), sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM information_schema.tables
            WHERE table_name IN ('users', 'companies', 'customers', 'leads',
                                 'lead_activities', 'role_permissions')
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.get("count");
        if count < 6 {
            warn!("Expected CRM tables not found. Please run migration scripts");
            return Err(sqlx::Error::RowNotFound);
        }

        info!("Database schema verification complete");
        Ok(())
    }

    /// Get database connection statistics
    pub fn connection_stats(&self) -> ConnectionStats {
        ConnectionStats {
            size: self.pool.size(),
            num_idle: self.pool.num_idle() as u32,
        }
    }

    /// Close the database connection pool
    pub async fn close(self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }
}

/// Database connection statistics
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub size: u32,
    pub num_idle: u32,
}

impl std::fmt::Display for ConnectionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pool size: {}, Idle: {}", self.size, self.num_idle)
    }
}
