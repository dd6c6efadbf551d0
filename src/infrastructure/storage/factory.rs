//! Record store factory for runtime backend selection

use std::sync::Arc;

use tracing::info;

use crate::config::StorageBackendConfig;
use crate::domain::signing_key::SigningKeyRepository;
use crate::domain::DomainError;
use crate::infrastructure::signing_key::{
    InMemorySigningKeyRepository, PostgresSigningKeyRepository,
};

use super::migrations::run_signing_migrations;
use super::postgres::PostgresConfig;

/// Supported storage types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// In-memory storage (for testing/development)
    InMemory,
    /// PostgreSQL storage
    Postgres,
}

impl StorageType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" | "in_memory" => Some(Self::InMemory),
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            _ => None,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    InMemory,
    Postgres {
        config: PostgresConfig,
        /// Apply pending migrations after connecting
        migrate: bool,
    },
}

impl StorageConfig {
    pub fn in_memory() -> Self {
        Self::InMemory
    }

    /// Build from the `storage` section of the application configuration
    pub fn from_settings(settings: &StorageBackendConfig) -> Result<Self, DomainError> {
        let storage_type = StorageType::from_str(&settings.backend).ok_or_else(|| {
            DomainError::configuration(format!(
                "Unknown storage backend '{}'",
                settings.backend
            ))
        })?;

        match storage_type {
            StorageType::InMemory => Ok(Self::InMemory),
            StorageType::Postgres => {
                let url = settings.resolved_url().ok_or_else(|| {
                    DomainError::configuration(
                        "storage.url or DATABASE_URL is required for the postgres backend",
                    )
                })?;

                Ok(Self::Postgres {
                    config: PostgresConfig::new(url).with_pool_size(settings.max_connections),
                    migrate: settings.auto_migrate,
                })
            }
        }
    }

    pub fn storage_type(&self) -> StorageType {
        match self {
            Self::InMemory => StorageType::InMemory,
            Self::Postgres { .. } => StorageType::Postgres,
        }
    }
}

/// Factory for signing key record stores
#[derive(Debug)]
pub struct RepositoryFactory;

impl RepositoryFactory {
    /// Create a record store based on the configuration
    pub async fn create(
        config: &StorageConfig,
    ) -> Result<Arc<dyn SigningKeyRepository>, DomainError> {
        info!("Storage backend: {:?}", config.storage_type());

        match config {
            StorageConfig::InMemory => {
                let repository: Arc<dyn SigningKeyRepository> = Self::create_in_memory();
                Ok(repository)
            }
            StorageConfig::Postgres { config, migrate } => {
                let repository: Arc<dyn SigningKeyRepository> =
                    Self::create_postgres(config, *migrate).await?;
                Ok(repository)
            }
        }
    }

    pub fn create_in_memory() -> Arc<InMemorySigningKeyRepository> {
        Arc::new(InMemorySigningKeyRepository::new())
    }

    /// Connect to PostgreSQL, optionally applying pending migrations
    pub async fn create_postgres(
        config: &PostgresConfig,
        migrate: bool,
    ) -> Result<Arc<PostgresSigningKeyRepository>, DomainError> {
        let pool = config.connect().await?;

        if migrate {
            let applied = run_signing_migrations(&pool).await?;
            info!("Schema up to date: applied={}", applied);
        }

        Ok(Arc::new(PostgresSigningKeyRepository::new(pool)))
    }
}
