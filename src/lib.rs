//! Signing Keys
//!
//! Lifecycle management for opaque bearer keys:
//! - Issuance of random URL-safe signatures with scopes and expiry
//! - Validation with lazy expiry and per-key rate limiting
//! - Single and bulk rotation linking each key to its successor
//! - Read-only projections, filters and rotation lineage
//! - In-memory and PostgreSQL record stores

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use crate::config::AppConfig;
pub use domain::{Clock, DomainError, ManualClock, Scope, SigningKey, SigningKeyRepository, SystemClock};
pub use infrastructure::signing_key::{
    InMemorySigningKeyRepository, KeyGenerator, KeyQueryService, KeyView, NewSigningKey,
    PostgresSigningKeyRepository, RateLimiter, RotateExpiring, RotateOptions, RotatedKey,
    RotationReport, SigningKeyService,
};

use tracing::info;

use infrastructure::storage::{RepositoryFactory, StorageConfig};

/// Create a service over the configured record store with default settings
pub async fn create_service() -> anyhow::Result<SigningKeyService<dyn SigningKeyRepository>> {
    create_service_with_config(&AppConfig::default()).await
}

/// Create a service over the record store and engine settings in `config`
pub async fn create_service_with_config(
    config: &AppConfig,
) -> anyhow::Result<SigningKeyService<dyn SigningKeyRepository>> {
    let settings = config.signing_settings()?;
    let storage = StorageConfig::from_settings(&config.storage)?;
    let repository = RepositoryFactory::create(&storage).await?;

    info!(
        "Signing key service ready: safe_mode={}, rate_limiting={}",
        settings.safe_mode,
        settings.rate_limit.is_enabled()
    );

    Ok(SigningKeyService::new(repository).with_settings(&settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_service_defaults_to_memory() {
        let service = create_service().await.unwrap();

        let signature = service
            .issue(NewSigningKey::new().with_scope("read"))
            .await
            .unwrap();

        service.check_valid(&signature, "read").await.unwrap();
        assert!(service.safe_mode());
    }

    #[tokio::test]
    async fn test_create_service_applies_rate_limits() {
        let mut config = AppConfig::default();
        config.signing.rate_limiting.enabled = true;
        config.signing.rate_limiting.max_requests = 1;

        let service = create_service_with_config(&config).await.unwrap();
        let signature = service.issue(NewSigningKey::new()).await.unwrap();

        service.check_valid(&signature, "read").await.unwrap();
        let result = service.check_valid(&signature, "read").await;

        assert!(matches!(result, Err(DomainError::RateLimitExceeded { .. })));
    }
}
