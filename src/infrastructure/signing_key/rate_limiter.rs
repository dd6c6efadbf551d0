//! Rate limiter implementation
//!
//! Per-key rolling window limiting for validation calls. Counters live on the
//! key record itself and are updated through the store's atomic
//! read-modify-write, so concurrent callers never lose an increment.

use std::future::Future;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::domain::signing_key::{
    signature_hint, RateLimitConfig, SigningKey, SigningKeyRepository,
};
use crate::domain::DomainError;
use crate::infrastructure::observability;

/// Rate limiter for signing key validation
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config }
    }

    /// Create a passthrough limiter
    pub fn disabled() -> Self {
        Self::new(RateLimitConfig::disabled())
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// Count one request against the key's window.
    ///
    /// Unknown signatures are not limited. A throttled request persists
    /// nothing and fails with `RateLimitExceeded`.
    pub async fn check_and_record<R>(
        &self,
        repository: &R,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError>
    where
        R: SigningKeyRepository + ?Sized,
    {
        if !self.is_enabled() {
            return Ok(());
        }

        let config = self.config.clone();
        let mut register = move |key: &mut SigningKey| key.register_request(now, &config);

        match repository.update_with(signature, &mut register).await {
            Ok(Some(key)) => {
                debug!(
                    "Request counted: signature={}, count={}/{}",
                    signature_hint(signature),
                    key.request_count(),
                    self.config.max_requests
                );
                Ok(())
            }
            Ok(None) => {
                debug!(
                    "Rate limit skipped for unknown key: signature={}",
                    signature_hint(signature)
                );
                Ok(())
            }
            Err(e @ DomainError::RateLimitExceeded { .. }) => {
                warn!("Rate limit exceeded: signature={}", signature_hint(signature));
                observability::record_rate_limited();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Run `inner` only if the request is admitted.
    ///
    /// When limiting is disabled this is a plain passthrough.
    pub async fn guard<R, F, Fut, T>(
        &self,
        repository: &R,
        signature: &str,
        now: DateTime<Utc>,
        inner: F,
    ) -> Result<T, DomainError>
    where
        R: SigningKeyRepository + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        self.check_and_record(repository, signature, now).await?;
        inner().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::signing_key::InMemorySigningKeyRepository;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    async fn repo_with_key(signature: &str) -> InMemorySigningKeyRepository {
        let repo = InMemorySigningKeyRepository::new();
        repo.insert(SigningKey::new(signature, start())).await.unwrap();
        repo
    }

    #[tokio::test]
    async fn test_rate_limiter_blocks_over_limit() {
        let repo = repo_with_key("key1").await;
        let limiter = RateLimiter::new(RateLimitConfig::new(2, Duration::minutes(1)));
        let now = start() + Duration::seconds(1);

        limiter.check_and_record(&repo, "key1", now).await.unwrap();
        limiter.check_and_record(&repo, "key1", now).await.unwrap();

        let result = limiter.check_and_record(&repo, "key1", now).await;
        assert!(matches!(result, Err(DomainError::RateLimitExceeded { .. })));

        let stored = repo.get("key1").await.unwrap().unwrap();
        assert_eq!(stored.request_count(), 2);
    }

    #[tokio::test]
    async fn test_rate_limiter_window_rollover() {
        let repo = repo_with_key("key1").await;
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::minutes(1)));
        let now = start() + Duration::seconds(1);

        limiter.check_and_record(&repo, "key1", now).await.unwrap();
        assert!(limiter.check_and_record(&repo, "key1", now).await.is_err());

        let later = now + Duration::minutes(1);
        limiter.check_and_record(&repo, "key1", later).await.unwrap();

        let stored = repo.get("key1").await.unwrap().unwrap();
        assert_eq!(stored.request_count(), 1);
        assert_eq!(stored.last_request_time(), later);
    }

    #[tokio::test]
    async fn test_rate_limiter_different_keys() {
        let repo = repo_with_key("key1").await;
        repo.insert(SigningKey::new("key2", start())).await.unwrap();
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::minutes(1)));
        let now = start() + Duration::seconds(1);

        limiter.check_and_record(&repo, "key1", now).await.unwrap();

        // Different key should still be allowed
        assert!(limiter.check_and_record(&repo, "key2", now).await.is_ok());

        // Same key should be blocked
        assert!(limiter.check_and_record(&repo, "key1", now).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_key_is_not_limited() {
        let repo = InMemorySigningKeyRepository::new();
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::minutes(1)));

        assert!(limiter.check_and_record(&repo, "missing", start()).await.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_limiter_writes_nothing() {
        let repo = repo_with_key("key1").await;
        let limiter = RateLimiter::disabled();

        for _ in 0..100 {
            limiter.check_and_record(&repo, "key1", start()).await.unwrap();
        }

        let stored = repo.get("key1").await.unwrap().unwrap();
        assert_eq!(stored.request_count(), 0);
        assert_eq!(stored.last_request_time(), start());
    }

    #[tokio::test]
    async fn test_guard_skips_inner_when_throttled() {
        let repo = repo_with_key("key1").await;
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::minutes(1)));
        let calls = std::sync::atomic::AtomicUsize::new(0);

        for _ in 0..3 {
            let _ = limiter
                .guard(&repo, "key1", start(), || async {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(())
                })
                .await;
        }

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
