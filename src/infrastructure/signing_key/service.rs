//! Signing key service
//!
//! Lifecycle engine for signing keys: issuance, validation, expiry and
//! rotation. Every public operation is one bounded unit against the store.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::clock::{Clock, SystemClock};
use crate::domain::signing_key::{
    never_expires, signature_hint, validate_expiration_hours, KeyFilter, KeyPatch,
    RotationGuard, Scope, SigningKey, SigningKeyRepository, SigningSettings,
};
use crate::domain::DomainError;
use crate::infrastructure::observability::{self, ValidationOutcome};

use super::generator::KeyGenerator;
use super::query::KeyQueryService;
use super::rate_limiter::RateLimiter;

/// Attempts at drawing an unused signature before giving up
const MAX_SIGNATURE_ATTEMPTS: usize = 32;

/// Parameters for issuing a new key
#[derive(Debug, Clone, PartialEq)]
pub struct NewSigningKey {
    pub scope: Scope,
    /// Lifetime in hours (0 = never expires)
    pub expiration_hours: u32,
    pub active: bool,
    pub email: Option<String>,
    pub previous_key: Option<String>,
}

impl Default for NewSigningKey {
    fn default() -> Self {
        Self {
            scope: Scope::wildcard(),
            expiration_hours: 0,
            active: true,
            email: None,
            previous_key: None,
        }
    }
}

impl NewSigningKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scope(mut self, scope: impl Into<Scope>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn expires_in_hours(mut self, hours: u32) -> Self {
        self.expiration_hours = hours;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_previous_key(mut self, previous_key: impl Into<String>) -> Self {
        self.previous_key = Some(previous_key.into());
        self
    }
}

/// Overrides applied to a rotation successor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RotateOptions {
    /// Successor lifetime; inherited from the predecessor when unset
    pub expiration_hours: Option<u32>,
    /// Successor scope; inherited from the predecessor when unset
    pub overwrite_scope: Option<Scope>,
}

impl RotateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expires_in_hours(mut self, hours: u32) -> Self {
        self.expiration_hours = Some(hours);
        self
    }

    pub fn with_scope(mut self, scope: impl Into<Scope>) -> Self {
        self.overwrite_scope = Some(scope.into());
        self
    }
}

/// Selection for bulk rotation of keys nearing expiry
#[derive(Debug, Clone, PartialEq)]
pub struct RotateExpiring {
    /// Rotate keys expiring within this many hours from now
    pub within_hours: u32,
    /// Every listed tag must be in the key's scope
    pub scope: Scope,
    /// Select keys whose `active` flag equals this value
    pub only_active: bool,
    pub overwrite_scope: Option<Scope>,
}

impl Default for RotateExpiring {
    fn default() -> Self {
        Self {
            within_hours: 1,
            scope: Scope::wildcard(),
            only_active: true,
            overwrite_scope: None,
        }
    }
}

impl RotateExpiring {
    pub fn within_hours(hours: u32) -> Self {
        Self {
            within_hours: hours,
            ..Default::default()
        }
    }

    pub fn with_scope(mut self, scope: impl Into<Scope>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_only_active(mut self, only_active: bool) -> Self {
        self.only_active = only_active;
        self
    }

    pub fn with_overwrite_scope(mut self, scope: impl Into<Scope>) -> Self {
        self.overwrite_scope = Some(scope.into());
        self
    }
}

/// A predecessor and the successor that replaced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotatedKey {
    pub old_signature: String,
    pub new_signature: String,
}

/// A key that could not be rotated during a collecting bulk rotation
#[derive(Debug)]
pub struct RotationFailure {
    pub signature: String,
    pub error: DomainError,
}

/// Outcome of a bulk rotation that keeps going past failures
#[derive(Debug, Default)]
pub struct RotationReport {
    pub rotated: Vec<RotatedKey>,
    pub failed: Vec<RotationFailure>,
}

impl RotationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Signing key service
pub struct SigningKeyService<R>
where
    R: SigningKeyRepository + ?Sized,
{
    repository: Arc<R>,
    generator: KeyGenerator,
    rate_limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    safe_mode: bool,
}

impl<R> fmt::Debug for SigningKeyService<R>
where
    R: SigningKeyRepository + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyService")
            .field("repository", &self.repository)
            .field("generator", &self.generator)
            .field("rate_limiter", &self.rate_limiter)
            .field("safe_mode", &self.safe_mode)
            .finish_non_exhaustive()
    }
}

impl<R> SigningKeyService<R>
where
    R: SigningKeyRepository + ?Sized,
{
    /// Create a service with default settings and the system clock
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            generator: KeyGenerator::default(),
            rate_limiter: RateLimiter::disabled(),
            clock: Arc::new(SystemClock),
            safe_mode: true,
        }
    }

    pub fn with_generator(mut self, generator: KeyGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_safe_mode(mut self, safe_mode: bool) -> Self {
        self.safe_mode = safe_mode;
        self
    }

    /// Apply engine settings (signature size, safe mode, rate limiting)
    pub fn with_settings(self, settings: &SigningSettings) -> Self {
        self.with_generator(KeyGenerator::new(settings.byte_length))
            .with_rate_limiter(RateLimiter::new(settings.rate_limit.clone()))
            .with_safe_mode(settings.safe_mode)
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub fn safe_mode(&self) -> bool {
        self.safe_mode
    }

    /// Read-only projections over the same store
    pub fn queries(&self) -> KeyQueryService<R> {
        KeyQueryService::new(Arc::clone(&self.repository))
    }

    /// Issue a new key and return its signature
    pub async fn issue(&self, request: NewSigningKey) -> Result<String, DomainError> {
        validate_expiration_hours(request.expiration_hours)?;
        let issued_at = self.clock.now();

        for attempt in 1..=MAX_SIGNATURE_ATTEMPTS {
            let key = SigningKey::new(self.generator.generate(), issued_at)
                .with_scope(request.scope.clone())
                .expires_in_hours(request.expiration_hours)
                .with_active(request.active)
                .with_email(request.email.clone())
                .with_previous_key(request.previous_key.clone());

            match self.repository.insert(key).await {
                Ok(created) => {
                    info!(
                        "Signing key issued: signature={}, scope={}, expiration_hours={}",
                        signature_hint(created.signature()),
                        created.scope(),
                        created.expiration_hours()
                    );
                    observability::record_key_issued(created.previous_key().is_some());
                    return Ok(created.signature().to_string());
                }
                Err(DomainError::Conflict { .. }) => {
                    debug!("Signature collision, regenerating: attempt={}", attempt);
                }
                Err(e) => return Err(e),
            }
        }

        Err(DomainError::internal(format!(
            "No unused signature found after {} attempts",
            MAX_SIGNATURE_ATTEMPTS
        )))
    }

    /// Validate a key for the requested scope, subject to rate limiting.
    ///
    /// A throttled call fails with `RateLimitExceeded` before the key is
    /// inspected, so it never triggers the expiry side effect.
    pub async fn check_valid(
        &self,
        signature: &str,
        scope: impl Into<Scope>,
    ) -> Result<(), DomainError> {
        let requested = scope.into();
        let now = self.clock.now();

        let result = self
            .rate_limiter
            .guard(self.repository.as_ref(), signature, now, || {
                self.check_unthrottled(signature, &requested, now)
            })
            .await;

        let outcome = match &result {
            Ok(()) => ValidationOutcome::Valid,
            Err(e) => ValidationOutcome::from(e),
        };

        debug!(
            "Key validation: signature={}, outcome={}",
            signature_hint(signature),
            outcome.as_str()
        );
        observability::record_validation(outcome);

        result
    }

    async fn check_unthrottled(
        &self,
        signature: &str,
        requested: &Scope,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let key = self
            .repository
            .get(signature)
            .await?
            .ok_or_else(|| DomainError::key_not_found(signature))?;

        if !key.is_active() {
            return Err(DomainError::key_inactive(signature));
        }

        if key.is_expired_at(now) {
            warn!(
                "Signing key expired, deactivating: signature={}",
                signature_hint(signature)
            );
            self.repository
                .update_fields(signature, KeyPatch::deactivate())
                .await?;
            return Err(DomainError::key_expired(signature));
        }

        if !key.scope().permits(requested) {
            return Err(DomainError::scope_mismatch(requested.to_string()));
        }

        Ok(())
    }

    /// Disable a key; disabling an inactive key is not an error
    pub async fn deactivate(&self, signature: &str) -> Result<(), DomainError> {
        info!(
            "Deactivating signing key: signature={}",
            signature_hint(signature)
        );

        self.repository
            .update_fields(signature, KeyPatch::deactivate())
            .await?
            .ok_or_else(|| DomainError::key_not_found(signature))?;

        Ok(())
    }

    /// Replace a key with a newly issued successor and return its signature.
    ///
    /// The predecessor is retired and the successor inserted as one unit;
    /// on failure neither record changes.
    pub async fn rotate(
        &self,
        signature: &str,
        options: RotateOptions,
    ) -> Result<String, DomainError> {
        info!("Rotating signing key: signature={}", signature_hint(signature));

        if let Some(hours) = options.expiration_hours {
            validate_expiration_hours(hours)?;
        }

        let guard = RotationGuard::for_safe_mode(self.safe_mode);

        let current = self
            .repository
            .get(signature)
            .await?
            .ok_or_else(|| DomainError::key_not_found(signature))?;

        guard.check(&current)?;

        let expiration_hours = options
            .expiration_hours
            .unwrap_or_else(|| current.expiration_hours());
        let scope = options
            .overwrite_scope
            .unwrap_or_else(|| current.scope().clone());
        let issued_at = self.clock.now();

        for attempt in 1..=MAX_SIGNATURE_ATTEMPTS {
            let successor = SigningKey::new(self.generator.generate(), issued_at)
                .with_scope(scope.clone())
                .expires_in_hours(expiration_hours)
                .with_email(current.email().map(String::from))
                .with_previous_key(Some(signature.to_string()));

            match self
                .repository
                .commit_rotation(signature, successor, guard)
                .await
            {
                Ok(created) => {
                    info!(
                        "Signing key rotated: old={}, new={}",
                        signature_hint(signature),
                        signature_hint(created.signature())
                    );
                    observability::record_key_rotated();
                    observability::record_key_issued(true);
                    return Ok(created.signature().to_string());
                }
                Err(DomainError::Conflict { .. }) => {
                    debug!(
                        "Successor signature collision, regenerating: attempt={}",
                        attempt
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(DomainError::internal(format!(
            "No unused successor signature found after {} attempts",
            MAX_SIGNATURE_ATTEMPTS
        )))
    }

    async fn expiring_signatures(
        &self,
        selection: &RotateExpiring,
    ) -> Result<Vec<String>, DomainError> {
        let cutoff = self
            .clock
            .now()
            .checked_add_signed(Duration::hours(i64::from(selection.within_hours)))
            .unwrap_or_else(never_expires);

        let filter = KeyFilter::new()
            .expiring_at_or_before(cutoff)
            .with_active(selection.only_active)
            .with_scopes(selection.scope.clone());

        let signatures = self.repository.select_signatures(&filter).await?;

        info!(
            "Rotating expiring keys: count={}, within_hours={}",
            signatures.len(),
            selection.within_hours
        );

        Ok(signatures)
    }

    /// Rotate every selected key, stopping at the first failure.
    ///
    /// Rotations committed before the failure stay committed.
    pub async fn rotate_expiring(
        &self,
        selection: RotateExpiring,
    ) -> Result<Vec<RotatedKey>, DomainError> {
        let signatures = self.expiring_signatures(&selection).await?;
        let options = RotateOptions {
            expiration_hours: None,
            overwrite_scope: selection.overwrite_scope.clone(),
        };

        let mut rotated = Vec::with_capacity(signatures.len());

        for old_signature in signatures {
            let new_signature = self.rotate(&old_signature, options.clone()).await?;
            rotated.push(RotatedKey {
                old_signature,
                new_signature,
            });
        }

        Ok(rotated)
    }

    /// Rotate every selected key, recording failures instead of stopping
    pub async fn rotate_expiring_collecting(
        &self,
        selection: RotateExpiring,
    ) -> Result<RotationReport, DomainError> {
        let signatures = self.expiring_signatures(&selection).await?;
        let options = RotateOptions {
            expiration_hours: None,
            overwrite_scope: selection.overwrite_scope.clone(),
        };

        let mut report = RotationReport::default();

        for old_signature in signatures {
            match self.rotate(&old_signature, options.clone()).await {
                Ok(new_signature) => report.rotated.push(RotatedKey {
                    old_signature,
                    new_signature,
                }),
                Err(error) => {
                    warn!(
                        "Rotation failed: signature={}, error={}",
                        signature_hint(&old_signature),
                        error
                    );
                    report.failed.push(RotationFailure {
                        signature: old_signature,
                        error,
                    });
                }
            }
        }

        Ok(report)
    }
}
