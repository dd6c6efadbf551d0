//! Signing key record store trait

use async_trait::async_trait;
use std::fmt::Debug;

use super::entity::{KeyPatch, SigningKey};
use super::filter::KeyFilter;
use crate::domain::DomainError;

/// In-place change applied to a single record inside a store's atomic
/// read-modify-write. Returning an error discards the change.
pub type KeyMutation<'a> = &'a mut (dyn FnMut(&mut SigningKey) -> Result<(), DomainError> + Send);

/// Checks a rotation predecessor must pass before it is retired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationGuard {
    /// Refuse already-rotated and inactive predecessors
    Safe,
    /// Rotate regardless of the predecessor's flags
    Unchecked,
}

impl RotationGuard {
    pub fn for_safe_mode(safe_mode: bool) -> Self {
        if safe_mode { Self::Safe } else { Self::Unchecked }
    }

    pub fn check(&self, predecessor: &SigningKey) -> Result<(), DomainError> {
        if *self == Self::Unchecked {
            return Ok(());
        }

        if predecessor.is_rotated() {
            return Err(DomainError::already_rotated(predecessor.signature()));
        }

        if !predecessor.is_active() {
            return Err(DomainError::key_inactive(predecessor.signature()));
        }

        Ok(())
    }
}

/// Persistent store for signing key records.
///
/// Each method is a single atomic unit against the store: concurrent callers
/// touching the same signature must never lose an update.
#[async_trait]
pub trait SigningKeyRepository: Send + Sync + Debug {
    /// Get a key by its signature
    async fn get(&self, signature: &str) -> Result<Option<SigningKey>, DomainError>;

    /// Check if a signature is already taken
    async fn exists(&self, signature: &str) -> Result<bool, DomainError> {
        Ok(self.get(signature).await?.is_some())
    }

    /// Insert a new key; `Conflict` if the signature is taken
    async fn insert(&self, key: SigningKey) -> Result<SigningKey, DomainError>;

    /// Atomically read, mutate and write back one record.
    ///
    /// Returns `None` without calling `mutation` when the key does not exist.
    async fn update_with(
        &self,
        signature: &str,
        mutation: KeyMutation<'_>,
    ) -> Result<Option<SigningKey>, DomainError>;

    /// Atomically apply a partial update
    async fn update_fields(
        &self,
        signature: &str,
        patch: KeyPatch,
    ) -> Result<Option<SigningKey>, DomainError> {
        let mut apply = move |key: &mut SigningKey| {
            key.apply(&patch);
            Ok::<(), DomainError>(())
        };

        self.update_with(signature, &mut apply).await
    }

    /// Retire `predecessor` and insert `successor` as one unit.
    ///
    /// The guard is re-checked against the stored predecessor. On any error
    /// neither record is changed.
    async fn commit_rotation(
        &self,
        predecessor: &str,
        successor: SigningKey,
        guard: RotationGuard,
    ) -> Result<SigningKey, DomainError>;

    /// Keys matching the filter, oldest first
    async fn find(&self, filter: &KeyFilter) -> Result<Vec<SigningKey>, DomainError>;

    /// Signatures of keys matching the filter, oldest first
    async fn select_signatures(&self, filter: &KeyFilter) -> Result<Vec<String>, DomainError> {
        Ok(self
            .find(filter)
            .await?
            .into_iter()
            .map(|key| key.signature().to_string())
            .collect())
    }

    /// All keys, oldest first
    async fn list(&self) -> Result<Vec<SigningKey>, DomainError> {
        self.find(&KeyFilter::default()).await
    }
}
