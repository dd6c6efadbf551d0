//! In-memory signing key repository implementation

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::signing_key::{
    KeyFilter, KeyMutation, RotationGuard, SigningKey, SigningKeyRepository,
};
use crate::domain::DomainError;

#[derive(Debug, Default)]
struct KeyTable {
    keys: HashMap<String, SigningKey>,
    /// previous_key -> signatures rotated from it
    children: HashMap<String, BTreeSet<String>>,
}

impl KeyTable {
    fn insert(&mut self, key: SigningKey) -> Result<(), DomainError> {
        let signature = key.signature().to_string();

        if self.keys.contains_key(&signature) {
            return Err(DomainError::conflict(format!(
                "Signing key '{}' already exists",
                signature
            )));
        }

        if let Some(parent) = key.previous_key() {
            self.children
                .entry(parent.to_string())
                .or_default()
                .insert(signature.clone());
        }

        self.keys.insert(signature, key);
        Ok(())
    }
}

/// In-memory implementation of SigningKeyRepository
#[derive(Debug, Default)]
pub struct InMemorySigningKeyRepository {
    table: Arc<RwLock<KeyTable>>,
}

impl InMemorySigningKeyRepository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.table.read().await.keys.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn sorted(mut keys: Vec<SigningKey>) -> Vec<SigningKey> {
        keys.sort_by(|a, b| {
            a.timestamp()
                .cmp(&b.timestamp())
                .then_with(|| a.signature().cmp(b.signature()))
        });
        keys
    }
}

#[async_trait]
impl SigningKeyRepository for InMemorySigningKeyRepository {
    async fn get(&self, signature: &str) -> Result<Option<SigningKey>, DomainError> {
        let table = self.table.read().await;
        Ok(table.keys.get(signature).cloned())
    }

    async fn exists(&self, signature: &str) -> Result<bool, DomainError> {
        let table = self.table.read().await;
        Ok(table.keys.contains_key(signature))
    }

    async fn insert(&self, key: SigningKey) -> Result<SigningKey, DomainError> {
        let mut table = self.table.write().await;
        table.insert(key.clone())?;
        Ok(key)
    }

    async fn update_with(
        &self,
        signature: &str,
        mutation: KeyMutation<'_>,
    ) -> Result<Option<SigningKey>, DomainError> {
        let mut table = self.table.write().await;

        let Some(stored) = table.keys.get_mut(signature) else {
            return Ok(None);
        };

        // Mutate a copy so a failed mutation leaves the record untouched
        let mut updated = stored.clone();
        mutation(&mut updated)?;
        *stored = updated.clone();

        Ok(Some(updated))
    }

    async fn commit_rotation(
        &self,
        predecessor: &str,
        successor: SigningKey,
        guard: RotationGuard,
    ) -> Result<SigningKey, DomainError> {
        let mut table = self.table.write().await;

        let mut retired = table
            .keys
            .get(predecessor)
            .cloned()
            .ok_or_else(|| DomainError::key_not_found(predecessor))?;

        guard.check(&retired)?;
        retired.mark_rotated();

        table.insert(successor.clone())?;
        table.keys.insert(predecessor.to_string(), retired);

        Ok(successor)
    }

    async fn find(&self, filter: &KeyFilter) -> Result<Vec<SigningKey>, DomainError> {
        let table = self.table.read().await;

        let result: Vec<SigningKey> = match filter.previous_key {
            Some(ref parent) => table
                .children
                .get(parent)
                .into_iter()
                .flatten()
                .filter_map(|signature| table.keys.get(signature))
                .filter(|key| filter.matches(key))
                .cloned()
                .collect(),
            None => table
                .keys
                .values()
                .filter(|key| filter.matches(key))
                .cloned()
                .collect(),
        };

        Ok(Self::sorted(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signing_key::{KeyPatch, Scope};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn issued_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
    }

    fn create_test_key(signature: &str) -> SigningKey {
        SigningKey::new(signature, issued_at())
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = InMemorySigningKeyRepository::new();
        let key = create_test_key("sig-1").with_scope(Scope::from("read"));

        repo.insert(key.clone()).await.unwrap();

        let retrieved = repo.get("sig-1").await.unwrap();
        assert_eq!(retrieved, Some(key));
        assert!(repo.exists("sig-1").await.unwrap());
        assert!(!repo.exists("sig-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_duplicate_signature() {
        let repo = InMemorySigningKeyRepository::new();

        repo.insert(create_test_key("sig-1")).await.unwrap();
        let result = repo.insert(create_test_key("sig-1")).await;

        assert!(matches!(result, Err(DomainError::Conflict { .. })));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_fields() {
        let repo = InMemorySigningKeyRepository::new();
        repo.insert(create_test_key("sig-1")).await.unwrap();

        let updated = repo
            .update_fields("sig-1", KeyPatch::deactivate())
            .await
            .unwrap()
            .unwrap();
        assert!(!updated.is_active());
        assert!(!repo.get("sig-1").await.unwrap().unwrap().is_active());

        let missing = repo.update_fields("nope", KeyPatch::deactivate()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_failed_mutation_is_discarded() {
        let repo = InMemorySigningKeyRepository::new();
        repo.insert(create_test_key("sig-1")).await.unwrap();

        let mut failing = |key: &mut SigningKey| -> Result<(), DomainError> {
            key.deactivate();
            Err(DomainError::internal("boom"))
        };
        let result = repo.update_with("sig-1", &mut failing).await;

        assert!(result.is_err());
        assert!(repo.get("sig-1").await.unwrap().unwrap().is_active());
    }

    #[tokio::test]
    async fn test_commit_rotation() {
        let repo = InMemorySigningKeyRepository::new();
        repo.insert(create_test_key("old")).await.unwrap();

        let successor = create_test_key("new").with_previous_key(Some("old".into()));
        repo.commit_rotation("old", successor, RotationGuard::Safe)
            .await
            .unwrap();

        let old = repo.get("old").await.unwrap().unwrap();
        assert!(old.is_rotated());
        assert!(!old.is_active());

        let children = repo
            .find(&KeyFilter::new().with_previous_key("old"))
            .await
            .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].signature(), "new");
    }

    #[tokio::test]
    async fn test_commit_rotation_is_all_or_nothing() {
        let repo = InMemorySigningKeyRepository::new();
        repo.insert(create_test_key("old")).await.unwrap();
        repo.insert(create_test_key("taken")).await.unwrap();

        // Successor collides with an existing signature
        let successor = create_test_key("taken").with_previous_key(Some("old".into()));
        let result = repo.commit_rotation("old", successor, RotationGuard::Safe).await;
        assert!(matches!(result, Err(DomainError::Conflict { .. })));

        let old = repo.get("old").await.unwrap().unwrap();
        assert!(!old.is_rotated());
        assert!(old.is_active());
    }

    #[tokio::test]
    async fn test_commit_rotation_rechecks_guard() {
        let repo = InMemorySigningKeyRepository::new();
        repo.insert(create_test_key("old").with_active(false)).await.unwrap();

        let successor = create_test_key("new").with_previous_key(Some("old".into()));
        let result = repo
            .commit_rotation("old", successor.clone(), RotationGuard::Safe)
            .await;
        assert!(matches!(result, Err(DomainError::KeyInactive { .. })));
        assert!(!repo.exists("new").await.unwrap());

        repo.commit_rotation("old", successor, RotationGuard::Unchecked)
            .await
            .unwrap();
        assert!(repo.exists("new").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_by_scope_and_expiration() {
        let repo = InMemorySigningKeyRepository::new();

        let a = create_test_key("a")
            .with_scope(Scope::from(vec!["read", "test"]))
            .expires_in_hours(1);
        let b = create_test_key("b")
            .with_scope(Scope::from("read"))
            .expires_in_hours(48);
        repo.insert(a).await.unwrap();
        repo.insert(b).await.unwrap();

        let test_scoped = repo
            .find(&KeyFilter::new().with_scopes("test"))
            .await
            .unwrap();
        assert_eq!(test_scoped.len(), 1);
        assert_eq!(test_scoped[0].signature(), "a");

        let expiring = repo
            .select_signatures(
                &KeyFilter::new().expiring_at_or_before(issued_at() + Duration::hours(2)),
            )
            .await
            .unwrap();
        assert_eq!(expiring, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_creation() {
        let repo = InMemorySigningKeyRepository::new();

        repo.insert(SigningKey::new("z", issued_at())).await.unwrap();
        repo.insert(SigningKey::new("y", issued_at() + Duration::seconds(1)))
            .await
            .unwrap();
        repo.insert(SigningKey::new("a", issued_at())).await.unwrap();

        let all: Vec<String> = repo
            .list()
            .await
            .unwrap()
            .iter()
            .map(|k| k.signature().to_string())
            .collect();
        assert_eq!(all, vec!["a", "z", "y"]);
    }
}
