//! Read-only projections over signing key records

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::signing_key::{
    signature_hint, KeyFilter, KeyState, Scope, SigningKey, SigningKeyRepository,
};
use crate::domain::DomainError;

/// External-facing shape of a key record.
///
/// Rate-limit counters are internal and never projected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyView {
    pub signature: String,
    pub email: Option<String>,
    pub scope: Scope,
    pub active: bool,
    pub timestamp: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
    pub previous_key: Option<String>,
    pub rotated: bool,
}

impl KeyView {
    pub fn state_at(&self, now: DateTime<Utc>) -> KeyState {
        KeyState::derive(self.active, self.rotated, self.expiration, now)
    }
}

impl From<&SigningKey> for KeyView {
    fn from(key: &SigningKey) -> Self {
        Self {
            signature: key.signature().to_string(),
            email: key.email().map(String::from),
            scope: key.scope().clone(),
            active: key.is_active(),
            timestamp: key.timestamp(),
            expiration: key.expiration(),
            previous_key: key.previous_key().map(String::from),
            rotated: key.is_rotated(),
        }
    }
}

impl From<SigningKey> for KeyView {
    fn from(key: SigningKey) -> Self {
        Self::from(&key)
    }
}

/// Query service over a signing key repository
#[derive(Debug)]
pub struct KeyQueryService<R>
where
    R: SigningKeyRepository + ?Sized,
{
    repository: Arc<R>,
}

impl<R> Clone for KeyQueryService<R>
where
    R: SigningKeyRepository + ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
        }
    }
}

impl<R> KeyQueryService<R>
where
    R: SigningKeyRepository + ?Sized,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Projection of a single key, `None` if it does not exist
    pub async fn get_key(&self, signature: &str) -> Result<Option<KeyView>, DomainError> {
        Ok(self.repository.get(signature).await?.map(KeyView::from))
    }

    /// Every stored key, oldest first; empty when the store is empty
    pub async fn get_all(&self) -> Result<Vec<KeyView>, DomainError> {
        let keys = self.repository.list().await?;
        Ok(keys.iter().map(KeyView::from).collect())
    }

    /// Keys matching the filter; `NoResultsFound` when nothing matches
    pub async fn query(&self, filter: &KeyFilter) -> Result<Vec<KeyView>, DomainError> {
        let keys = self.repository.find(filter).await?;

        if keys.is_empty() {
            return Err(DomainError::NoResultsFound);
        }

        Ok(keys.iter().map(KeyView::from).collect())
    }

    /// Keys rotated directly from `signature`
    pub async fn successors(&self, signature: &str) -> Result<Vec<KeyView>, DomainError> {
        if !self.repository.exists(signature).await? {
            return Err(DomainError::key_not_found(signature));
        }

        let children = self
            .repository
            .find(&KeyFilter::new().with_previous_key(signature))
            .await?;

        Ok(children.iter().map(KeyView::from).collect())
    }

    /// Rotation chain ending at `signature`, root first
    pub async fn lineage(&self, signature: &str) -> Result<Vec<KeyView>, DomainError> {
        let mut current = self
            .repository
            .get(signature)
            .await?
            .ok_or_else(|| DomainError::key_not_found(signature))?;

        let mut seen = HashSet::from([current.signature().to_string()]);
        let mut chain = vec![KeyView::from(&current)];

        while let Some(previous) = current.previous_key().map(String::from) {
            if !seen.insert(previous.clone()) {
                warn!(
                    "Rotation chain loops back: signature={}",
                    signature_hint(&previous)
                );
                break;
            }

            match self.repository.get(&previous).await? {
                Some(parent) => {
                    chain.push(KeyView::from(&parent));
                    current = parent;
                }
                None => break,
            }
        }

        chain.reverse();
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::signing_key::InMemorySigningKeyRepository;
    use chrono::{Duration, TimeZone};

    fn issued_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 8, 0, 0).unwrap()
    }

    async fn seeded() -> KeyQueryService<InMemorySigningKeyRepository> {
        let repo = InMemorySigningKeyRepository::new();

        repo.insert(
            SigningKey::new("root", issued_at())
                .with_scope(Scope::from(vec!["read", "test"]))
                .with_email(Some("owner@example.com".into()))
                .with_rotated(true)
                .with_active(false),
        )
        .await
        .unwrap();
        repo.insert(
            SigningKey::new("child", issued_at() + Duration::hours(1))
                .with_scope(Scope::from("read"))
                .with_previous_key(Some("root".into())),
        )
        .await
        .unwrap();
        repo.insert(
            SigningKey::new("grandchild", issued_at() + Duration::hours(2))
                .with_previous_key(Some("child".into())),
        )
        .await
        .unwrap();

        KeyQueryService::new(Arc::new(repo))
    }

    #[tokio::test]
    async fn test_get_key_projection() {
        let queries = seeded().await;

        let view = queries.get_key("root").await.unwrap().unwrap();
        assert_eq!(view.email.as_deref(), Some("owner@example.com"));
        assert!(view.rotated);
        assert_eq!(view.state_at(issued_at()), KeyState::Rotated);

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("request_count").is_none());
        assert!(json.get("last_request_time").is_none());

        assert!(queries.get_key("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_all_on_empty_store() {
        let queries = KeyQueryService::new(Arc::new(InMemorySigningKeyRepository::new()));

        let all = queries.get_all().await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_query_by_scope() {
        let queries = seeded().await;

        let tested = queries
            .query(&KeyFilter::new().with_scopes("test"))
            .await
            .unwrap();
        assert_eq!(tested.len(), 1);
        assert_eq!(tested[0].signature, "root");

        let active = queries
            .query(&KeyFilter::new().with_active(true))
            .await
            .unwrap();
        assert_eq!(active.len(), 2);
    }

    #[tokio::test]
    async fn test_query_without_matches() {
        let queries = seeded().await;

        let result = queries.query(&KeyFilter::new().with_scopes("admin")).await;
        assert!(matches!(result, Err(DomainError::NoResultsFound)));
    }

    #[tokio::test]
    async fn test_successors() {
        let queries = seeded().await;

        let children = queries.successors("root").await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].signature, "child");

        assert!(queries.successors("grandchild").await.unwrap().is_empty());
        assert!(matches!(
            queries.successors("missing").await,
            Err(DomainError::KeyNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_lineage_is_root_first() {
        let queries = seeded().await;

        let chain: Vec<String> = queries
            .lineage("grandchild")
            .await
            .unwrap()
            .into_iter()
            .map(|view| view.signature)
            .collect();

        assert_eq!(chain, vec!["root", "child", "grandchild"]);
        assert_eq!(queries.lineage("root").await.unwrap().len(), 1);
    }
}
