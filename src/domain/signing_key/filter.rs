//! Record filters shared by queries and bulk rotation

use chrono::{DateTime, Utc};

use super::entity::SigningKey;
use super::scope::Scope;

/// Conjunctive filter over signing key records.
///
/// Every populated field must match. `scopes` requires the record's scope to
/// contain each listed tag; an empty `scopes` does not filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyFilter {
    pub active: Option<bool>,
    pub scopes: Scope,
    pub email: Option<String>,
    pub previous_key: Option<String>,
    pub expires_at_or_before: Option<DateTime<Utc>>,
}

impl KeyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn with_scopes(mut self, scopes: impl Into<Scope>) -> Self {
        self.scopes = scopes.into();
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into().trim().to_lowercase());
        self
    }

    pub fn with_previous_key(mut self, previous_key: impl Into<String>) -> Self {
        self.previous_key = Some(previous_key.into());
        self
    }

    pub fn expiring_at_or_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.expires_at_or_before = Some(cutoff);
        self
    }

    /// True when no criterion is set
    pub fn is_unfiltered(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, key: &SigningKey) -> bool {
        if let Some(active) = self.active {
            if key.is_active() != active {
                return false;
            }
        }

        if !key.scope().contains_all(&self.scopes) {
            return false;
        }

        if let Some(ref email) = self.email {
            if key.email() != Some(email.as_str()) {
                return false;
            }
        }

        if let Some(ref previous_key) = self.previous_key {
            if key.previous_key() != Some(previous_key.as_str()) {
                return false;
            }
        }

        if let Some(cutoff) = self.expires_at_or_before {
            if key.expiration() > cutoff {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn issued_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    fn key(scope: Vec<&str>) -> SigningKey {
        SigningKey::new("sig", issued_at()).with_scope(Scope::from(scope))
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = KeyFilter::new();

        assert!(filter.is_unfiltered());
        assert!(filter.matches(&key(vec![])));
        assert!(filter.matches(&key(vec!["read"])));
    }

    #[test]
    fn test_scope_filter_uses_and_semantics() {
        let filter = KeyFilter::new().with_scopes(vec!["read", "test"]);

        assert!(filter.matches(&key(vec!["read", "test", "write"])));
        assert!(!filter.matches(&key(vec!["read"])));
        assert!(!filter.matches(&key(vec![])));
    }

    #[test]
    fn test_active_and_email_filters() {
        let record = key(vec!["read"]).with_email(Some("a@b.c".into()));

        assert!(KeyFilter::new().with_active(true).matches(&record));
        assert!(!KeyFilter::new().with_active(false).matches(&record));
        assert!(KeyFilter::new().with_email("A@B.C").matches(&record));
        assert!(!KeyFilter::new().with_email("x@y.z").matches(&record));
    }

    #[test]
    fn test_previous_key_filter() {
        let child = key(vec![]).with_previous_key(Some("parent".into()));

        assert!(KeyFilter::new().with_previous_key("parent").matches(&child));
        assert!(!KeyFilter::new().with_previous_key("other").matches(&child));
        assert!(!KeyFilter::new().with_previous_key("parent").matches(&key(vec![])));
    }

    #[test]
    fn test_expiration_cutoff_is_inclusive() {
        let record = key(vec![]).expires_in_hours(1);
        let expiry = issued_at() + Duration::hours(1);

        assert!(KeyFilter::new().expiring_at_or_before(expiry).matches(&record));
        assert!(!KeyFilter::new()
            .expiring_at_or_before(expiry - Duration::seconds(1))
            .matches(&record));
    }
}
