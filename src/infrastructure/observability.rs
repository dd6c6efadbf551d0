//! Metrics recorded by the signing key engine
//!
//! Counters go through the `metrics` facade; installing an exporter is left
//! to the embedding application.

use metrics::counter;

/// Outcome label for a validation call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    NotFound,
    Inactive,
    Expired,
    ScopeMismatch,
    RateLimited,
    Error,
}

impl ValidationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::NotFound => "not_found",
            Self::Inactive => "inactive",
            Self::Expired => "expired",
            Self::ScopeMismatch => "scope_mismatch",
            Self::RateLimited => "rate_limited",
            Self::Error => "error",
        }
    }
}

impl From<&crate::domain::DomainError> for ValidationOutcome {
    fn from(error: &crate::domain::DomainError) -> Self {
        use crate::domain::DomainError;

        match error {
            DomainError::KeyNotFound { .. } => Self::NotFound,
            DomainError::KeyInactive { .. } => Self::Inactive,
            DomainError::KeyExpired { .. } => Self::Expired,
            DomainError::ScopeMismatch { .. } => Self::ScopeMismatch,
            DomainError::RateLimitExceeded { .. } => Self::RateLimited,
            _ => Self::Error,
        }
    }
}

/// Record a newly issued key
pub fn record_key_issued(rotated_from: bool) {
    let labels = [("origin", if rotated_from { "rotation" } else { "issue" }.to_string())];

    counter!("signing_keys_issued_total", &labels).increment(1);
}

/// Record a committed rotation
pub fn record_key_rotated() {
    counter!("signing_keys_rotated_total").increment(1);
}

/// Record the outcome of a validation call
pub fn record_validation(outcome: ValidationOutcome) {
    let labels = [("outcome", outcome.as_str().to_string())];

    counter!("signing_key_validations_total", &labels).increment(1);
}

/// Record a throttled validation call
pub fn record_rate_limited() {
    counter!("signing_key_rate_limited_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;

    #[test]
    fn test_outcome_from_error() {
        assert_eq!(
            ValidationOutcome::from(&DomainError::key_expired("abc")),
            ValidationOutcome::Expired
        );
        assert_eq!(
            ValidationOutcome::from(&DomainError::rate_limit_exceeded("abc")),
            ValidationOutcome::RateLimited
        );
        assert_eq!(
            ValidationOutcome::from(&DomainError::storage("down")),
            ValidationOutcome::Error
        );
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_key_issued(false);
        record_key_rotated();
        record_validation(ValidationOutcome::Valid);
        record_rate_limited();
    }
}
