use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Key not found: {signature}")]
    KeyNotFound { signature: String },

    #[error("Key is no longer active: {signature}")]
    KeyInactive { signature: String },

    #[error("Key has expired: {signature}")]
    KeyExpired { signature: String },

    #[error("Key does not match the required scope: {requested}")]
    ScopeMismatch { requested: String },

    #[error("Key has already been rotated: {signature}")]
    AlreadyRotated { signature: String },

    #[error("Too many requests for key {signature}, please try again later")]
    RateLimitExceeded { signature: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("No results found for given parameters")]
    NoResultsFound,

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl DomainError {
    pub fn key_not_found(signature: impl Into<String>) -> Self {
        Self::KeyNotFound {
            signature: signature.into(),
        }
    }

    pub fn key_inactive(signature: impl Into<String>) -> Self {
        Self::KeyInactive {
            signature: signature.into(),
        }
    }

    pub fn key_expired(signature: impl Into<String>) -> Self {
        Self::KeyExpired {
            signature: signature.into(),
        }
    }

    pub fn scope_mismatch(requested: impl Into<String>) -> Self {
        Self::ScopeMismatch {
            requested: requested.into(),
        }
    }

    pub fn already_rotated(signature: impl Into<String>) -> Self {
        Self::AlreadyRotated {
            signature: signature.into(),
        }
    }

    pub fn rate_limit_exceeded(signature: impl Into<String>) -> Self {
        Self::RateLimitExceeded {
            signature: signature.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Whether the error means the key can no longer be used at all
    pub fn is_unusable_key(&self) -> bool {
        matches!(self, Self::KeyInactive { .. } | Self::KeyExpired { .. })
    }

    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::KeyNotFound { .. } => "key_not_found",
            Self::KeyInactive { .. } => "key_inactive",
            Self::KeyExpired { .. } => "key_expired",
            Self::ScopeMismatch { .. } => "scope_mismatch",
            Self::AlreadyRotated { .. } => "already_rotated",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::Validation { .. } => "validation",
            Self::NoResultsFound => "no_results_found",
            Self::Conflict { .. } => "conflict",
            Self::Configuration { .. } => "configuration",
            Self::Internal { .. } => "internal",
            Self::Storage { .. } => "storage",
        }
    }
}
