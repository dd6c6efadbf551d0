//! Engine-level settings

use chrono::Duration;

/// Default number of random bytes per generated signature (about 32 chars)
pub const DEFAULT_BYTE_LENGTH: usize = 24;

/// Per-key rate limit configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled (disabled by default)
    pub enabled: bool,
    /// Maximum validation requests per window
    pub max_requests: u32,
    /// Length of the window
    pub period: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_requests: 10,
            period: Duration::minutes(1),
        }
    }
}

impl RateLimitConfig {
    /// Create a new rate limit configuration (enabled when explicitly created)
    pub fn new(max_requests: u32, period: Duration) -> Self {
        Self {
            enabled: true,
            max_requests,
            period,
        }
    }

    /// Disabled configuration with default limits
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Settings for the key lifecycle engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningSettings {
    /// Random bytes per signature
    pub byte_length: usize,
    /// Blocks rotation of inactive or already-rotated keys
    pub safe_mode: bool,
    pub rate_limit: RateLimitConfig,
}

impl Default for SigningSettings {
    fn default() -> Self {
        Self {
            byte_length: DEFAULT_BYTE_LENGTH,
            safe_mode: true,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = SigningSettings::default();

        assert_eq!(settings.byte_length, 24);
        assert!(settings.safe_mode);
        assert!(!settings.rate_limit.is_enabled());
        assert_eq!(settings.rate_limit.max_requests, 10);
        assert_eq!(settings.rate_limit.period, Duration::minutes(1));
    }

    #[test]
    fn test_explicit_rate_limit_is_enabled() {
        let config = RateLimitConfig::new(2, Duration::seconds(30));

        assert!(config.is_enabled());
        assert_eq!(config.max_requests, 2);
    }
}
