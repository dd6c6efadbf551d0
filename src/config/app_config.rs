use chrono::Duration;
use serde::Deserialize;

use crate::domain::signing_key::{RateLimitConfig, SigningSettings, DEFAULT_BYTE_LENGTH};
use crate::domain::DomainError;

/// Environment variable prefix for overrides, e.g. `SIGNING_KEYS__SIGNING__SAFE_MODE`
pub const ENV_PREFIX: &str = "SIGNING_KEYS";

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub signing: SigningConfig,
    pub storage: StorageBackendConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Random bytes per signature
    pub byte_length: usize,
    pub safe_mode: bool,
    pub rate_limiting: RateLimitingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    pub enabled: bool,
    pub max_requests: u32,
    pub period_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageBackendConfig {
    /// `memory` or `postgres`
    pub backend: String,
    /// Connection URL; falls back to `DATABASE_URL`
    pub url: Option<String>,
    pub max_connections: u32,
    /// Apply schema migrations when connecting
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            byte_length: DEFAULT_BYTE_LENGTH,
            safe_mode: true,
            rate_limiting: RateLimitingConfig::default(),
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_requests: 10,
            period_secs: 60,
        }
    }
}

impl Default for StorageBackendConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            url: None,
            max_connections: 10,
            auto_migrate: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Engine settings derived from the `signing` section
    pub fn signing_settings(&self) -> Result<SigningSettings, DomainError> {
        Ok(SigningSettings {
            byte_length: self.signing.byte_length,
            safe_mode: self.signing.safe_mode,
            rate_limit: self.signing.rate_limiting.to_rate_limit()?,
        })
    }
}

impl RateLimitingConfig {
    pub fn to_rate_limit(&self) -> Result<RateLimitConfig, DomainError> {
        if self.enabled && self.period_secs == 0 {
            return Err(DomainError::configuration(
                "signing.rate_limiting.period_secs must be greater than zero",
            ));
        }

        let period = i64::try_from(self.period_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                DomainError::configuration(format!(
                    "signing.rate_limiting.period_secs out of range: {}",
                    self.period_secs
                ))
            })?;

        Ok(RateLimitConfig {
            enabled: self.enabled,
            max_requests: self.max_requests,
            period,
        })
    }
}

impl StorageBackendConfig {
    /// Configured URL, or `DATABASE_URL` from the environment
    pub fn resolved_url(&self) -> Option<String> {
        self.url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| std::env::var("DATABASE_URL").ok())
    }
}
