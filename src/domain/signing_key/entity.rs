//! Signing key record and lifecycle state

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::scope::Scope;
use super::settings::RateLimitConfig;
use crate::domain::DomainError;

/// Unix timestamp of 9999-12-31T23:59:59Z
const NEVER_EXPIRES_TIMESTAMP: i64 = 253_402_300_799;

/// Sentinel expiration used for keys that never expire
pub fn never_expires() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(NEVER_EXPIRES_TIMESTAMP, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Absolute expiration for a key issued at `issued_at` lasting `hours` (0 = never)
pub fn expiration_after(issued_at: DateTime<Utc>, hours: u32) -> DateTime<Utc> {
    if hours == 0 {
        return never_expires();
    }

    let latest = never_expires() - Duration::seconds(1);

    issued_at
        .checked_add_signed(Duration::hours(i64::from(hours)))
        .map_or(latest, |at| at.min(latest))
}

/// Longest lifetime a key may request, bounded by the stored column width
pub const MAX_EXPIRATION_HOURS: u32 = i32::MAX as u32;

/// Reject lifetimes no record store can persist
pub fn validate_expiration_hours(hours: u32) -> Result<u32, DomainError> {
    if hours > MAX_EXPIRATION_HOURS {
        return Err(DomainError::validation(format!(
            "expiration_hours must be at most {}, got {}",
            MAX_EXPIRATION_HOURS, hours
        )));
    }

    Ok(hours)
}

/// Leading characters of a signature, safe to put in logs
pub fn signature_hint(signature: &str) -> &str {
    signature.get(..8).unwrap_or(signature)
}

/// Externally observable lifecycle state of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    /// Usable: active, not rotated, not past its expiration
    Active,
    /// Disabled without a successor
    Inactive,
    /// Past its expiration
    Expired,
    /// Replaced by a successor; terminal
    Rotated,
}

impl KeyState {
    /// Derive the state from the stored flags at instant `now`
    pub fn derive(active: bool, rotated: bool, expiration: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if rotated {
            Self::Rotated
        } else if expiration < now {
            Self::Expired
        } else if !active {
            Self::Inactive
        } else {
            Self::Active
        }
    }
}

impl fmt::Display for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Expired => write!(f, "expired"),
            Self::Rotated => write!(f, "rotated"),
        }
    }
}

/// Partial update applied atomically by a record store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyPatch {
    pub active: Option<bool>,
    pub rotated: Option<bool>,
}

impl KeyPatch {
    /// Patch that disables a key
    pub fn deactivate() -> Self {
        Self {
            active: Some(false),
            rotated: None,
        }
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn with_rotated(mut self, rotated: bool) -> Self {
        self.rotated = Some(rotated);
        self
    }
}

/// Persisted signing key record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningKey {
    /// Opaque bearer token; primary identifier
    signature: String,
    /// Owner tag, lower-cased
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    scope: Scope,
    active: bool,
    /// Set once the key has produced a successor
    rotated: bool,
    /// Creation time
    timestamp: DateTime<Utc>,
    expiration: DateTime<Utc>,
    /// Requested lifetime in hours (0 = never expires)
    expiration_int: u32,
    request_count: u32,
    last_request_time: DateTime<Utc>,
    /// Key this one was rotated from
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_key: Option<String>,
}

impl SigningKey {
    /// Create an active, never-expiring wildcard key issued at `issued_at`
    pub fn new(signature: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            signature: signature.into(),
            email: None,
            scope: Scope::wildcard(),
            active: true,
            rotated: false,
            timestamp: issued_at,
            expiration: never_expires(),
            expiration_int: 0,
            request_count: 0,
            last_request_time: issued_at,
            previous_key: None,
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Set the owner tag (lower-cased; blank values are dropped)
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Expire `hours` after the issue time (0 = never)
    pub fn expires_in_hours(mut self, hours: u32) -> Self {
        self.expiration = expiration_after(self.timestamp, hours);
        self.expiration_int = hours;
        self
    }

    pub fn with_previous_key(mut self, previous_key: Option<String>) -> Self {
        self.previous_key = previous_key;
        self
    }

    /// Restore stored expiration fields verbatim
    pub fn with_stored_expiration(mut self, expiration: DateTime<Utc>, expiration_int: u32) -> Self {
        self.expiration = expiration;
        self.expiration_int = expiration_int;
        self
    }

    /// Restore stored rate-limit counters verbatim
    pub fn with_request_state(mut self, request_count: u32, last_request_time: DateTime<Utc>) -> Self {
        self.request_count = request_count;
        self.last_request_time = last_request_time;
        self
    }

    pub fn with_rotated(mut self, rotated: bool) -> Self {
        self.rotated = rotated;
        self
    }

    // Getters

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_rotated(&self) -> bool {
        self.rotated
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }

    pub fn expiration_hours(&self) -> u32 {
        self.expiration_int
    }

    pub fn request_count(&self) -> u32 {
        self.request_count
    }

    pub fn last_request_time(&self) -> DateTime<Utc> {
        self.last_request_time
    }

    pub fn previous_key(&self) -> Option<&str> {
        self.previous_key.as_deref()
    }

    // Status checks

    pub fn never_expires(&self) -> bool {
        self.expiration_int == 0
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration < now
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> KeyState {
        KeyState::derive(self.active, self.rotated, self.expiration, now)
    }

    // Mutators

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Retire the key after a successor has been issued
    pub fn mark_rotated(&mut self) {
        self.active = false;
        self.rotated = true;
    }

    pub fn apply(&mut self, patch: &KeyPatch) {
        if let Some(active) = patch.active {
            self.active = active;
        }

        if let Some(rotated) = patch.rotated {
            self.rotated = rotated;
        }
    }

    /// Count one validation request against the rolling window.
    ///
    /// The window restarts once `period` has elapsed since the last
    /// admitted request. A rejected request leaves the counters untouched
    /// from the caller's point of view; stores discard the mutation.
    pub fn register_request(
        &mut self,
        now: DateTime<Utc>,
        config: &RateLimitConfig,
    ) -> Result<(), DomainError> {
        if now - self.last_request_time >= config.period {
            self.request_count = 0;
            self.last_request_time = now;
        }

        if self.request_count >= config.max_requests {
            return Err(DomainError::rate_limit_exceeded(&self.signature));
        }

        self.request_count = self.request_count.saturating_add(1);
        self.last_request_time = now;

        Ok(())
    }
}
