//! Signing key domain
//!
//! This module provides domain types and traits for signing key management:
//! the persisted record, permission scopes, lifecycle state, record filters
//! and the record store contract.

mod entity;
mod filter;
mod repository;
mod scope;
mod settings;

pub use entity::{
    expiration_after, never_expires, signature_hint, validate_expiration_hours, KeyPatch,
    KeyState, SigningKey, MAX_EXPIRATION_HOURS,
};
pub use filter::KeyFilter;
pub use repository::{KeyMutation, RotationGuard, SigningKeyRepository};
pub use scope::Scope;
pub use settings::{RateLimitConfig, SigningSettings, DEFAULT_BYTE_LENGTH};
