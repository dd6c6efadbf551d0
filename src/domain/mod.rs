//! Domain layer - Core business logic and entities

pub mod clock;
pub mod error;
pub mod signing_key;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::DomainError;
pub use signing_key::{
    KeyFilter, KeyPatch, KeyState, RateLimitConfig, RotationGuard, Scope, SigningKey,
    SigningKeyRepository, SigningSettings,
};
