//! Signing key infrastructure implementations
//!
//! This module provides signature generation, per-key rate limiting, the
//! lifecycle service, read-only projections and the record stores.

mod generator;
mod postgres_repository;
mod query;
mod rate_limiter;
mod repository;
mod service;

pub use generator::KeyGenerator;
pub use postgres_repository::PostgresSigningKeyRepository;
pub use query::{KeyQueryService, KeyView};
pub use rate_limiter::RateLimiter;
pub use repository::InMemorySigningKeyRepository;
pub use service::{
    NewSigningKey, RotateExpiring, RotateOptions, RotatedKey, RotationFailure, RotationReport,
    SigningKeyService,
};
