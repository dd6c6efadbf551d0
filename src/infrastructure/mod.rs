//! Infrastructure layer - Store, engine and runtime implementations

pub mod logging;
pub mod observability;
pub mod signing_key;
pub mod storage;
