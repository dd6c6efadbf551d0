//! Storage infrastructure - backend selection, pooling and schema migrations

mod factory;
pub mod migrations;
mod postgres;

pub use factory::{RepositoryFactory, StorageConfig, StorageType};
pub use migrations::{run_signing_migrations, Migration, PostgresMigrator};
pub use postgres::PostgresConfig;
