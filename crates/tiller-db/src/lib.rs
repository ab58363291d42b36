pub mod database;
pub mod migrations;
pub mod runner;
pub mod sqlite_store;
pub mod version_store;

#[cfg(test)]
pub(crate) mod testing;

pub use database::Database;
pub use migrations::{MIGRATIONS, Migration, MigrationRegistry};
pub use runner::Runner;
pub use sqlite_store::SqliteStore;
pub use version_store::{MemoryVersionStore, MigrationRecord, VersionStore};
