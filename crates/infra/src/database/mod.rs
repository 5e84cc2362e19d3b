//! SQLite persistence: pool management, schema migrations and repositories

pub mod manager;
pub mod metadata_repository;
pub mod migrations;
pub mod submission_repository;

pub use manager::{DbManager, SqliteConnection, SqlitePool};
pub use metadata_repository::SqliteMetadataStore;
pub use migrations::{builtin_migrations, Migration, MigrationRunner};
pub use submission_repository::SqliteSubmissionRepository;
