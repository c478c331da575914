//! Project configuration and database migrations for `tsdev`.
//!
//! The `tsdev` binary (see the `tsdev-cli` crate) drives TypeScript projects:
//! compiling, watching, scaffolding and migrating. This crate holds the parts
//! that have shape of their own:
//!
//! - [`config`]: the build configuration, resolved from `tsdev.json` over
//!   hard-coded defaults with a shallow merge.
//! - [`database`]: the connection config read from `database.json`.
//! - [`migration`]: the SQL migration engine with batch tracking.

pub mod config;
pub mod database;
pub mod error;
pub mod migration;

pub use config::{BuildConfiguration, WatchOptions};
pub use database::DatabaseConfig;
pub use error::{ConfigError, DatabaseError, MigrationError};
pub use migration::{MigrationClient, MigrationConfig, Migrator};
