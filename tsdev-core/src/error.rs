//! Error types for configuration loading, database setup and migrations.

use std::path::PathBuf;

/// Errors raised while reading optional JSON config files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The file was read but is not valid JSON for the expected shape.
    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while turning `database.json` into a usable client.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("No database config found at {}", .path.display())]
    MissingConfig { path: PathBuf },

    #[error("Unknown database client '{client}' (expected postgres, mysql or sqlite)")]
    UnknownClient { client: String },

    #[error("The '{client}' database driver is not installed")]
    DriverNotInstalled { client: String },

    #[error("No connection URL: set \"connection\" in database.json or DATABASE_URL")]
    MissingConnection,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to load {}: {source}", .path.display())]
    Env {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    #[error("Failed to configure database pool: {0}")]
    Connect(#[source] sqlx::Error),
}

/// Errors raised by the migration engine.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("{0}")]
    InvalidName(String),

    #[error("Migration file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Migration {name} is malformed: {reason}")]
    MalformedFile { name: String, reason: String },

    #[error("The migration directory is corrupt, the following files are missing: {}", .0.join(", "))]
    CorruptDirectory(Vec<String>),

    #[error("Migration {name} failed: {source}")]
    Migration {
        name: String,
        #[source]
        source: sqlx::Error,
    },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl MigrationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
