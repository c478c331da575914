//! Command errors and how they map onto the console.

use tsdev_core::database::{CONFIG_TEMPLATE, DATABASE_CONFIG_FILE};
use tsdev_core::{ConfigError, DatabaseError, MigrationError};

/// Every command returns this to `main`, which prints it and exits with 1.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// A required argument is missing or invalid.
    #[error("{0}")]
    Usage(String),

    /// A required file or driver is missing; `remediation` says how to fix it.
    #[error("{message}")]
    MissingDependency {
        message: String,
        remediation: String,
    },

    /// A delegated operation (compiler, installer, git, database) failed.
    #[error("{0}")]
    Failed(String),
}

impl CliError {
    pub fn failed(context: &str, err: impl std::fmt::Display) -> Self {
        CliError::Failed(format!("{}: {}", context, err))
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::Failed(err.to_string())
    }
}

impl From<DatabaseError> for CliError {
    fn from(err: DatabaseError) -> Self {
        let remediation = match &err {
            DatabaseError::MissingConfig { .. } => format!(
                "Create a {} file in the project root, for example:\n\n{}",
                DATABASE_CONFIG_FILE, CONFIG_TEMPLATE
            ),
            DatabaseError::UnknownClient { .. } => {
                "Set \"client\" to one of: postgres, mysql, sqlite".to_string()
            }
            DatabaseError::DriverNotInstalled { client } => format!(
                "Reinstall tsdev with the driver enabled:\n\n    cargo install tsdev-cli --features {}",
                client
            ),
            DatabaseError::MissingConnection => format!(
                "Add a \"connection\" URL to {} or export DATABASE_URL (a .env file works too)",
                DATABASE_CONFIG_FILE
            ),
            DatabaseError::Config(_) | DatabaseError::Env { .. } | DatabaseError::Connect(_) => {
                return CliError::Failed(err.to_string());
            }
        };

        CliError::MissingDependency {
            message: err.to_string(),
            remediation,
        }
    }
}

impl From<MigrationError> for CliError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::InvalidName(message) => CliError::Usage(message),
            other => CliError::Failed(other.to_string()),
        }
    }
}
