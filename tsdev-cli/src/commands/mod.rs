//! CLI command implementations.

pub mod build;
pub mod dev;
pub mod migrate;
pub mod new;

use std::path::PathBuf;

use crate::error::CliError;

/// Commands act on the current working directory.
pub fn project_root() -> Result<PathBuf, CliError> {
    std::env::current_dir().map_err(|e| CliError::failed("Failed to read current directory", e))
}

/// Positional arguments are optional to clap so a missing one exits with 1.
pub fn require_arg<'a>(value: Option<&'a str>, message: &str) -> Result<&'a str, CliError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(CliError::Usage(message.to_string())),
    }
}
