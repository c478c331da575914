//! Implementation of the `tsdev migration:*` commands.

use colored::Colorize;
use std::path::Path;
use tsdev_core::migration::MigrationConfig;
use tsdev_core::{DatabaseConfig, MigrationClient, Migrator};

use crate::error::CliError;
use crate::output::{self, colors};

/// Generate a new migration file.
pub fn make(name: Option<&str>) -> Result<(), CliError> {
    let name = super::require_arg(
        name,
        "Migration name is required, e.g. `tsdev migration:make create_users`",
    )?;
    let root = super::project_root()?;
    let database = DatabaseConfig::load(&root)?;

    runtime()?.block_on(async {
        let client = load_db(&root, &database)?;
        make_with(&client, &root, name).await
    })
}

/// Apply all pending migrations.
pub fn run() -> Result<(), CliError> {
    let root = super::project_root()?;
    let database = DatabaseConfig::load(&root)?;

    runtime()?.block_on(async {
        let client = load_db(&root, &database)?;
        run_with(&client).await
    })
}

/// Revert the last batch, or every batch.
pub fn rollback(all: bool) -> Result<(), CliError> {
    let root = super::project_root()?;
    let database = DatabaseConfig::load(&root)?;

    runtime()?.block_on(async {
        let client = load_db(&root, &database)?;
        rollback_with(&client, all).await
    })
}

fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::failed("Failed to start async runtime", e))
}

fn load_db(root: &Path, database: &DatabaseConfig) -> Result<Migrator, CliError> {
    tracing::debug!(client = %database.client, "constructing migration client");
    Ok(Migrator::new(root, database, MigrationConfig::default())?)
}

pub(crate) async fn make_with(
    client: &impl MigrationClient,
    root: &Path,
    name: &str,
) -> Result<(), CliError> {
    let result = client.make(name).await;
    client.destroy().await;
    let path = result?;

    let shown = path.strip_prefix(root).unwrap_or(&path);
    output::created(format!("Created {}", shown.display().to_string().cyan()));
    Ok(())
}

pub(crate) async fn run_with(client: &impl MigrationClient) -> Result<(), CliError> {
    let result = client.latest().await;
    client.destroy().await;

    let migrated = result?;
    print_lines(&migrated_lines(&migrated), migrated.is_empty());
    Ok(())
}

pub(crate) async fn rollback_with(client: &impl MigrationClient, all: bool) -> Result<(), CliError> {
    let result = client.rollback(all).await;
    client.destroy().await;

    let reverted = result?;
    print_lines(&rollback_lines(&reverted), reverted.is_empty());
    Ok(())
}

fn migrated_lines(files: &[String]) -> Vec<String> {
    if files.is_empty() {
        return vec!["Already up to date, nothing to migrate".to_string()];
    }
    files.iter().map(|f| format!("migrated: {}", f)).collect()
}

fn rollback_lines(files: &[String]) -> Vec<String> {
    if files.is_empty() {
        return vec!["Already at the base migration".to_string()];
    }
    files.iter().map(|f| format!("rollback: {}", f)).collect()
}

fn print_lines(lines: &[String], informational: bool) {
    for line in lines {
        if informational {
            println!("{}", line.custom_color(colors::sky()));
        } else {
            println!("{}", line.custom_color(colors::green()));
        }
    }
}
