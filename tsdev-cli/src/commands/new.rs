//! Implementation of the `tsdev new` command.

use colored::Colorize;
use std::fs;
use std::path::Path;

use crate::error::CliError;
use crate::output;
use crate::toolchain::{SystemToolchain, Toolchain};

/// Project template cloned by `tsdev new`.
pub const TEMPLATE_URL: &str = "https://github.com/tsdev-rs/tsdev-template.git";

/// Execute the `new` command to scaffold a project at `path`.
pub fn execute(path: Option<&str>) -> Result<(), CliError> {
    let path = super::require_arg(path, "Project path is required, e.g. `tsdev new my-service`")?;
    let cwd = super::project_root()?;
    create(&cwd, path, &SystemToolchain)
}

pub(crate) fn create(cwd: &Path, path: &str, toolchain: &impl Toolchain) -> Result<(), CliError> {
    if path.trim().is_empty() {
        return Err(CliError::Usage("Project path cannot be empty".to_string()));
    }

    let target = cwd.join(path);
    ensure_empty_target(&target)?;

    println!();
    println!(
        "  {} {}",
        "Creating new project:".bright_cyan(),
        target.display().to_string().bold()
    );
    println!();

    toolchain.clone_template(TEMPLATE_URL, &target)?.check()?;
    output::created(format!("Cloned template into {}", path.cyan()));

    toolchain.install(&target, false)?.check()?;
    output::created("Installed dependencies");

    println!();
    println!("  {} Project created successfully!", "🎉".bold());
    println!();
    println!("  {}:", "Next steps".bright_yellow());
    println!("    cd {}", path.cyan());
    println!("    tsdev dev");
    println!();

    Ok(())
}

/// `git clone` only accepts a missing or empty directory.
fn ensure_empty_target(target: &Path) -> Result<(), CliError> {
    if !target.exists() {
        return Ok(());
    }
    if !target.is_dir() {
        return Err(CliError::Usage(format!(
            "'{}' already exists and is not a directory",
            target.display()
        )));
    }

    let mut entries = fs::read_dir(target)
        .map_err(|e| CliError::failed(&format!("Failed to read {}", target.display()), e))?;
    if entries.next().is_some() {
        return Err(CliError::Usage(format!(
            "Directory '{}' already exists and is not empty",
            target.display()
        )));
    }
    Ok(())
}
