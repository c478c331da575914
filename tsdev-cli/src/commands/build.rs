//! Implementation of the `tsdev build` command.

use colored::Colorize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tsdev_core::BuildConfiguration;
use walkdir::WalkDir;

use crate::error::CliError;
use crate::output::{self, colors};
use crate::toolchain::{SystemToolchain, ToolOutput, Toolchain};

/// Always copied into production builds.
const PACKAGE_MANIFEST: &str = "package.json";

/// Copied into production builds when present.
const LOCKFILES: [&str; 3] = ["package-lock.json", "yarn.lock", "pnpm-lock.yaml"];

/// Flags for the build command.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Skip installing production dependencies into the output.
    pub clean: bool,
    /// Print captured compiler and installer output.
    pub verbose: bool,
}

/// Execute the `build` command.
pub fn execute(options: BuildOptions) -> Result<(), CliError> {
    let root = super::project_root()?;
    let config = tsdev_core::config::resolve(&root)?;
    run(&root, &config, options, &SystemToolchain)
}

pub(crate) fn run(
    root: &Path,
    config: &BuildConfiguration,
    options: BuildOptions,
    toolchain: &impl Toolchain,
) -> Result<(), CliError> {
    let out_dir = config.output_dir(root);

    output::info("Building project...");
    reset_output_dir(root, &out_dir)?;
    copy_meta_files(root, &out_dir, &config.meta_files, true)?;

    let compiled = toolchain.compile(root, &out_dir)?;
    report(&compiled, options.verbose);
    compiled.check()?;
    output::ready("Compiled successfully");

    if !options.clean {
        output::info("Installing production dependencies...");
        let installed = toolchain.install(&out_dir, true)?;
        report(&installed, options.verbose);
        installed.check()?;
    }

    println!();
    println!(
        "  Build written to {}",
        config
            .build_directory
            .display()
            .to_string()
            .custom_color(colors::sky())
    );
    println!();

    Ok(())
}

/// Delete and recreate the output directory.
///
/// The directory must resolve to somewhere strictly inside the project.
pub(crate) fn reset_output_dir(root: &Path, out_dir: &Path) -> Result<(), CliError> {
    let project = resolve_path(root);
    let target = resolve_path(out_dir);
    if target == project || !target.starts_with(&project) {
        return Err(CliError::Failed(format!(
            "Refusing to clear {}: the build directory must be inside the project",
            out_dir.display()
        )));
    }

    match fs::remove_dir_all(&target) {
        Ok(()) => tracing::debug!(dir = %target.display(), "removed output directory"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            return Err(CliError::failed(
                &format!("Failed to remove {}", out_dir.display()),
                e,
            ));
        }
    }

    fs::create_dir_all(&target)
        .map_err(|e| CliError::failed(&format!("Failed to create {}", out_dir.display()), e))
}

/// Canonicalize the longest existing prefix of `path`, then apply the
/// remaining components lexically.
fn resolve_path(path: &Path) -> PathBuf {
    let components: Vec<Component<'_>> = path.components().collect();
    for split in (1..=components.len()).rev() {
        let prefix: PathBuf = components[..split].iter().collect();
        let Ok(mut resolved) = prefix.canonicalize() else {
            continue;
        };
        for component in &components[split..] {
            match component {
                Component::ParentDir => {
                    resolved.pop();
                }
                Component::CurDir => {}
                other => resolved.push(other),
            }
        }
        return resolved;
    }
    path.to_path_buf()
}

/// Copy meta files, plus package files for production builds, into `out_dir`.
///
/// Paths keep their position relative to the project root. Directories are
/// copied recursively.
pub(crate) fn copy_meta_files(
    root: &Path,
    out_dir: &Path,
    meta_files: &[PathBuf],
    production: bool,
) -> Result<(), CliError> {
    for file in meta_files {
        ensure_project_relative(file)?;
    }
    for file in meta_files {
        copy_entry(root, out_dir, file)?;
    }

    if production {
        copy_entry(root, out_dir, Path::new(PACKAGE_MANIFEST))?;
        for lockfile in LOCKFILES {
            if root.join(lockfile).is_file() {
                copy_entry(root, out_dir, Path::new(lockfile))?;
            }
        }
    }

    Ok(())
}

fn copy_entry(root: &Path, out_dir: &Path, relative: &Path) -> Result<(), CliError> {
    ensure_project_relative(relative)?;
    let source = root.join(relative);
    let dest = out_dir.join(relative);

    if source.is_dir() {
        for entry in WalkDir::new(&source) {
            let entry = entry
                .map_err(|e| CliError::failed(&format!("Failed to copy {}", relative.display()), e))?;
            let Ok(inner) = entry.path().strip_prefix(&source) else {
                continue;
            };
            let target = dest.join(inner);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target).map_err(|e| {
                    CliError::failed(&format!("Failed to create {}", target.display()), e)
                })?;
            } else {
                copy_file(entry.path(), &target)?;
            }
        }
    } else {
        copy_file(&source, &dest)?;
    }

    tracing::debug!(file = %relative.display(), "copied");
    Ok(())
}

/// Meta files are copied to the same relative place under the output
/// directory, so they must name something below the project root.
fn ensure_project_relative(file: &Path) -> Result<(), CliError> {
    let below_root = file
        .components()
        .any(|c| matches!(c, Component::Normal(_)))
        && file
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if below_root {
        Ok(())
    } else {
        Err(CliError::Usage(format!(
            "metaFiles entry '{}' must be a relative path inside the project",
            file.display()
        )))
    }
}

fn copy_file(source: &Path, dest: &Path) -> Result<(), CliError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| CliError::failed(&format!("Failed to create {}", parent.display()), e))?;
    }
    fs::copy(source, dest)
        .map_err(|e| CliError::failed(&format!("Failed to copy {}", source.display()), e))?;
    Ok(())
}

fn report(result: &ToolOutput, verbose: bool) {
    if !verbose {
        return;
    }

    let status = match result.code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    };
    println!(
        "{} {} ({})",
        "RUN".custom_color(colors::subtext()).bold(),
        result.command,
        status
    );
    if !result.stdout.trim().is_empty() {
        println!("{}", result.stdout.trim_end());
    }
    if !result.stderr.trim().is_empty() {
        eprintln!("{}", result.stderr.trim_end());
    }
}
