//! External tools: the TypeScript compiler, npm and git.
//!
//! Runners talk to them through [`Toolchain`] so the step sequencing can be
//! tested without spawning anything.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::CliError;

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// The command line, for messages.
    pub command: String,
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Turn an unsuccessful run into an error, printing its output first.
    pub fn check(self) -> Result<Self, CliError> {
        if self.success {
            return Ok(self);
        }

        if !self.stdout.trim().is_empty() {
            println!("{}", self.stdout.trim_end());
        }
        if !self.stderr.trim().is_empty() {
            eprintln!("{}", self.stderr.trim_end());
        }
        let status = self
            .code
            .map(|c| format!("exit code {}", c))
            .unwrap_or_else(|| "a signal".to_string());
        Err(CliError::Failed(format!("`{}` failed with {}", self.command, status)))
    }
}

pub trait Toolchain {
    /// One-shot compile of the project into `out_dir`.
    fn compile(&self, project_root: &Path, out_dir: &Path) -> Result<ToolOutput, CliError>;

    /// Install dependencies in `dir`, skipping dev dependencies when `production`.
    fn install(&self, dir: &Path, production: bool) -> Result<ToolOutput, CliError>;

    /// Shallow-clone `url` into `target`.
    fn clone_template(&self, url: &str, target: &Path) -> Result<ToolOutput, CliError>;
}

/// Runs the real tools found on `PATH`.
pub struct SystemToolchain;

impl Toolchain for SystemToolchain {
    fn compile(&self, project_root: &Path, out_dir: &Path) -> Result<ToolOutput, CliError> {
        let mut cmd = Command::new(program("npx"));
        cmd.arg("tsc").arg("--outDir").arg(out_dir).current_dir(project_root);
        run(cmd)
    }

    fn install(&self, dir: &Path, production: bool) -> Result<ToolOutput, CliError> {
        let mut cmd = Command::new(program("npm"));
        cmd.arg("install").current_dir(dir);
        if production {
            cmd.arg("--omit=dev");
        }
        run(cmd)
    }

    fn clone_template(&self, url: &str, target: &Path) -> Result<ToolOutput, CliError> {
        let mut cmd = Command::new("git");
        cmd.args(["clone", "--depth", "1", url]).arg(target);
        run(cmd)
    }
}

/// `tsc` in watch mode, writing into `out_dir`. Caller sets up stdio.
pub fn compiler_watch_command(project_root: &Path, out_dir: &Path) -> Command {
    let mut cmd = Command::new(program("npx"));
    cmd.args(["tsc", "--watch", "--preserveWatchOutput", "--outDir"])
        .arg(out_dir)
        .current_dir(project_root);
    cmd
}

/// npm ships `.cmd` shims on Windows.
pub fn program(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.cmd", name)
    } else {
        name.to_string()
    }
}

fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|s| s.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn run(mut cmd: Command) -> Result<ToolOutput, CliError> {
    let command = describe(&cmd);
    tracing::debug!(%command, dir = ?cmd.get_current_dir(), "running");

    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|e| CliError::failed(&format!("Failed to run `{}`", command), e))?;

    tracing::debug!(%command, status = %output.status, "finished");
    Ok(ToolOutput {
        command,
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
