//! Implementation of the `tsdev dev` command.
//!
//! Runs `tsc --watch` and, once the first compile succeeds, a restart
//! supervisor for the compiled entry point. The supervisor watches the build
//! directory and restarts the process whenever compiled output changes.

use colored::Colorize;
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tsdev_core::BuildConfiguration;
use tsdev_core::config::load_optional;

use super::build;
use crate::error::CliError;
use crate::output::{self, colors};
use crate::toolchain;

/// Optional supervisor settings, relative to the project root.
pub const RESTART_CONFIG_FILE: &str = "restart.json";

const MIN_RESTART_DELAY_MS: u64 = 50;

/// Contents of `restart.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RestartConfig {
    /// Program that runs the script. Defaults to `node`.
    #[serde(default)]
    pub exec: Option<String>,
    /// Arguments placed before the script path.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for the supervised process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl RestartConfig {
    pub fn load(root: &Path) -> Result<Self, CliError> {
        Ok(load_optional(&root.join(RESTART_CONFIG_FILE))?.unwrap_or_default())
    }
}

/// Everything the event loop reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DevEvent {
    /// `tsc` finished a compile pass with this many errors.
    Compiled { errors: usize },
    /// `tsc` closed its output, i.e. exited.
    CompilerClosed,
    /// Compiled output changed.
    OutputChanged,
    /// Ctrl+C.
    Quit,
}

/// Execute the `dev` command.
pub fn execute() -> Result<(), CliError> {
    let root = super::project_root()?;
    let config = tsdev_core::config::resolve(&root)?;
    let restart = RestartConfig::load(&root)?;
    let out_dir = config.output_dir(&root);

    print_banner(&config, &root);

    build::reset_output_dir(&root, &out_dir)?;
    build::copy_meta_files(&root, &out_dir, &config.meta_files, false)?;

    let (tx, rx) = mpsc::channel();

    // Ctrl+C reaches tsc too, so its exit may arrive before the Quit event.
    let quitting = Arc::new(AtomicBool::new(false));
    let q = quitting.clone();
    let quit_tx = tx.clone();
    ctrlc::set_handler(move || {
        q.store(true, Ordering::SeqCst);
        let _ = quit_tx.send(DevEvent::Quit);
    })
    .map_err(|e| CliError::failed("Failed to set Ctrl+C handler", e))?;

    output::info("Starting TypeScript compiler in watch mode...");
    let mut compiler = toolchain::compiler_watch_command(&root, &out_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| CliError::failed("Failed to start tsc", e))?;

    let stdout = compiler
        .stdout
        .take()
        .ok_or_else(|| CliError::Failed("tsc stdout was not captured".to_string()))?;
    forward_compiler_output(stdout, tx.clone());

    let result = event_loop(&rx, &quitting, || {
        Supervisor::start(&root, &config, &restart, tx.clone())
    });

    let _ = compiler.kill();
    if let Ok(status) = compiler.wait() {
        tracing::debug!(%status, "tsc exited");
    }

    result
}

/// A process the event loop keeps running once the first compile succeeds.
trait Restartable {
    fn restart(&mut self) -> Result<(), CliError>;
    /// Check for an exit the process made on its own.
    fn poll(&mut self);
    fn stop(&mut self);
}

/// React to compiler, watcher and Ctrl+C events until the session ends.
///
/// `start` runs on the first compile without errors. Later clean compiles do
/// nothing because the output watcher already restarts the process. Whatever
/// was started is stopped before returning.
fn event_loop<R: Restartable>(
    rx: &Receiver<DevEvent>,
    quitting: &AtomicBool,
    mut start: impl FnMut() -> Result<R, CliError>,
) -> Result<(), CliError> {
    let mut process: Option<R> = None;

    let result = loop {
        let event = match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => {
                if let Some(process) = process.as_mut() {
                    process.poll();
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break Ok(()),
        };

        match event {
            DevEvent::Compiled { errors: 0 } => {
                if process.is_none() {
                    output::ready("Compiled successfully");
                    match start() {
                        Ok(started) => process = Some(started),
                        Err(e) => break Err(e),
                    }
                }
            }
            DevEvent::Compiled { errors } => {
                output::warn(format!(
                    "Found {} compile error{}, waiting for changes",
                    errors,
                    if errors == 1 { "" } else { "s" }
                ));
            }
            DevEvent::OutputChanged => {
                if let Some(process) = process.as_mut()
                    && let Err(e) = process.restart()
                {
                    break Err(e);
                }
            }
            DevEvent::CompilerClosed if quitting.load(Ordering::SeqCst) => break Ok(()),
            DevEvent::CompilerClosed => {
                break Err(CliError::Failed("tsc exited unexpectedly".to_string()));
            }
            DevEvent::Quit => break Ok(()),
        }
    };

    println!();
    output::info("Shutting down...");
    if let Some(mut process) = process {
        process.stop();
    }

    result
}

/// Echo compiler output and turn its summary lines into events.
fn forward_compiler_output(stdout: impl Read + Send + 'static, tx: Sender<DevEvent>) {
    std::thread::spawn(move || {
        for line in BufReader::new(stdout).lines() {
            let Ok(line) = line else { break };
            println!("{}", line);
            if let Some(errors) = parse_watch_summary(&line) {
                let _ = tx.send(DevEvent::Compiled { errors });
            }
        }
        let _ = tx.send(DevEvent::CompilerClosed);
    });
}

/// Parse the error count out of a `tsc --watch` summary line, e.g.
/// `[10:02:11 AM] Found 0 errors. Watching for file changes.`
fn parse_watch_summary(line: &str) -> Option<usize> {
    let start = line.find("Found ")? + "Found ".len();
    let rest = &line[start..];
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    let count = rest[..digits].parse().ok()?;
    rest[digits..]
        .trim_start()
        .starts_with("error")
        .then_some(count)
}

/// Keeps the compiled entry point running, restarting it on output changes.
struct Supervisor {
    command: SupervisedCommand,
    child: Option<Child>,
    exit_reported: bool,
    _debouncer: Debouncer<RecommendedWatcher>,
}

#[derive(Debug, Clone)]
struct SupervisedCommand {
    program: String,
    args: Vec<String>,
    script: PathBuf,
    env: BTreeMap<String, String>,
    cwd: PathBuf,
}

impl SupervisedCommand {
    fn new(root: &Path, config: &BuildConfiguration, restart: &RestartConfig) -> Self {
        Self {
            program: restart.exec.clone().unwrap_or_else(|| "node".to_string()),
            args: restart.args.clone(),
            script: config.script_path(root),
            env: restart.env.clone(),
            cwd: root.to_path_buf(),
        }
    }

    fn display(&self) -> String {
        let script = self.script.strip_prefix(&self.cwd).unwrap_or(&self.script);
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.push(script.display().to_string());
        parts.join(" ")
    }

    fn spawn(&self) -> Result<Child, CliError> {
        Command::new(&self.program)
            .args(&self.args)
            .arg(&self.script)
            .envs(&self.env)
            .current_dir(&self.cwd)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| CliError::failed(&format!("Failed to start `{}`", self.display()), e))
    }
}

impl Supervisor {
    fn start(
        root: &Path,
        config: &BuildConfiguration,
        restart: &RestartConfig,
        tx: Sender<DevEvent>,
    ) -> Result<Self, CliError> {
        let ignore = build_ignore_set(&config.watch_options.ignore_patterns)?;
        let delay = config
            .watch_options
            .restart_delay_ms
            .max(MIN_RESTART_DELAY_MS);
        let watch_root = root.to_path_buf();

        let mut debouncer = new_debouncer(
            Duration::from_millis(delay),
            move |res: DebounceEventResult| match res {
                Ok(events) => {
                    if events
                        .iter()
                        .any(|event| !is_ignored(&ignore, &watch_root, &event.path))
                    {
                        let _ = tx.send(DevEvent::OutputChanged);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "file watcher error"),
            },
        )
        .map_err(|e| CliError::failed("Failed to create file watcher", e))?;

        let out_dir = config.output_dir(root);
        debouncer
            .watcher()
            .watch(&out_dir, RecursiveMode::Recursive)
            .map_err(|e| CliError::failed(&format!("Failed to watch {}", out_dir.display()), e))?;

        let mut supervisor = Self {
            command: SupervisedCommand::new(root, config, restart),
            child: None,
            exit_reported: false,
            _debouncer: debouncer,
        };
        supervisor.spawn()?;
        Ok(supervisor)
    }

    fn spawn(&mut self) -> Result<(), CliError> {
        let child = self.command.spawn()?;
        tracing::debug!(pid = child.id(), "supervised process spawned");
        self.child = Some(child);
        self.exit_reported = false;
        output::ready(format!(
            "Started {}",
            self.command.display().custom_color(colors::sky())
        ));
        Ok(())
    }
}

impl Restartable for Supervisor {
    fn restart(&mut self) -> Result<(), CliError> {
        println!();
        output::info("Change detected, restarting...");
        self.stop();
        self.spawn()
    }

    /// Report (once) if the supervised process has exited on its own.
    fn poll(&mut self) {
        if self.exit_reported {
            return;
        }
        let Some(child) = self.child.as_mut() else {
            return;
        };
        if let Ok(Some(status)) = child.try_wait() {
            self.exit_reported = true;
            report_exit(status);
        }
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn report_exit(status: ExitStatus) {
    if status.success() {
        output::info("Process exited cleanly, waiting for changes before restart");
    } else {
        output::error(format!(
            "Process crashed ({}), waiting for changes before restart",
            status
        ));
    }
}

fn build_ignore_set(patterns: &[String]) -> Result<GlobSet, CliError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| CliError::failed(&format!("Invalid ignore pattern '{}'", pattern), e))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| CliError::failed("Failed to build ignore patterns", e))
}

fn is_ignored(ignore: &GlobSet, root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    ignore.is_match(relative)
}

/// The `name` field of the project's package.json, if any.
fn package_name(root: &Path) -> Option<String> {
    let content = std::fs::read_to_string(root.join("package.json")).ok()?;
    let parsed: serde_json::Value = serde_json::from_str(&content).ok()?;
    parsed
        .get("name")
        .and_then(|name| name.as_str())
        .map(|s| s.to_string())
}

/// Print the development banner.
fn print_banner(config: &BuildConfiguration, root: &Path) {
    let script = config.script_path(root);
    let script = script.strip_prefix(root).unwrap_or(&script);
    let title = match package_name(root) {
        Some(name) => format!("{} - Development Mode", name),
        None => "tsdev - Development Mode".to_string(),
    };

    // Box is 61 chars wide total, 59 chars inner content
    let b = "│".custom_color(colors::mauve());

    println!();
    println!(
        " {}",
        "╭───────────────────────────────────────────────────────────╮"
            .custom_color(colors::mauve())
    );
    println!(
        " {}{}{}",
        b,
        format!("{:^59}", title)
            .custom_color(colors::lavender())
            .bold(),
        b
    );
    println!(
        " {}",
        "├───────────────────────────────────────────────────────────┤"
            .custom_color(colors::mauve())
    );
    println!(" {}{:59}{}", b, "", b);

    let output_line = format!(" Output:     {:<46}", config.build_directory.display().to_string());
    println!(
        " {}{}{}",
        b,
        format!("{:59}", output_line).custom_color(colors::sky()),
        b
    );
    let entry_line = format!(" Entry:      {:<46}", script.display().to_string());
    println!(
        " {}{}{}",
        b,
        format!("{:59}", entry_line).custom_color(colors::sky()),
        b
    );

    println!(" {}{:59}{}", b, "", b);
    println!(
        " {}{}{}",
        b,
        format!(" {:<58}", "For production: tsdev build").custom_color(colors::subtext()),
        b
    );
    println!(" {}{:59}{}", b, "", b);
    println!(
        " {}",
        "╰───────────────────────────────────────────────────────────╯"
            .custom_color(colors::mauve())
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;

    #[derive(Debug, Default)]
    struct Log {
        starts: usize,
        restarts: usize,
        stops: usize,
    }

    struct FakeProcess {
        log: Rc<RefCell<Log>>,
    }

    impl Restartable for FakeProcess {
        fn restart(&mut self) -> Result<(), CliError> {
            self.log.borrow_mut().restarts += 1;
            Ok(())
        }

        fn poll(&mut self) {}

        fn stop(&mut self) {
            self.log.borrow_mut().stops += 1;
        }
    }

    /// A receiver holding `events`, disconnected once they are drained.
    fn queued(events: Vec<DevEvent>) -> Receiver<DevEvent> {
        let (tx, rx) = mpsc::channel();
        for event in events {
            tx.send(event).unwrap();
        }
        rx
    }

    fn run_events(events: Vec<DevEvent>, quitting: bool) -> (Result<(), CliError>, Log) {
        let log = Rc::new(RefCell::new(Log::default()));
        let rx = queued(events);
        let result = event_loop(&rx, &AtomicBool::new(quitting), || {
            log.borrow_mut().starts += 1;
            Ok(FakeProcess { log: log.clone() })
        });
        let log = Rc::try_unwrap(log).unwrap().into_inner();
        (result, log)
    }

    #[test]
    fn test_event_loop_starts_on_first_clean_compile_only() {
        let (result, log) = run_events(
            vec![
                DevEvent::Compiled { errors: 0 },
                DevEvent::Compiled { errors: 0 },
                DevEvent::OutputChanged,
                DevEvent::Quit,
            ],
            false,
        );

        assert!(result.is_ok());
        assert_eq!(log.starts, 1);
        assert_eq!(log.restarts, 1);
        assert_eq!(log.stops, 1);
    }

    #[test]
    fn test_event_loop_compile_errors_never_start() {
        let (result, log) = run_events(
            vec![
                DevEvent::Compiled { errors: 3 },
                DevEvent::OutputChanged,
                DevEvent::Quit,
            ],
            false,
        );

        assert!(result.is_ok());
        assert_eq!(log.starts, 0);
        assert_eq!(log.restarts, 0);
        assert_eq!(log.stops, 0);
    }

    #[test]
    fn test_event_loop_starts_after_errors_are_fixed() {
        let (result, log) = run_events(
            vec![
                DevEvent::Compiled { errors: 1 },
                DevEvent::OutputChanged,
                DevEvent::Compiled { errors: 0 },
                DevEvent::Quit,
            ],
            false,
        );

        assert!(result.is_ok());
        assert_eq!(log.starts, 1);
        assert_eq!(log.restarts, 0);
    }

    #[test]
    fn test_event_loop_compiler_exit_fails() {
        let (result, log) = run_events(
            vec![DevEvent::Compiled { errors: 0 }, DevEvent::CompilerClosed],
            false,
        );

        assert!(matches!(result, Err(CliError::Failed(_))));
        assert_eq!(log.stops, 1);
    }

    #[test]
    fn test_event_loop_compiler_exit_while_quitting_is_ok() {
        let (result, _) = run_events(vec![DevEvent::CompilerClosed], true);
        assert!(result.is_ok());
    }

    #[test]
    fn test_event_loop_events_after_quit_are_ignored() {
        let (result, log) = run_events(
            vec![DevEvent::Quit, DevEvent::Compiled { errors: 0 }],
            false,
        );

        assert!(result.is_ok());
        assert_eq!(log.starts, 0);
    }

    #[test]
    fn test_event_loop_start_failure_ends_session() {
        let rx = queued(vec![DevEvent::Compiled { errors: 0 }, DevEvent::Quit]);
        let result = event_loop::<FakeProcess>(&rx, &AtomicBool::new(false), || {
            Err(CliError::Failed("no node".to_string()))
        });

        assert!(matches!(result, Err(CliError::Failed(m)) if m == "no node"));
    }

    #[test]
    fn test_parse_watch_summary() {
        assert_eq!(
            parse_watch_summary("[10:02:11 AM] Found 0 errors. Watching for file changes."),
            Some(0)
        );
        assert_eq!(
            parse_watch_summary("[10:02:11 AM] Found 1 error. Watching for file changes."),
            Some(1)
        );
        assert_eq!(parse_watch_summary("Found 12 errors in 3 files."), Some(12));
    }

    #[test]
    fn test_parse_watch_summary_ignores_other_lines() {
        assert_eq!(
            parse_watch_summary("[10:02:10 AM] File change detected. Starting incremental compilation..."),
            None
        );
        assert_eq!(
            parse_watch_summary("src/index.ts(3,7): error TS2322: Found something"),
            None
        );
        assert_eq!(parse_watch_summary("Found errors"), None);
    }

    #[test]
    fn test_is_ignored_matches_relative_paths() {
        let ignore =
            build_ignore_set(&["*.test.js".to_string(), "build/cache/**".to_string()]).unwrap();
        let root = Path::new("/app");

        assert!(is_ignored(&ignore, root, Path::new("/app/build/user.test.js")));
        assert!(is_ignored(&ignore, root, Path::new("/app/build/cache/x.json")));
        assert!(!is_ignored(&ignore, root, Path::new("/app/build/index.js")));
    }

    #[test]
    fn test_empty_ignore_set_matches_nothing() {
        let ignore = build_ignore_set(&[]).unwrap();
        assert!(!is_ignored(&ignore, Path::new("/app"), Path::new("/app/build/a.js")));
    }

    #[test]
    fn test_invalid_ignore_pattern() {
        assert!(build_ignore_set(&["[".to_string()]).is_err());
    }

    #[test]
    fn test_restart_config_defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        assert_eq!(RestartConfig::load(dir.path()).unwrap(), RestartConfig::default());
    }

    #[test]
    fn test_supervised_command_from_restart_config() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(RESTART_CONFIG_FILE),
            r#"{ "exec": "bun", "args": ["--smol"], "env": { "PORT": "4000" } }"#,
        )
        .unwrap();
        let restart = RestartConfig::load(dir.path()).unwrap();
        let command = SupervisedCommand::new(dir.path(), &BuildConfiguration::default(), &restart);

        assert_eq!(command.display(), "bun --smol build/index.js");
        assert_eq!(command.env.get("PORT").map(String::as_str), Some("4000"));
    }

    #[test]
    fn test_package_name() {
        let dir = TempDir::new().unwrap();
        assert_eq!(package_name(dir.path()), None);

        std::fs::write(dir.path().join("package.json"), r#"{ "name": "orders-api" }"#).unwrap();
        assert_eq!(package_name(dir.path()).as_deref(), Some("orders-api"));
    }

    #[test]
    fn test_supervised_command_defaults_to_node() {
        let command = SupervisedCommand::new(
            Path::new("/app"),
            &BuildConfiguration::default(),
            &RestartConfig::default(),
        );
        assert_eq!(command.display(), "node build/index.js");
        assert_eq!(command.script, PathBuf::from("/app/build/index.js"));
    }
}
