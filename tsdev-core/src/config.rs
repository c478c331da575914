//! Build configuration loading.
//!
//! A project may carry a `tsdev.json` manifest next to its `package.json`.
//! Whatever it defines is laid over the built-in defaults with a **shallow**
//! merge: every top-level key the manifest sets replaces the default value
//! wholesale. A manifest that sets `watchOptions` replaces the entire default
//! `watchOptions` object, and keys it leaves out fall back to empty values,
//! not to the defaults.
//!
//! ```json
//! {
//!   "buildDirectory": "dist",
//!   "watchOptions": { "ignorePatterns": ["*.map"], "restartDelayMs": 500 },
//!   "metaFiles": [".env", "config/"]
//! }
//! ```

use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// File name of the project manifest, relative to the project root.
pub const MANIFEST_FILE: &str = "tsdev.json";

/// Resolved build configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfiguration {
    /// Where compiled output goes, relative to the project root.
    pub build_directory: PathBuf,
    /// Restart supervisor settings used by `tsdev dev`.
    pub watch_options: WatchOptions,
    /// Files copied verbatim into the build directory, in order.
    pub meta_files: Vec<PathBuf>,
}

/// Restart supervisor settings.
///
/// Missing keys deserialize to empty values so that a partial
/// `watchOptions` in the manifest never inherits from the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchOptions {
    /// Globs (relative to the project root) whose changes never restart.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    /// Quiet period after a change before restarting.
    #[serde(default)]
    pub restart_delay_ms: u64,
    /// Entry point to run. Defaults to `<buildDirectory>/index.js`.
    #[serde(default)]
    pub script: Option<PathBuf>,
}

/// The manifest as written by the user. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialBuildConfig {
    pub build_directory: Option<PathBuf>,
    pub watch_options: Option<WatchOptions>,
    pub meta_files: Option<Vec<PathBuf>>,
}

impl Default for BuildConfiguration {
    fn default() -> Self {
        Self {
            build_directory: PathBuf::from("build"),
            watch_options: WatchOptions {
                ignore_patterns: vec!["*.test.js".to_string(), "*.map".to_string()],
                restart_delay_ms: 300,
                script: None,
            },
            meta_files: vec![PathBuf::from(".env")],
        }
    }
}

impl BuildConfiguration {
    /// The supervised entry point, resolved against `project_root`.
    pub fn script_path(&self, project_root: &Path) -> PathBuf {
        let script = self
            .watch_options
            .script
            .clone()
            .unwrap_or_else(|| self.build_directory.join("index.js"));
        project_root.join(script)
    }

    /// The build directory, resolved against `project_root`.
    pub fn output_dir(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.build_directory)
    }
}

/// Overlay `partial` onto `defaults`, one top-level key at a time.
pub fn merge(defaults: BuildConfiguration, partial: Option<PartialBuildConfig>) -> BuildConfiguration {
    let Some(partial) = partial else {
        return defaults;
    };

    BuildConfiguration {
        build_directory: partial.build_directory.unwrap_or(defaults.build_directory),
        watch_options: partial.watch_options.unwrap_or(defaults.watch_options),
        meta_files: partial.meta_files.unwrap_or(defaults.meta_files),
    }
}

/// Resolve the build configuration for the project at `project_root`.
pub fn resolve(project_root: &Path) -> Result<BuildConfiguration, ConfigError> {
    let manifest = project_root.join(MANIFEST_FILE);
    let partial = load_optional::<PartialBuildConfig>(&manifest)?;
    if partial.is_none() {
        tracing::debug!(path = %manifest.display(), "no manifest, using defaults");
    }
    Ok(merge(BuildConfiguration::default(), partial))
}

/// Read and parse a JSON file that is allowed to be absent.
///
/// Only a "not found" error is turned into `Ok(None)`. Permission problems,
/// directories in the way and malformed JSON are all reported.
pub fn load_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project_with_manifest(content: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), content).unwrap();
        dir
    }

    #[test]
    fn test_resolve_without_manifest_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let config = resolve(dir.path()).unwrap();
        assert_eq!(config, BuildConfiguration::default());
    }

    #[test]
    fn test_resolve_overrides_only_defined_keys() {
        let dir = project_with_manifest(r#"{ "buildDirectory": "dist" }"#);
        let config = resolve(dir.path()).unwrap();

        let defaults = BuildConfiguration::default();
        assert_eq!(config.build_directory, PathBuf::from("dist"));
        assert_eq!(config.watch_options, defaults.watch_options);
        assert_eq!(config.meta_files, defaults.meta_files);
    }

    #[test]
    fn test_partial_watch_options_replace_defaults_wholesale() {
        let dir = project_with_manifest(r#"{ "watchOptions": { "restartDelayMs": 1000 } }"#);
        let config = resolve(dir.path()).unwrap();

        assert_eq!(config.watch_options.restart_delay_ms, 1000);
        assert!(config.watch_options.ignore_patterns.is_empty());
        assert_eq!(config.watch_options.script, None);
    }

    #[test]
    fn test_empty_meta_files_is_kept() {
        let dir = project_with_manifest(r#"{ "metaFiles": [] }"#);
        let config = resolve(dir.path()).unwrap();
        assert!(config.meta_files.is_empty());
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let dir = project_with_manifest(r#"{ "outDir": "x", "metaFiles": ["a.json"] }"#);
        let config = resolve(dir.path()).unwrap();
        assert_eq!(config.meta_files, vec![PathBuf::from("a.json")]);
        assert_eq!(config.build_directory, PathBuf::from("build"));
    }

    #[test]
    fn test_merge_without_partial_is_identity() {
        let defaults = BuildConfiguration::default();
        assert_eq!(merge(defaults.clone(), None), defaults);
    }

    #[test]
    fn test_load_optional_missing_file() {
        let dir = TempDir::new().unwrap();
        let loaded: Option<PartialBuildConfig> =
            load_optional(&dir.path().join("nope.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_optional_malformed_json_is_error() {
        let dir = project_with_manifest("{ not json");
        let err = load_optional::<PartialBuildConfig>(&dir.path().join(MANIFEST_FILE))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_optional_directory_is_error() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(MANIFEST_FILE)).unwrap();
        let result = load_optional::<PartialBuildConfig>(&dir.path().join(MANIFEST_FILE));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_script_path_defaults_to_build_index() {
        let config = BuildConfiguration::default();
        assert_eq!(
            config.script_path(Path::new("/app")),
            PathBuf::from("/app/build/index.js")
        );
    }

    #[test]
    fn test_script_path_uses_configured_script() {
        let mut config = BuildConfiguration::default();
        config.watch_options.script = Some(PathBuf::from("build/server.js"));
        assert_eq!(
            config.script_path(Path::new("/app")),
            PathBuf::from("/app/build/server.js")
        );
    }
}
