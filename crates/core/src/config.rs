//! TOML-based configuration system for goldmerge.
//!
//! Every section is optional; a missing file section falls back to its
//! defaults so an empty config file is valid for one-off applies.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;
use crate::merge::ResolverKind;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging and on-disk locations.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Test command and retry-loop settings.
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Merge engine settings.
    #[serde(default)]
    pub merge: MergeConfig,

    /// Which golden files may be written.
    #[serde(default)]
    pub paths: PathsConfig,
}

// ---------------------------------------------------------------------------
// General
// ---------------------------------------------------------------------------

/// Logging and on-disk locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory holding the undo journal, relative to `workspace`.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Root against which relative paths in test reports resolve.
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_state_dir() -> PathBuf {
    PathBuf::from(".goldmerge")
}
fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            state_dir: default_state_dir(),
            workspace: default_workspace(),
        }
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Test command and retry-loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Shell command that runs the test suite and writes the report.
    #[serde(default)]
    pub command: String,

    /// Path of the JSON report written by `command`, relative to `workspace`.
    #[serde(default = "default_report")]
    pub report: PathBuf,

    /// Upper bound on run/apply iterations (default 10).
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Shell used to interpret `command` (invoked as `<shell> -c <command>`).
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Abandon a test run after this many seconds. 0 = wait indefinitely.
    #[serde(default)]
    pub timeout_secs: u64,
}

fn default_report() -> PathBuf {
    PathBuf::from("target/golden-report.json")
}
fn default_max_iterations() -> u32 {
    10
}
fn default_shell() -> String {
    "sh".into()
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            report: default_report(),
            max_iterations: default_max_iterations(),
            shell: default_shell(),
            timeout_secs: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Merge engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Resolver consulted before writing conflict markers.
    #[serde(default)]
    pub resolver: ResolverKind,
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Restrictions on which golden files an apply may write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directories holding test data (empty = anywhere in the workspace).
    #[serde(default)]
    pub test_data_roots: Vec<String>,

    /// Glob patterns for files that must never be rewritten.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Skip files larger than this many bytes. 0 = no limit.
    #[serde(default)]
    pub max_file_size: u64,
}

// ---------------------------------------------------------------------------
// Loading & validating
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Load the file if it exists, otherwise use defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load_from_file(path) {
            Err(ConfigError::FileNotFound(p)) => {
                debug!(path = %p, "no configuration file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Validate that all fields are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runner.max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "runner.max_iterations".into(),
                detail: "max iterations must be > 0".into(),
            });
        }
        if self.runner.shell.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "runner.shell".into(),
                detail: "shell must not be empty".into(),
            });
        }
        if self.general.state_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "general.state_dir".into(),
                detail: "state directory must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Stricter validation for the retry loop, which needs a test command.
    pub fn validate_for_loop(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.runner.command.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "runner.command".into(),
                detail: "a test command is required to run the apply loop".into(),
            });
        }
        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Absolute-or-workspace-relative location of the undo journal directory.
    pub fn state_dir(&self) -> PathBuf {
        self.general.workspace.join(&self.general.state_dir)
    }

    /// Workspace-relative location of the test report.
    pub fn report_path(&self) -> PathBuf {
        self.general.workspace.join(&self.runner.report)
    }
}

/// The configuration written by `goldmerge init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# goldmerge configuration

[general]
log_level = "info"
state_dir = ".goldmerge"
workspace = "."

[runner]
# Shell command that runs the tests and writes the JSON report.
command = ""
report = "target/golden-report.json"
max_iterations = 10
shell = "sh"
timeout_secs = 0

[merge]
# "token" merges edits to different words of the same line; "none" always
# writes conflict markers when both sides changed a line.
resolver = "token"

[paths]
test_data_roots = []
ignore_patterns = []
max_file_size = 0
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[general]
log_level = "debug"
state_dir = ".state"
workspace = "/work/kotlin"

[runner]
command = "./gradlew :compiler:test"
report = "build/golden.json"
max_iterations = 3
shell = "bash"
timeout_secs = 600

[merge]
resolver = "none"

[paths]
test_data_roots = ["compiler/testData"]
ignore_patterns = ["**/*.bin"]
max_file_size = 1048576
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.runner.command, "./gradlew :compiler:test");
        assert_eq!(config.runner.max_iterations, 3);
        assert_eq!(config.runner.timeout_secs, 600);
        assert_eq!(config.merge.resolver, ResolverKind::None);
        assert_eq!(config.paths.test_data_roots, vec!["compiler/testData"]);
        assert_eq!(config.state_dir(), PathBuf::from("/work/kotlin/.state"));
        assert_eq!(config.report_path(), PathBuf::from("/work/kotlin/build/golden.json"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("goldmerge.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.runner.shell, "bash");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/goldmerge.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let config = AppConfig::load_or_default("/nonexistent/goldmerge.toml").unwrap();
        assert_eq!(config.runner.max_iterations, 10);
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("goldmerge.toml");
        std::fs::write(&path, "[runner\ncommand = ").unwrap();
        let result = AppConfig::load_from_file(&path);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_unknown_resolver_rejected() {
        let result: Result<AppConfig, _> = toml::from_str("[merge]\nresolver = \"ast\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_iterations() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.runner.max_iterations = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "runner.max_iterations"
        ));
    }

    #[test]
    fn test_loop_requires_command() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(matches!(
            config.validate_for_loop(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "runner.command"
        ));
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.state_dir, PathBuf::from(".goldmerge"));
        assert_eq!(config.runner.report, PathBuf::from("target/golden-report.json"));
        assert_eq!(config.runner.shell, "sh");
        assert_eq!(config.merge.resolver, ResolverKind::Token);
        assert!(config.paths.test_data_roots.is_empty());
    }

    #[test]
    fn test_default_template_parses() {
        let config: AppConfig = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.merge.resolver, ResolverKind::Token);
    }
}
