//! Configuration system for batchwork
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (BATCHWORK_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::coordinator::CoordinatorConfig;
use crate::error::{Error, Result};
use crate::resolver::PathResolver;
use crate::types::FileProvider;

/// Main batchwork configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Task execution settings
    pub job: JobSettings,

    /// Stores and working directories
    pub storage: StorageSettings,

    /// Polling behavior of `--wait`
    pub wait: WaitSettings,

    /// Logging configuration
    pub logging: LoggingSettings,

    /// File the configuration was loaded from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Task execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// Maximum tasks running at once (0 = number of CPUs)
    pub max_parallel_tasks: usize,

    /// Wall-clock limit per task command in seconds (0 = none)
    pub task_timeout_secs: u64,

    /// Shell used to run commands and scripts
    pub shell: String,
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Root of the per-task working directories
    pub working_root: String,

    /// Enabled file providers: "local", "gs"
    pub providers: Vec<String>,

    /// gsutil executable (name on PATH or full path)
    pub gsutil_path: String,

    /// Default location for task logs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging_root: Option<String>,
}

/// Status polling settings for waiting on a job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitSettings {
    /// First delay between polls in milliseconds
    pub poll_initial_ms: u64,

    /// Maximum delay between polls in milliseconds
    pub poll_max_ms: u64,

    /// Growth factor of the delay
    pub poll_multiplier: f64,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            job: JobSettings::default(),
            storage: StorageSettings::default(),
            wait: WaitSettings::default(),
            logging: LoggingSettings::default(),
            source: None,
        }
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 0, // Number of CPUs
            task_timeout_secs: 0,  // No limit
            shell: "/bin/bash".to_string(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            working_root: "~/.batchwork/tasks".to_string(),
            providers: FileProvider::all().iter().map(|p| p.name().to_string()).collect(),
            gsutil_path: "gsutil".to_string(),
            logging_root: None,
        }
    }
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_initial_ms: 250,
            poll_max_ms: 5000,
            poll_multiplier: 1.5,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl StorageSettings {
    /// Providers named in `providers`, in declaration order
    pub fn enabled_providers(&self) -> Result<Vec<FileProvider>> {
        if self.providers.is_empty() {
            return Err(Error::config_field_invalid(
                "storage.providers",
                "at least one provider must be enabled",
            ));
        }
        let mut enabled = Vec::new();
        for name in &self.providers {
            let provider = FileProvider::from_name(name.trim()).ok_or_else(|| {
                Error::config_field_invalid(
                    "storage.providers",
                    format!("unknown provider '{}' (expected 'local' or 'gs')", name),
                )
            })?;
            if !enabled.contains(&provider) {
                enabled.push(provider);
            }
        }
        Ok(enabled)
    }
}

impl BatchConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            config = Self::from_file(&path)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Parse a configuration file without overrides or validation
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::IoRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|e| Error::ConfigParse {
            message: format!("{}: {}", path.display(), e.message()),
            source: Some(e),
        })?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        for path in Self::search_paths() {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Standard configuration file locations, in search order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("batchwork.toml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("batchwork").join("config.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".batchwork").join("config.toml"));
        }
        paths.push(PathBuf::from("/etc/batchwork/config.toml"));
        paths
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Job settings
        if let Some(n) = var("BATCHWORK_MAX_PARALLEL_TASKS").and_then(|v| v.parse().ok()) {
            self.job.max_parallel_tasks = n;
        }
        if let Some(n) = var("BATCHWORK_TASK_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.job.task_timeout_secs = n;
        }
        if let Some(val) = var("BATCHWORK_SHELL") {
            self.job.shell = val;
        }

        // Storage settings
        if let Some(val) = var("BATCHWORK_WORKING_ROOT") {
            self.storage.working_root = val;
        }
        if let Some(val) = var("BATCHWORK_PROVIDERS") {
            self.storage.providers = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(val) = var("BATCHWORK_GSUTIL_PATH") {
            self.storage.gsutil_path = val;
        }
        if let Some(val) = var("BATCHWORK_LOGGING_ROOT") {
            self.storage.logging_root = Some(val);
        }

        // Logging settings
        if let Some(val) = var("BATCHWORK_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = var("BATCHWORK_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Some(val) = var("BATCHWORK_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        self.storage.working_root = expand_path(&self.storage.working_root);

        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.job.shell.trim().is_empty() {
            return Err(Error::config_field_invalid("job.shell", "shell cannot be empty"));
        }

        if self.storage.working_root.trim().is_empty() {
            return Err(Error::config_field_invalid(
                "storage.working_root",
                "working root cannot be empty",
            ));
        }
        self.storage.enabled_providers()?;

        if self.wait.poll_initial_ms == 0 {
            return Err(Error::config_field_invalid(
                "wait.poll_initial_ms",
                "poll_initial_ms must be greater than 0",
            ));
        }
        if self.wait.poll_max_ms < self.wait.poll_initial_ms {
            return Err(Error::config_field_invalid(
                "wait.poll_max_ms",
                "poll_max_ms must not be less than poll_initial_ms",
            ));
        }
        if self.wait.poll_multiplier.is_nan() || self.wait.poll_multiplier < 1.0 {
            return Err(Error::config_field_invalid(
                "wait.poll_multiplier",
                "poll_multiplier must be at least 1.0",
            ));
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Get the working root as a PathBuf
    pub fn working_root(&self) -> PathBuf {
        PathBuf::from(&self.storage.working_root)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        (self.job.task_timeout_secs > 0).then(|| Duration::from_secs(self.job.task_timeout_secs))
    }

    /// Resolver accepting the enabled providers
    pub fn path_resolver(&self) -> Result<PathResolver> {
        Ok(PathResolver::new(self.storage.enabled_providers()?))
    }

    /// Coordinator settings derived from this configuration
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            working_root: self.working_root(),
            max_parallel_tasks: self.job.max_parallel_tasks,
            task_timeout: self.task_timeout(),
            poll_initial: Duration::from_millis(self.wait.poll_initial_ms),
            poll_max: Duration::from_millis(self.wait.poll_max_ms),
            poll_multiplier: self.wait.poll_multiplier,
        }
    }
}

/// Expand ~ and environment variables in paths
pub fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Default location written by `config init`
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".batchwork")
        .join("config.toml")
}

/// Initialize a new configuration file, returning its path
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(default_config_path);

    // Check if file exists
    if config_path.exists() && !force {
        return Err(Error::config_validation(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    // Create parent directories
    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
pub fn generate_default_config() -> String {
    r#"# batchwork configuration

[job]
# Maximum tasks running at once (0 = number of CPUs)
max_parallel_tasks = 0

# Wall-clock limit per task command in seconds (0 = none)
task_timeout_secs = 0

# Shell used to run commands and scripts
shell = "/bin/bash"

[storage]
# Root of the per-task working directories
working_root = "~/.batchwork/tasks"

# Enabled file providers
providers = ["local", "gs"]

# gsutil executable
gsutil_path = "gsutil"

# Default location for task logs (a directory, or a path ending in .log)
# logging_root = "gs://my-bucket/logs/"

[wait]
# Delay between status polls while waiting, in milliseconds
poll_initial_ms = 250
poll_max_ms = 5000
poll_multiplier = 1.5

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.batchwork/logs/batchwork.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
