//! Error types for batchwork
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Per-task failure classification for job results
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TaskId;

/// Result type alias for batchwork operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,

    // Parameter and tasks file errors (3xx)
    MalformedTasksFile = 300,
    InvalidParameter = 301,
    UnresolvableLocation = 302,
    UnsupportedProvider = 303,

    // Storage errors (4xx)
    TransferFailed = 400,
    ObjectNotFound = 401,

    // Execution errors (5xx)
    LocalizationFailed = 500,
    CommandFailed = 501,
    TaskTimeout = 502,
    DelocalizationFailed = 503,
    Cancelled = 504,
    JobFailed = 505,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E300")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Parameter errors
            400..=499 => 40, // Storage errors
            500..=599 => 50, // Execution errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a task ended up in the `Failed` state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Localization,
    CommandExecution,
    TaskTimeout,
    Delocalization,
    Cancelled,
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Localization => "LocalizationError",
            FailureKind::CommandExecution => "CommandExecutionError",
            FailureKind::TaskTimeout => "TaskTimeout",
            FailureKind::Delocalization => "DelocalizationError",
            FailureKind::Cancelled => "Cancelled",
            FailureKind::Internal => "InternalError",
        };
        f.write_str(name)
    }
}

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Parameter Errors
    // ─────────────────────────────────────────────────────────────

    /// Tasks file cannot be turned into task descriptors
    #[error("Malformed tasks file (line {line}): {message}")]
    MalformedTasksFile { line: usize, message: String },

    /// Invalid parameter or label given on the command line
    #[error("Invalid {what}: {message}")]
    InvalidParameter { what: String, message: String },

    /// Location string is not valid for any configured provider
    #[error("Unresolvable location '{location}': {reason}")]
    UnresolvableLocation { location: String, reason: String },

    /// No store registered for a provider
    #[error("No store registered for provider '{provider}'")]
    UnsupportedProvider { provider: String },

    // ─────────────────────────────────────────────────────────────
    // Storage Errors
    // ─────────────────────────────────────────────────────────────

    /// Copy between a store and the local filesystem failed
    #[error("Transfer from {from} to {to} failed: {message}")]
    Transfer {
        from: String,
        to: String,
        message: String,
    },

    /// Object does not exist in the store
    #[error("Object not found: {uri}")]
    ObjectNotFound { uri: String },

    // ─────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────

    /// Copying inputs into the task directory failed
    #[error("Task {task_id} localization failed: {source}")]
    Localization {
        task_id: TaskId,
        #[source]
        source: Box<Error>,
    },

    /// Command exited non-zero, was killed by a signal, or could not start
    #[error("Task {task_id} command failed: {message}")]
    CommandExecution {
        task_id: TaskId,
        exit_code: Option<i32>,
        message: String,
    },

    /// Command ran past its wall-clock limit
    #[error("Task {task_id} timed out after {timeout_secs}s")]
    TaskTimeout { task_id: TaskId, timeout_secs: u64 },

    /// Copying outputs out of the task directory failed
    #[error("Task {task_id} delocalization of '{name}' failed: {message}")]
    Delocalization {
        task_id: TaskId,
        name: String,
        message: String,
    },

    /// Task was cancelled before completion
    #[error("Task {task_id} cancelled")]
    Cancelled { task_id: TaskId },

    /// One or more tasks of a waited-on job failed
    #[error("Job {job_id}: {failed} of {total} tasks failed")]
    JobFailed {
        job_id: String,
        failed: usize,
        total: usize,
    },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::Json(_) => ErrorCode::InternalError,

            Error::MalformedTasksFile { .. } => ErrorCode::MalformedTasksFile,
            Error::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            Error::UnresolvableLocation { .. } => ErrorCode::UnresolvableLocation,
            Error::UnsupportedProvider { .. } => ErrorCode::UnsupportedProvider,

            Error::Transfer { .. } => ErrorCode::TransferFailed,
            Error::ObjectNotFound { .. } => ErrorCode::ObjectNotFound,

            Error::Localization { .. } => ErrorCode::LocalizationFailed,
            Error::CommandExecution { .. } => ErrorCode::CommandFailed,
            Error::TaskTimeout { .. } => ErrorCode::TaskTimeout,
            Error::Delocalization { .. } => ErrorCode::DelocalizationFailed,
            Error::Cancelled { .. } => ErrorCode::Cancelled,
            Error::JobFailed { .. } => ErrorCode::JobFailed,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Whether the error is raised while building the job, before any task starts
    pub fn is_parse_time(&self) -> bool {
        matches!(
            self,
            Error::MalformedTasksFile { .. }
                | Error::InvalidParameter { .. }
                | Error::UnresolvableLocation { .. }
                | Error::UnsupportedProvider { .. }
        )
    }

    /// Classify a per-task error for the job result
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Error::Localization { .. } => FailureKind::Localization,
            Error::CommandExecution { .. } => FailureKind::CommandExecution,
            Error::TaskTimeout { .. } => FailureKind::TaskTimeout,
            Error::Delocalization { .. } => FailureKind::Delocalization,
            Error::Cancelled { .. } => FailureKind::Cancelled,
            _ => FailureKind::Internal,
        }
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'batchwork config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'batchwork config validate' to see details."
            ),
            Error::ConfigValidation { .. } => Some(
                "Review the configuration file and fix the invalid values."
            ),

            Error::MalformedTasksFile { .. } => Some(
                "Tasks files are tab-separated. Header columns are '--env NAME', '--label NAME', \
                 '--input NAME', '--input-recursive NAME', '--output NAME' or '--output-recursive NAME'."
            ),
            Error::InvalidParameter { .. } => Some(
                "Parameter names must start with a letter or underscore and contain only letters, digits and underscores."
            ),
            Error::UnresolvableLocation { .. } => Some(
                "Use gs://bucket/path for cloud objects or a local path. Check [storage].providers in the configuration."
            ),
            Error::UnsupportedProvider { .. } => Some(
                "Enable the provider in [storage].providers."
            ),

            Error::Transfer { .. } => Some(
                "Verify the object exists and that gsutil is installed and authenticated."
            ),

            Error::TaskTimeout { .. } => Some(
                "Raise --timeout or [job].task_timeout_secs."
            ),
            Error::Delocalization { .. } => Some(
                "The command must write every declared output. Inspect the task's logs/stderr.log."
            ),
            Error::JobFailed { .. } => Some(
                "Inspect the per-task table above and the task logs under the working root."
            ),

            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            code.as_str(),
            self
        );

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        let code = self.code();
        format!("[{}] {}", code.as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors (for ergonomic error creation)
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound { path: path.into() }
    }

    /// Create a config validation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a malformed tasks file error
    pub fn malformed(line: usize, message: impl Into<String>) -> Self {
        Error::MalformedTasksFile {
            line,
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(what: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            what: what.into(),
            message: message.into(),
        }
    }

    /// Create an unresolvable location error
    pub fn unresolvable(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::UnresolvableLocation {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Create a transfer error
    pub fn transfer(
        from: impl fmt::Display,
        to: impl fmt::Display,
        message: impl Into<String>,
    ) -> Self {
        Error::Transfer {
            from: from.to_string(),
            to: to.to_string(),
            message: message.into(),
        }
    }

    /// Wrap a transfer error as a localization failure
    pub fn localization(task_id: TaskId, source: Error) -> Self {
        Error::Localization {
            task_id,
            source: Box::new(source),
        }
    }

    /// Create a delocalization error
    pub fn delocalization(
        task_id: TaskId,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Delocalization {
            task_id,
            name: name.into(),
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
