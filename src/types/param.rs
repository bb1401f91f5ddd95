//! Task parameters and labels

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::Location;

/// Label keys the engine reserves for its own bookkeeping
pub const RESERVED_LABELS: &[&str] = &["job-id", "job-name", "task-id", "user-id", "batchwork-version"];

// ─────────────────────────────────────────────────────────────────
// Parameter Classification
// ─────────────────────────────────────────────────────────────────

/// Whether a parameter feeds the command or is produced by it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    /// Top-level directory for this direction inside a task workspace
    pub fn dir_name(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }

    /// Prefix for generated parameter names
    pub fn auto_prefix(&self) -> &'static str {
        match self {
            Direction::Input => "INPUT_",
            Direction::Output => "OUTPUT_",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Whether a parameter is a file to transfer or a plain value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    File,
    Literal,
}

// ─────────────────────────────────────────────────────────────────
// Parameter Binding
// ─────────────────────────────────────────────────────────────────

/// One named parameter of a task and where its value lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBinding {
    /// Parameter and environment variable name
    pub name: String,

    pub direction: Direction,

    pub kind: ParamKind,

    /// Directory transfer (file parameters only)
    pub recursive: bool,

    /// Value exactly as given in the tasks file or on the command line
    pub value: String,

    /// Remote location (file parameters only)
    pub location: Option<Location>,

    /// Layout below the task directory (file parameters only)
    pub relative_path: Option<PathBuf>,

    /// Absolute path inside the task directory, set once at localization
    local_path: Option<PathBuf>,
}

impl ParameterBinding {
    /// Create a literal parameter
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Input,
            kind: ParamKind::Literal,
            recursive: false,
            value: value.into(),
            location: None,
            relative_path: None,
            local_path: None,
        }
    }

    /// Create a file parameter
    pub fn file(
        name: impl Into<String>,
        direction: Direction,
        recursive: bool,
        value: impl Into<String>,
        location: Location,
        relative_path: PathBuf,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            kind: ParamKind::File,
            recursive,
            value: value.into(),
            location: Some(location),
            relative_path: Some(relative_path),
            local_path: None,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == ParamKind::File
    }

    pub fn is_input_file(&self) -> bool {
        self.is_file() && self.direction == Direction::Input
    }

    pub fn is_output_file(&self) -> bool {
        self.is_file() && self.direction == Direction::Output
    }

    /// Resolved path inside the task directory, if localization has bound it
    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }

    /// Bind the local path below `task_dir`
    ///
    /// Binding is write-once: repeating it with the same task directory is a
    /// no-op, binding to a different directory is an error. The layout must
    /// stay below `task_dir`.
    pub fn bind_local_path(&mut self, task_dir: &Path) -> Result<&Path> {
        let relative = self.relative_path.as_ref().ok_or_else(|| {
            Error::Internal(format!("parameter {} has no file layout to bind", self.name))
        })?;
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(Error::invalid_parameter(
                self.name.clone(),
                format!("layout {} escapes the task directory", relative.display()),
            ));
        }
        let resolved = task_dir.join(relative);

        if let Some(existing) = &self.local_path {
            if *existing != resolved {
                return Err(Error::Internal(format!(
                    "parameter {} already bound to {}",
                    self.name,
                    existing.display()
                )));
            }
        }
        Ok(self.local_path.insert(resolved).as_path())
    }

    /// Value exported to the command's environment
    ///
    /// Literals pass through unchanged; file parameters export their local
    /// path and have no value until bound.
    pub fn env_value(&self) -> Option<String> {
        match self.kind {
            ParamKind::Literal => Some(self.value.clone()),
            ParamKind::File => self.local_path.as_ref().map(|p| p.display().to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Labels
// ─────────────────────────────────────────────────────────────────

/// Name/value metadata attached to a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    /// Create a validated label
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let label = Self {
            name: name.into(),
            value: value.into(),
        };
        validate_label(&label.name, &label.value)?;
        Ok(label)
    }
}

// ─────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────

/// Check that a name is usable as a POSIX environment variable
pub fn validate_param_name(name: &str, what: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(Error::invalid_parameter(what, format!("'{}'", name)))
    }
}

/// Check a label name and value against the label rules
pub fn validate_label(name: &str, value: &str) -> Result<()> {
    check_label_rule(name, "label name")?;
    // Empty values are allowed
    if !value.is_empty() {
        check_label_rule(value, "label value")?;
    }
    if RESERVED_LABELS.contains(&name) {
        return Err(Error::invalid_parameter(
            "label name",
            format!("'{}' is reserved (reserved: {})", name, RESERVED_LABELS.join(", ")),
        ));
    }
    Ok(())
}

fn check_label_rule(text: &str, what: &str) -> Result<()> {
    if text.is_empty() || text.chars().count() > 63 {
        return Err(Error::invalid_parameter(
            what,
            format!("'{}' must be 1-63 characters long", text),
        ));
    }
    let mut chars = text.chars();
    let starts_lower = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let rest_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if !starts_lower || !rest_ok {
        return Err(Error::invalid_parameter(
            what,
            format!(
                "'{}' must start with a lowercase letter and contain only lowercase letters, digits, '-' and '_'",
                text
            ),
        ));
    }
    Ok(())
}
