//! Job-wide parameters given as command-line flags

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::types::{validate_label, validate_param_name, Direction};

use super::{ColumnKind, ColumnSpec};

/// Split `NAME=VALUE` at the first `=`
pub fn split_pair(pair: &str) -> (&str, Option<&str>) {
    match pair.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (pair, None),
    }
}

// ─────────────────────────────────────────────────────────────────
// Name Allocation
// ─────────────────────────────────────────────────────────────────

/// Hands out `INPUT_n` / `OUTPUT_n` names for unnamed file parameters
///
/// One allocator is shared by the command-line flags and the tasks file
/// header of a job so generated names never collide.
#[derive(Debug, Default)]
pub struct NameAllocator {
    next_input: usize,
    next_output: usize,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `name`, or the next generated name when it is absent or empty
    pub fn name_or_next(&mut self, name: Option<&str>, direction: Direction) -> String {
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        let index = match direction {
            Direction::Input => &mut self.next_input,
            Direction::Output => &mut self.next_output,
        };
        let generated = format!("{}{}", direction.auto_prefix(), index);
        *index += 1;
        generated
    }
}

// ─────────────────────────────────────────────────────────────────
// Parameter Values
// ─────────────────────────────────────────────────────────────────

/// A declared parameter with its raw value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamValue {
    pub spec: ColumnSpec,
    pub value: String,
}

/// Raw job-wide parameter flags
#[derive(Debug, Clone, Default)]
pub struct JobArgs {
    /// `NAME=VALUE`
    pub envs: Vec<String>,
    /// `name=value` or `name`
    pub labels: Vec<String>,
    /// `[NAME=]URI`
    pub inputs: Vec<String>,
    pub inputs_recursive: Vec<String>,
    pub outputs: Vec<String>,
    pub outputs_recursive: Vec<String>,
}

impl JobArgs {
    /// Whether no parameter flags were given
    pub fn is_empty(&self) -> bool {
        self.envs.is_empty()
            && self.labels.is_empty()
            && self.inputs.is_empty()
            && self.inputs_recursive.is_empty()
            && self.outputs.is_empty()
            && self.outputs_recursive.is_empty()
    }

    /// Validate the flags and name every file parameter
    pub fn to_params(&self, names: &mut NameAllocator) -> Result<Vec<ParamValue>> {
        let mut params = Vec::new();
        let mut seen = HashSet::new();
        let mut seen_labels = HashSet::new();

        for env in &self.envs {
            let (name, value) = split_pair(env);
            validate_param_name(name, "environment variable name")?;
            claim(&mut seen, name)?;
            params.push(ParamValue {
                spec: ColumnSpec::new(name, ColumnKind::Env),
                value: value.unwrap_or_default().to_string(),
            });
        }

        for label in &self.labels {
            let (name, value) = split_pair(label);
            let value = value.unwrap_or_default();
            validate_label(name, value)?;
            claim(&mut seen_labels, name)?;
            params.push(ParamValue {
                spec: ColumnSpec::new(name, ColumnKind::Label),
                value: value.to_string(),
            });
        }

        let files = [
            (&self.inputs, Direction::Input, false),
            (&self.inputs_recursive, Direction::Input, true),
            (&self.outputs, Direction::Output, false),
            (&self.outputs_recursive, Direction::Output, true),
        ];
        for (args, direction, recursive) in files {
            let kind = ColumnKind::file(direction, recursive);
            for arg in args {
                let (name, uri) = split_file_arg(arg);
                let name = names.name_or_next(name, direction);
                validate_param_name(&name, &format!("{} name", direction))?;
                claim(&mut seen, &name)?;
                params.push(ParamValue {
                    spec: ColumnSpec::new(name, kind),
                    value: uri.to_string(),
                });
            }
        }

        Ok(params)
    }
}

/// Split `[NAME=]URI`; the name is absent when there is no `=`
fn split_file_arg(arg: &str) -> (Option<&str>, &str) {
    match arg.split_once('=') {
        Some((name, uri)) => (Some(name), uri),
        None => (None, arg),
    }
}

fn claim(seen: &mut HashSet<String>, name: &str) -> Result<()> {
    if seen.insert(name.to_string()) {
        Ok(())
    } else {
        Err(Error::invalid_parameter("parameter", format!("'{}' is declared more than once", name)))
    }
}
