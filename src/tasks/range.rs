//! Task id ranges (`M`, `M-`, `M-N`)

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::types::TaskId;

/// Inclusive selection of task ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRange {
    pub min: TaskId,
    pub max: Option<TaskId>,
}

impl TaskRange {
    pub fn contains(&self, task_id: TaskId) -> bool {
        task_id >= self.min && self.max.map_or(true, |max| task_id <= max)
    }
}

impl FromStr for TaskRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parse = |part: &str| -> Result<TaskId> {
            let id: TaskId = part.trim().parse().map_err(|_| {
                Error::invalid_parameter("task range", format!("'{}' is not a task number", part))
            })?;
            if id == 0 {
                return Err(Error::invalid_parameter("task range", "task numbers start at 1"));
            }
            Ok(id)
        };

        let range = match s.split_once('-') {
            None => {
                let id = parse(s)?;
                TaskRange { min: id, max: Some(id) }
            }
            Some((min, "")) => TaskRange { min: parse(min)?, max: None },
            Some((min, max)) => TaskRange {
                min: parse(min)?,
                max: Some(parse(max)?),
            },
        };

        if let Some(max) = range.max {
            if max < range.min {
                return Err(Error::invalid_parameter(
                    "task range",
                    format!("'{}' ends before it starts", s),
                ));
            }
        }
        Ok(range)
    }
}

impl fmt::Display for TaskRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{}", self.min),
            Some(max) => write!(f, "{}-{}", self.min, max),
            None => write!(f, "{}-", self.min),
        }
    }
}
