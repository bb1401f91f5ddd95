//! Tasks file parser
//!
//! A tasks file is tab-separated text. The first non-blank line is the
//! header; every following non-blank line describes one task.
//!
//! Header columns:
//!
//! | header                    | meaning                                  |
//! |---------------------------|------------------------------------------|
//! | `--env NAME` or `NAME`    | literal value exported as `$NAME`        |
//! | `--label NAME`            | task label, not exported                 |
//! | `--input [NAME]`          | input file or filename wildcard          |
//! | `--input-recursive [NAME]`| input directory                          |
//! | `--output [NAME]`         | output file or filename wildcard         |
//! | `--output-recursive [NAME]`| output directory                        |
//!
//! Unnamed file columns get `INPUT_n` / `OUTPUT_n` names.

use std::collections::HashSet;
use std::path::Path;

use tracing::debug;

use super::{NameAllocator, TaskRange};
use crate::error::{Error, Result};
use crate::types::{validate_label, validate_param_name, Direction, TaskId};

// ─────────────────────────────────────────────────────────────────
// Columns
// ─────────────────────────────────────────────────────────────────

/// What a column declares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Env,
    Label,
    Input { recursive: bool },
    Output { recursive: bool },
}

impl ColumnKind {
    pub fn file(direction: Direction, recursive: bool) -> Self {
        match direction {
            Direction::Input => ColumnKind::Input { recursive },
            Direction::Output => ColumnKind::Output { recursive },
        }
    }

    /// Direction of a file column
    pub fn direction(&self) -> Option<Direction> {
        match self {
            ColumnKind::Input { .. } => Some(Direction::Input),
            ColumnKind::Output { .. } => Some(Direction::Output),
            ColumnKind::Env | ColumnKind::Label => None,
        }
    }

    pub fn is_recursive(&self) -> bool {
        matches!(
            self,
            ColumnKind::Input { recursive: true } | ColumnKind::Output { recursive: true }
        )
    }

    fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "--env" => Some(ColumnKind::Env),
            "--label" => Some(ColumnKind::Label),
            "--input" => Some(ColumnKind::Input { recursive: false }),
            "--input-recursive" => Some(ColumnKind::Input { recursive: true }),
            "--output" => Some(ColumnKind::Output { recursive: false }),
            "--output-recursive" => Some(ColumnKind::Output { recursive: true }),
            _ => None,
        }
    }
}

/// A named column of a tasks file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tasks File
// ─────────────────────────────────────────────────────────────────

/// One data row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
    pub task_id: TaskId,
    /// 1-based line number in the file
    pub line: usize,
    pub fields: Vec<String>,
}

/// A parsed tasks file
#[derive(Debug, Clone)]
pub struct TasksFile {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<TaskRow>,
}

impl TasksFile {
    /// Read and parse a tasks file from disk
    pub fn load(path: &Path, names: &mut NameAllocator) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::IoRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file = Self::parse(&text, names)?;
        debug!(
            path = %path.display(),
            columns = file.columns.len(),
            rows = file.rows.len(),
            "Loaded tasks file"
        );
        Ok(file)
    }

    /// Parse tasks file text
    pub fn parse(text: &str, names: &mut NameAllocator) -> Result<Self> {
        let mut lines = text
            .split('\n')
            .enumerate()
            .map(|(idx, line)| (idx + 1, line.strip_suffix('\r').unwrap_or(line)))
            .filter(|(_, line)| !line.trim().is_empty());

        let (header_line, header) = lines
            .next()
            .ok_or_else(|| Error::malformed(1, "missing header line"))?;
        let columns = parse_header(header_line, header, names)?;

        let mut rows = Vec::new();
        for (line, text) in lines {
            let fields: Vec<String> = text.split('\t').map(str::to_string).collect();
            if fields.len() != columns.len() {
                return Err(Error::malformed(
                    line,
                    format!("expected {} fields, found {}", columns.len(), fields.len()),
                ));
            }
            rows.push(TaskRow {
                task_id: next_task_id(rows.len(), line)?,
                line,
                fields,
            });
        }

        Ok(Self { columns, rows })
    }

    /// Rows inside `range`, failing when none remain
    pub fn select(&self, range: Option<&TaskRange>) -> Result<Vec<&TaskRow>> {
        let selected: Vec<&TaskRow> = self
            .rows
            .iter()
            .filter(|row| range.map_or(true, |r| r.contains(row.task_id)))
            .collect();

        if selected.is_empty() {
            let message = match range {
                Some(r) if !self.rows.is_empty() => format!("no tasks in range {}", r),
                _ => "no tasks after the header".to_string(),
            };
            return Err(Error::malformed(1, message));
        }
        Ok(selected)
    }
}

fn parse_header(line: usize, header: &str, names: &mut NameAllocator) -> Result<Vec<ColumnSpec>> {
    let mut columns = Vec::new();
    let mut seen_params = HashSet::new();
    let mut seen_labels = HashSet::new();

    for col in header.split('\t') {
        let col = col.trim();
        let (kind, name) = if col.starts_with('-') {
            let (flag, name) = split_header(col);
            let kind = ColumnKind::from_flag(flag)
                .ok_or_else(|| Error::malformed(line, format!("unrecognized column header '{}'", col)))?;
            (kind, name)
        } else {
            (ColumnKind::Env, Some(col))
        };

        let name = match kind.direction() {
            Some(direction) => names.name_or_next(name, direction),
            None => match name {
                Some(n) if !n.is_empty() => n.to_string(),
                _ => return Err(Error::malformed(line, format!("column '{}' has no name", col))),
            },
        };

        if kind == ColumnKind::Label {
            validate_label(&name, "").map_err(|e| Error::malformed(line, e.to_string()))?;
            if !seen_labels.insert(name.clone()) {
                return Err(Error::malformed(line, format!("duplicate label column '{}'", name)));
            }
        } else {
            validate_param_name(&name, "column name").map_err(|e| Error::malformed(line, e.to_string()))?;
            if !seen_params.insert(name.clone()) {
                return Err(Error::malformed(line, format!("duplicate column name '{}'", name)));
            }
        }

        columns.push(ColumnSpec { name, kind });
    }

    Ok(columns)
}

/// Id of the row following `count` parsed rows
fn next_task_id(count: usize, line: usize) -> Result<TaskId> {
    count
        .checked_add(1)
        .and_then(|id| TaskId::try_from(id).ok())
        .ok_or_else(|| Error::malformed(line, "too many tasks"))
}

/// Split `--flag NAME` at the first space
fn split_header(col: &str) -> (&str, Option<&str>) {
    match col.split_once(' ') {
        Some((flag, name)) => (flag, Some(name.trim())),
        None => (col, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<TasksFile> {
        TasksFile::parse(text, &mut NameAllocator::new())
    }

    #[test]
    fn test_task_id_overflow_is_malformed() {
        assert_eq!(next_task_id(0, 2).unwrap(), 1);
        assert_eq!(next_task_id(TaskId::MAX as usize - 1, 9).unwrap(), TaskId::MAX);
        match next_task_id(TaskId::MAX as usize, 9).unwrap_err() {
            Error::MalformedTasksFile { line, .. } => assert_eq!(line, 9),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_rows_in_order() {
        let text = "--input input_bam\t--output output_md5\n\
                    gs://bucket/a.bam\tgs://bucket/out/a.md5\n\
                    gs://bucket/b.bam\tgs://bucket/out/b.md5\n\
                    gs://bucket/c.bam\tgs://bucket/out/c.md5\n";
        let file = parse(text).unwrap();

        assert_eq!(file.columns.len(), 2);
        assert_eq!(file.columns[0], ColumnSpec::new("input_bam", ColumnKind::Input { recursive: false }));
        assert_eq!(file.columns[1].kind, ColumnKind::Output { recursive: false });

        assert_eq!(file.rows.len(), 3);
        let ids: Vec<_> = file.rows.iter().map(|r| r.task_id).collect();
        assert_eq!(ids, [1, 2, 3]);
        assert_eq!(file.rows[1].fields[0], "gs://bucket/b.bam");
        assert_eq!(file.rows[1].line, 3);
    }

    #[test]
    fn test_header_forms() {
        let text = "SAMPLE\t--env REF\t--label batch\t--input\t--input-recursive\t--output-recursive OUT\n\
                    s1\thg38\tb1\tgs://b/a.bam\tgs://b/dir/\tgs://b/out/\n";
        let file = parse(text).unwrap();
        let kinds: Vec<_> = file.columns.iter().map(|c| (c.name.as_str(), c.kind)).collect();
        assert_eq!(
            kinds,
            [
                ("SAMPLE", ColumnKind::Env),
                ("REF", ColumnKind::Env),
                ("batch", ColumnKind::Label),
                ("INPUT_0", ColumnKind::Input { recursive: false }),
                ("INPUT_1", ColumnKind::Input { recursive: true }),
                ("OUT", ColumnKind::Output { recursive: true }),
            ]
        );
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let text = "--env A\r\n\r\n1\r\n\n2\r\n";
        let file = parse(text).unwrap();
        assert_eq!(file.rows.len(), 2);
        assert_eq!(file.rows[0].fields, ["1"]);
        assert_eq!(file.rows[1].fields, ["2"]);
    }

    #[test]
    fn test_short_row_is_malformed() {
        let text = "--input IN\t--output OUT\ngs://b/a\tgs://b/o\ngs://b/c\n";
        let err = parse(text).unwrap_err();
        match err {
            Error::MalformedTasksFile { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("expected 2 fields, found 1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_header() {
        assert!(matches!(parse(""), Err(Error::MalformedTasksFile { .. })));
        assert!(matches!(parse("\n\n"), Err(Error::MalformedTasksFile { .. })));
    }

    #[test]
    fn test_bad_headers() {
        assert!(parse("--bogus X\n1\n").is_err());
        assert!(parse("--env\n1\n").is_err());
        assert!(parse("--env 1X\n1\n").is_err());
        assert!(parse("--label Batch\nx\n").is_err());
        assert!(parse("--label job-id\nx\n").is_err());
    }

    #[test]
    fn test_duplicate_names_across_directions() {
        assert!(parse("--input X\t--output X\ngs://b/a\tgs://b/o\n").is_err());
        assert!(parse("X\t--input X\n1\tgs://b/a\n").is_err());
        // Labels live in their own namespace
        assert!(parse("--env batch\t--label batch\n1\tb\n").is_ok());
    }

    #[test]
    fn test_select_range() {
        let file = parse("A\n1\n2\n3\n4\n").unwrap();
        assert_eq!(file.select(None).unwrap().len(), 4);

        let range: TaskRange = "2-3".parse().unwrap();
        let rows = file.select(Some(&range)).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.task_id).collect();
        assert_eq!(ids, [2, 3]);

        let range: TaskRange = "9-".parse().unwrap();
        assert!(file.select(Some(&range)).is_err());
    }

    #[test]
    fn test_header_only_has_no_tasks() {
        let file = parse("--input IN\n").unwrap();
        let err = file.select(None).unwrap_err();
        assert!(err.to_string().contains("no tasks"));
    }

    #[test]
    fn test_shared_name_allocator() {
        let mut names = NameAllocator::new();
        names.name_or_next(None, Direction::Input);
        let file = TasksFile::parse("--input\ngs://b/a\n", &mut names).unwrap();
        assert_eq!(file.columns[0].name, "INPUT_1");
    }
}
