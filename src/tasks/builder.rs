//! Turn parsed parameters into task descriptors

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use super::{ColumnKind, ColumnSpec, ParamValue, TaskRange, TasksFile};
use crate::error::{Error, Result};
use crate::resolver::PathResolver;
use crate::types::{Label, ParameterBinding, TaskCommand, TaskDescriptor, TaskId};

/// Build the tasks of a job
///
/// Without a tasks file the job-wide parameters define a single task with
/// id 1. With one, every selected row becomes a task and the job-wide
/// parameters are added to each of them.
pub fn build_tasks(
    resolver: &PathResolver,
    command: Arc<TaskCommand>,
    job_params: &[ParamValue],
    tasks_file: Option<&TasksFile>,
    range: Option<&TaskRange>,
) -> Result<Vec<TaskDescriptor>> {
    let file = match tasks_file {
        None => {
            let task = build_task(resolver, &command, 1, job_params.iter().map(as_pair))?;
            return Ok(vec![task]);
        }
        Some(file) => file,
    };

    check_column_clashes(job_params, &file.columns)?;

    let rows = file.select(range)?;
    let mut tasks = Vec::with_capacity(rows.len());
    for row in rows {
        let values = job_params
            .iter()
            .map(as_pair)
            .chain(file.columns.iter().zip(row.fields.iter().map(String::as_str)));
        let task = build_task(resolver, &command, row.task_id, values)
            .map_err(|e| at_line(e, row.line))?;
        tasks.push(task);
    }

    info!(tasks = tasks.len(), "Built task descriptors");
    Ok(tasks)
}

fn as_pair(param: &ParamValue) -> (&ColumnSpec, &str) {
    (&param.spec, param.value.as_str())
}

fn build_task<'a>(
    resolver: &PathResolver,
    command: &Arc<TaskCommand>,
    task_id: TaskId,
    values: impl IntoIterator<Item = (&'a ColumnSpec, &'a str)>,
) -> Result<TaskDescriptor> {
    let mut params = Vec::new();
    let mut labels = Vec::new();

    for (spec, value) in values {
        match spec.kind {
            ColumnKind::Env => params.push(ParameterBinding::literal(&spec.name, value)),
            ColumnKind::Label => labels.push(Label::new(&spec.name, value)?),
            ColumnKind::Input { recursive } | ColumnKind::Output { recursive } => {
                let direction = spec.kind.direction().ok_or_else(|| {
                    Error::Internal(format!("column {} has no direction", spec.name))
                })?;
                params.push(resolver.resolve_file(&spec.name, direction, recursive, value)?);
            }
        }
    }

    Ok(TaskDescriptor::new(task_id, params, labels, Arc::clone(command)))
}

fn check_column_clashes(job_params: &[ParamValue], columns: &[ColumnSpec]) -> Result<()> {
    let key = |spec: &ColumnSpec| (spec.kind == ColumnKind::Label, spec.name.clone());
    let declared: HashSet<_> = job_params.iter().map(|p| key(&p.spec)).collect();

    for column in columns {
        if declared.contains(&key(column)) {
            return Err(Error::malformed(
                1,
                format!("column '{}' is also given on the command line", column.name),
            ));
        }
    }
    Ok(())
}

/// Attach the tasks file line to a per-row validation error
fn at_line(err: Error, line: usize) -> Error {
    match err {
        Error::InvalidParameter { what, message } => {
            Error::malformed(line, format!("invalid {}: {}", what, message))
        }
        Error::UnresolvableLocation { location, reason } => Error::UnresolvableLocation {
            location,
            reason: format!("{} (tasks file line {})", reason, line),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{JobArgs, NameAllocator};
    use crate::types::{Direction, TaskStatus};

    fn command() -> Arc<TaskCommand> {
        Arc::new(TaskCommand::Inline {
            shell: "/bin/bash".into(),
            text: "true".into(),
        })
    }

    #[test]
    fn test_single_task_from_flags() {
        let args = JobArgs {
            envs: vec!["SAMPLE=NA12878".into()],
            inputs: vec!["IN=gs://bucket/sample.bam".into()],
            ..Default::default()
        };
        let params = args.to_params(&mut NameAllocator::new()).unwrap();
        let tasks = build_tasks(&PathResolver::default(), command(), &params, None, None).unwrap();

        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];
        assert_eq!(task.task_id, 1);
        assert_eq!(task.status(), TaskStatus::Pending);
        assert_eq!(task.param("SAMPLE").unwrap().value, "NA12878");
        assert_eq!(task.param("IN").unwrap().direction, Direction::Input);
    }

    #[test]
    fn test_rows_become_tasks() {
        let mut names = NameAllocator::new();
        let args = JobArgs {
            envs: vec!["REF=hg38".into()],
            labels: vec!["batch=b1".into()],
            ..Default::default()
        };
        let params = args.to_params(&mut names).unwrap();
        let file = TasksFile::parse(
            "--input input_bam\t--output output_md5\t--label sample\n\
             gs://bucket/a.bam\tgs://bucket/out/a.md5\ta\n\
             gs://bucket/b.bam\tgs://bucket/out/b.md5\tb\n",
            &mut names,
        )
        .unwrap();

        let tasks = build_tasks(&PathResolver::default(), command(), &params, Some(&file), None).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].task_id, 2);
        assert_eq!(tasks[1].param("REF").unwrap().value, "hg38");
        assert_eq!(
            tasks[1].param("input_bam").unwrap().location.as_ref().unwrap().uri(),
            "gs://bucket/b.bam"
        );
        assert_eq!(tasks[1].labels.len(), 2);
        assert_eq!(tasks[1].labels[1].value, "b");
        assert!(Arc::ptr_eq(&tasks[0].command, &tasks[1].command));
    }

    #[test]
    fn test_flag_column_clash() {
        let mut names = NameAllocator::new();
        let args = JobArgs {
            envs: vec!["X=1".into()],
            ..Default::default()
        };
        let params = args.to_params(&mut names).unwrap();
        let file = TasksFile::parse("--env X\n2\n", &mut names).unwrap();

        let err = build_tasks(&PathResolver::default(), command(), &params, Some(&file), None).unwrap_err();
        assert!(matches!(err, Error::MalformedTasksFile { .. }));
    }

    #[test]
    fn test_bad_location_reports_line() {
        let file = TasksFile::parse("--input IN\ngs://bucket/a\ns3://bucket/b\n", &mut NameAllocator::new()).unwrap();
        let err = build_tasks(&PathResolver::default(), command(), &[], Some(&file), None).unwrap_err();
        assert!(matches!(err, Error::UnresolvableLocation { .. }));
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_bad_label_value_is_malformed() {
        let file = TasksFile::parse("--label batch\nNOT_LOWER\n", &mut NameAllocator::new()).unwrap();
        let err = build_tasks(&PathResolver::default(), command(), &[], Some(&file), None).unwrap_err();
        assert!(matches!(err, Error::MalformedTasksFile { line: 2, .. }));
    }
}
