//! batchwork - batch job dispatch with data localization
//!
//! A job is one or more tasks, each described by a row of a tasks file.
//! For every task the engine copies inputs into an isolated working
//! directory, runs a command with the localized paths in its environment,
//! and copies declared outputs back to their destinations.
//!
//! ```no_run
//! use std::sync::Arc;
//! use batchwork::coordinator::{CoordinatorConfig, JobCoordinator, JobSpec};
//! use batchwork::resolver::PathResolver;
//! use batchwork::storage::StoreRegistry;
//! use batchwork::tasks::{build_tasks, JobArgs, NameAllocator};
//! use batchwork::types::TaskCommand;
//!
//! # async fn example() -> batchwork::Result<()> {
//! let args = JobArgs {
//!     inputs: vec!["INPUT_BAM=gs://bucket/sample.bam".into()],
//!     outputs: vec!["OUTPUT_MD5=gs://bucket/sample.md5".into()],
//!     ..Default::default()
//! };
//! let params = args.to_params(&mut NameAllocator::new())?;
//! let command = Arc::new(TaskCommand::Inline {
//!     shell: "/bin/bash".into(),
//!     text: "md5sum \"$INPUT_BAM\" > \"$OUTPUT_MD5\"".into(),
//! });
//! let tasks = build_tasks(&PathResolver::default(), command, &params, None, None)?;
//!
//! let stores = Arc::new(StoreRegistry::from_settings(&Default::default())?);
//! let coordinator = JobCoordinator::new(CoordinatorConfig::default(), stores);
//! let result = coordinator.submit(JobSpec::new(tasks))?.wait().await;
//! result.ensure_success()?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod logging;
pub mod resolver;
pub mod storage;
pub mod tasks;
pub mod types;
pub mod version;

pub use error::{Error, ErrorCode, Result};
