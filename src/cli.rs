//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for batchwork.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::tasks::{JobArgs, TaskRange};

/// batchwork - batch job dispatch with data localization
///
/// Runs a command once per task of a tasks file, copying inputs into a
/// per-task working directory beforehand and outputs back afterwards.
#[derive(Parser, Debug)]
#[command(name = "batchwork")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a job
    Submit(Box<SubmitArgs>),

    /// Remove every object under a prefix
    Cleanup {
        /// Prefix to remove (gs://bucket/path/ or a local directory)
        #[arg(long)]
        prefix: String,

        /// Path to configuration file
        #[arg(short, long, env = "BATCHWORK_CONFIG")]
        config: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Display version and build information
    Version,
}

/// How job results are printed
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Arguments of `submit`
#[derive(Args, Debug, Clone)]
pub struct SubmitArgs {
    /// Path to configuration file
    #[arg(short, long, env = "BATCHWORK_CONFIG")]
    pub config: Option<String>,

    /// Script to run in each task (local path or gs:// URI)
    #[arg(long, conflicts_with = "command", required_unless_present = "command")]
    pub script: Option<String>,

    /// Command text to run in each task with `<shell> -c`
    #[arg(long)]
    pub command: Option<String>,

    /// Tab-separated tasks file, one task per row
    #[arg(long, value_name = "FILE")]
    pub tasks: Option<PathBuf>,

    /// Tasks to run: M, M- or M-N (1-based)
    #[arg(long, value_name = "RANGE", requires = "tasks")]
    pub task_range: Option<TaskRange>,

    /// Environment variable for every task
    #[arg(long = "env", value_name = "NAME=VALUE")]
    pub envs: Vec<String>,

    /// Label for every task
    #[arg(long = "label", value_name = "NAME=VALUE")]
    pub labels: Vec<String>,

    /// Input file for every task
    #[arg(long = "input", value_name = "[NAME=]URI")]
    pub inputs: Vec<String>,

    /// Input directory for every task
    #[arg(long = "input-recursive", value_name = "[NAME=]URI")]
    pub inputs_recursive: Vec<String>,

    /// Output file for every task
    #[arg(long = "output", value_name = "[NAME=]URI")]
    pub outputs: Vec<String>,

    /// Output directory for every task
    #[arg(long = "output-recursive", value_name = "[NAME=]URI")]
    pub outputs_recursive: Vec<String>,

    /// Where task logs are uploaded (a directory, or a path ending in .log)
    #[arg(long, value_name = "URI")]
    pub logging: Option<String>,

    /// Wait for the job and exit non-zero unless every task succeeds
    #[arg(long)]
    pub wait: bool,

    /// Wall-clock limit per task command in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Cancel the job if it runs longer than this many seconds
    #[arg(long, value_name = "SECS", requires = "wait")]
    pub wait_timeout: Option<u64>,

    /// Maximum tasks running at once (0 = number of CPUs)
    #[arg(long, value_name = "N")]
    pub max_parallel: Option<usize>,

    /// Root of the per-task working directories
    #[arg(long, value_name = "DIR")]
    pub working_root: Option<String>,

    /// Shell used to run the command or script
    #[arg(long)]
    pub shell: Option<String>,

    /// Output format of the job result
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl SubmitArgs {
    /// Job-wide parameter flags
    pub fn job_args(&self) -> JobArgs {
        JobArgs {
            envs: self.envs.clone(),
            labels: self.labels.clone(),
            inputs: self.inputs.clone(),
            inputs_recursive: self.inputs_recursive.clone(),
            outputs: self.outputs.clone(),
            outputs_recursive: self.outputs_recursive.clone(),
        }
    }
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long, env = "BATCHWORK_CONFIG")]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}
