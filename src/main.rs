//! batchwork - batch job dispatch with data localization
//!
//! This is the main entry point for the batchwork binary. It parses the
//! command line, builds the tasks of a job and runs them to completion
//! through the job coordinator.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use batchwork::cli::{Cli, Commands, ConfigSubcommand, OutputFormat, SubmitArgs};
use batchwork::config::{self, BatchConfig};
use batchwork::coordinator::{JobCoordinator, JobResult, JobSpec};
use batchwork::error::{Error, Result};
use batchwork::logging;
use batchwork::storage::StoreRegistry;
use batchwork::tasks::{build_tasks, NameAllocator, TasksFile};
use batchwork::types::TaskCommand;
use batchwork::version;

fn main() {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Version => {
            version::print_version();
            Ok(())
        }
        Commands::Config { subcommand } => {
            // Config commands use minimal logging
            logging::init_simple(tracing::Level::WARN)?;
            handle_config_command(subcommand)
        }
        Commands::Cleanup { prefix, config } => {
            let config = BatchConfig::load(config.as_deref())?;
            let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;
            run_cleanup(&config, &prefix)
        }
        Commands::Submit(args) => {
            let mut config = BatchConfig::load(args.config.as_deref())?;
            apply_submit_overrides(&mut config, &args);
            config.validate()?;

            // The guards must be kept alive for the lifetime of the program
            let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;
            info!(version = %version::build_info().full_version(), "Starting batchwork");

            run_submit(config, *args)
        }
    }
}

/// Command-line flags take precedence over every other source
fn apply_submit_overrides(config: &mut BatchConfig, args: &SubmitArgs) {
    if let Some(n) = args.max_parallel {
        config.job.max_parallel_tasks = n;
    }
    if let Some(secs) = args.timeout {
        config.job.task_timeout_secs = secs;
    }
    if let Some(ref root) = args.working_root {
        config.storage.working_root = config::expand_path(root);
    }
    if let Some(ref shell) = args.shell {
        config.job.shell = shell.clone();
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("batchwork")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))
}

// ─────────────────────────────────────────────────────────────────
// Submit
// ─────────────────────────────────────────────────────────────────

fn run_submit(config: BatchConfig, args: SubmitArgs) -> Result<()> {
    // Everything that can be rejected is rejected before a task starts
    let resolver = config.path_resolver()?;
    let mut names = NameAllocator::new();
    let job_params = args.job_args().to_params(&mut names)?;
    let tasks_file = args
        .tasks
        .as_deref()
        .map(|path| TasksFile::load(path, &mut names))
        .transpose()?;

    let shell = config.job.shell.clone();
    let command = match (&args.script, &args.command) {
        (Some(script), _) => TaskCommand::Script {
            shell,
            location: resolver.resolve_script(script)?,
        },
        (None, Some(text)) => TaskCommand::Inline {
            shell,
            text: text.clone(),
        },
        (None, None) => {
            return Err(Error::invalid_parameter(
                "command",
                "one of --script or --command is required",
            ))
        }
    };

    let tasks = build_tasks(
        &resolver,
        Arc::new(command),
        &job_params,
        tasks_file.as_ref(),
        args.task_range.as_ref(),
    )?;

    let logging = args
        .logging
        .as_deref()
        .or(config.storage.logging_root.as_deref())
        .map(|raw| resolver.resolve_logging(raw))
        .transpose()?;

    let stores = Arc::new(StoreRegistry::from_settings(&config.storage)?);
    info!(providers = ?stores.providers(), tasks = tasks.len(), "Job prepared");
    let coordinator = JobCoordinator::new(config.coordinator_config(), stores);

    let runtime = build_runtime()?;
    let result = runtime.block_on(async {
        let handle = coordinator.submit(JobSpec::new(tasks).with_logging(logging))?;
        if args.format == OutputFormat::Text {
            println!("Job {} launched", handle.job_id());
        }

        let finished = async {
            match args.wait_timeout {
                Some(secs) => handle.wait_with_timeout(Duration::from_secs(secs)).await,
                None => handle.wait().await,
            }
        };

        let result = tokio::select! {
            result = finished => result,
            _ = tokio::signal::ctrl_c() => {
                warn!(job_id = %handle.job_id(), "Interrupted, cancelling job");
                handle.cancel();
                handle.wait().await
            }
        };
        Ok::<JobResult, Error>(result)
    })?;

    print_result(&result, args.format)?;

    // Without --wait the exit status reports the launch only
    if args.wait {
        result.ensure_success()?;
    }
    Ok(())
}

fn print_result(result: &JobResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print!("{}", result.render_table()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// Cleanup
// ─────────────────────────────────────────────────────────────────

fn run_cleanup(config: &BatchConfig, prefix: &str) -> Result<()> {
    let location = config.path_resolver()?.resolve(prefix, true)?.location;
    let stores = StoreRegistry::from_settings(&config.storage)?;
    let store = stores.for_location(&location)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create runtime: {}", e)))?;
    let removed = runtime.block_on(store.remove_prefix(location.path()))?;

    info!(prefix = %location.path(), removed, "Prefix cleaned up");
    println!("Removed {} objects under {}", removed, location.path());
    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────

fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = BatchConfig::load(config.as_deref())?;
            match &cfg.source {
                Some(path) => println!("# Loaded from {}", path.display()),
                None => println!("# Built-in defaults"),
            }
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let path = config::init_config(path.as_deref(), force)?;
            println!("Configuration file created: {}", path.display());
        }
        ConfigSubcommand::Validate { config } => {
            let cfg = BatchConfig::load(config.as_deref())?;
            match &cfg.source {
                Some(path) => println!("Configuration is valid: {}", path.display()),
                None => println!("Configuration is valid (defaults)."),
            }
        }
    }

    Ok(())
}
