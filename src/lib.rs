// src/lib.rs

pub mod archive;
pub mod auth;
pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod http;
pub mod job;
pub mod logging;
pub mod output;
pub mod protocol;
pub mod types;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::archive::{extracted_dir, recover_job_statuses};
use crate::cli::CliArgs;
use crate::config::{RunnerConfig, load_or_default};
use crate::exec::{BatchReport, BatchRunner, SharedProcessor, SubprocessSupervisor};
use crate::job::load_jobs;
use crate::output::OutputProcessor;

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - config loading and CLI overrides
/// - job descriptors from the job builder
/// - the shared output processor and the batch executor
/// - Ctrl-C handling
/// - archive fallback for jobs whose live stream carried nothing usable
pub async fn run(args: CliArgs) -> Result<i32> {
    let cfg = load_config(&args)?;

    let jobs = load_jobs(&args.jobs)
        .with_context(|| format!("loading job descriptors from '{}'", args.jobs))?;
    if jobs.is_empty() {
        warn!(jobs = %args.jobs, "no jobs to run");
        return Ok(0);
    }

    let processor: SharedProcessor = Arc::new(Mutex::new(OutputProcessor::from_config(&cfg)));
    let supervisor = SubprocessSupervisor::new(&cfg, Arc::clone(&processor));
    let runner = BatchRunner::new(supervisor, cfg.batch.max_parallel_jobs);

    // Ctrl-C → stop runners and report what we have.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            cancel.cancel();
        });
    }

    let archive_dirs: Vec<PathBuf> = jobs.iter().map(|j| extracted_dir(&j.archive_path())).collect();

    let mut report = runner
        .run(jobs, Vec::new(), cancel, || {
            lock(&processor).table().clone()
        })
        .await;

    if recover_job_statuses(&report.results, &archive_dirs, &processor) > 0 {
        report.table = lock(&processor).table().clone();
    }

    print_summary(&report);
    Ok(report.exit_code())
}

fn load_config(args: &CliArgs) -> Result<RunnerConfig> {
    let mut cfg = load_or_default(&args.config)
        .with_context(|| format!("loading config from '{}'", args.config))?;

    if let Some(verbosity) = args.verbosity {
        cfg.output.verbosity = verbosity.into();
    }
    if let Some(n) = args.max_parallel_jobs {
        if n == 0 {
            bail!("--max-parallel-jobs must be >= 1");
        }
        cfg.batch.max_parallel_jobs = n;
    }
    if args.no_color {
        cfg.output.color = false;
    }

    debug!(?cfg, "effective configuration");
    Ok(cfg)
}

fn lock(processor: &SharedProcessor) -> std::sync::MutexGuard<'_, OutputProcessor> {
    processor.lock().unwrap_or_else(PoisonError::into_inner)
}

fn print_summary(report: &BatchReport) {
    let counts = report.table.counts();

    println!();
    println!(
        "tests: {} total, {} passed, {} failed, {} errored, {} skipped",
        counts.total(),
        counts.passed,
        counts.failed,
        counts.errored,
        counts.skipped
    );

    for archive in report.archives() {
        println!("  archive: {}", archive.path.display());
    }
    for (job, failure) in report.execution_failures() {
        println!("  execution failed: {job}: {failure}");
    }
    if report.unfinished() > 0 {
        println!("  unfinished: {}", report.unfinished());
    }
}
