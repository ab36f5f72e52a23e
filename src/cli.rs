// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! The command line is deliberately thin: the job descriptors are produced
//! by an external builder and handed over as a TOML file.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::http::PoolLimits;
use crate::types::Verbosity;

/// Command-line arguments for `nac-runner`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "nac-runner",
    version,
    about = "Supervise test-runner subprocesses and track per-test status.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the runner config file (TOML). Missing file means defaults.
    #[arg(long, value_name = "PATH", default_value = "nac-runner.toml")]
    pub config: String,

    /// Path to the job descriptor file produced by the job builder.
    #[arg(long, value_name = "PATH", default_value = "jobs.toml")]
    pub jobs: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `NAC_RUNNER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Override `[output].verbosity` from the config file.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub verbosity: Option<VerbosityArg>,

    /// Override `[batch].max_parallel_jobs` from the config file.
    #[arg(long, value_name = "N")]
    pub max_parallel_jobs: Option<usize>,

    /// Disable colored completion lines.
    #[arg(long)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Perform one HTTP request read from stdin and print the reply.
    ///
    /// Spawned by the subprocess-proxied HTTP client; not meant for humans.
    #[command(hide = true)]
    HttpProxy(ProxyArgs),
}

/// Pool limits the parent passes down to the helper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct ProxyArgs {
    #[arg(long, value_name = "N")]
    pub max_connections: Option<usize>,

    #[arg(long, value_name = "N")]
    pub max_keepalive: Option<usize>,

    #[arg(long, value_name = "SECS")]
    pub keepalive_expiry_secs: Option<u64>,

    #[arg(long, value_name = "SECS")]
    pub request_timeout_secs: Option<u64>,
}

impl ProxyArgs {
    /// `limits` with every given flag applied over it.
    pub fn apply(&self, mut limits: PoolLimits) -> PoolLimits {
        if let Some(n) = self.max_connections {
            limits.max_connections = n;
        }
        if let Some(n) = self.max_keepalive {
            limits.max_keepalive = n;
        }
        if let Some(secs) = self.keepalive_expiry_secs {
            limits.keepalive_expiry = Duration::from_secs(secs);
        }
        if let Some(secs) = self.request_timeout_secs {
            limits.request_timeout = Duration::from_secs(secs);
        }
        limits
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum VerbosityArg {
    Quiet,
    Normal,
    Verbose,
}

impl From<VerbosityArg> for Verbosity {
    fn from(v: VerbosityArg) -> Self {
        match v {
            VerbosityArg::Quiet => Verbosity::Quiet,
            VerbosityArg::Normal => Verbosity::Normal,
            VerbosityArg::Verbose => Verbosity::Verbose,
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
