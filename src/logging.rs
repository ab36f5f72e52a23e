// src/logging.rs

//! Diagnostics for `nac-runner` itself, via `tracing` + `tracing-subscriber`.
//!
//! The filter comes from `--log-level` if given, else from the
//! `NAC_RUNNER_LOG` environment variable (any `EnvFilter` directive, e.g.
//! `nac_runner::exec=debug,reqwest=warn`), else `info`.
//!
//! Everything goes to stderr. Stdout belongs to the echoed runner output,
//! and in `http-proxy` helper mode to the single proxy reply.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "NAC_RUNNER_LOG";

/// Install the global subscriber. Call once, before anything logs.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(level.as_directive()),
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("installing tracing subscriber")
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}
