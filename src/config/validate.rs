// src/config/validate.rs

use crate::config::model::{RawRunnerConfig, RunnerConfig};
use crate::errors::{NacRunnerError, Result};

impl TryFrom<RawRunnerConfig> for RunnerConfig {
    type Error = crate::errors::NacRunnerError;

    fn try_from(raw: RawRunnerConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(RunnerConfig::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawRunnerConfig) -> Result<()> {
    validate_runner(cfg)?;
    validate_stream(cfg)?;
    validate_batch(cfg)?;
    validate_http(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> NacRunnerError {
    NacRunnerError::ConfigError(msg.into())
}

fn validate_runner(cfg: &RawRunnerConfig) -> Result<()> {
    if cfg.runner.program.trim().is_empty() {
        return Err(config_error("[runner].program must not be empty"));
    }
    Ok(())
}

fn validate_stream(cfg: &RawRunnerConfig) -> Result<()> {
    let stream = &cfg.stream;

    if stream.event_prefix.is_empty() {
        return Err(config_error("[stream].event_prefix must not be empty"));
    }
    if stream.event_prefix.contains('\n') {
        return Err(config_error(
            "[stream].event_prefix must not contain a line terminator",
        ));
    }
    if stream.max_line_bytes == 0 {
        return Err(config_error("[stream].max_line_bytes must be >= 1 (got 0)"));
    }
    if stream.max_consecutive_overflows == 0 {
        return Err(config_error(
            "[stream].max_consecutive_overflows must be >= 1 (got 0)",
        ));
    }
    Ok(())
}

fn validate_batch(cfg: &RawRunnerConfig) -> Result<()> {
    if cfg.batch.max_parallel_jobs == 0 {
        return Err(config_error(
            "[batch].max_parallel_jobs must be >= 1 (got 0)",
        ));
    }
    Ok(())
}

fn validate_http(cfg: &RawRunnerConfig) -> Result<()> {
    let http = &cfg.http;
    if http.max_connections == 0 {
        return Err(config_error("[http].max_connections must be >= 1 (got 0)"));
    }
    if http.max_keepalive > http.max_connections {
        return Err(config_error(format!(
            "[http].max_keepalive ({}) must not exceed max_connections ({})",
            http.max_keepalive, http.max_connections
        )));
    }
    Ok(())
}
