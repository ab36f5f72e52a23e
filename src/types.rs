use std::str::FromStr;

use serde::Deserialize;

/// How much of the runner's plain (non-event) output is echoed.
///
/// - `Quiet`: only lines carrying a severity keyword (ERROR, FAILED, ...),
///   minus table borders and other decoration.
/// - `Normal`: everything `Quiet` shows, plus lines whose embedded producer
///   log level meets the configured threshold.
/// - `Verbose`: every line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Quiet
    }
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quiet" => Ok(Verbosity::Quiet),
            "normal" => Ok(Verbosity::Normal),
            "verbose" => Ok(Verbosity::Verbose),
            other => Err(format!(
                "invalid verbosity: {other} (expected \"quiet\", \"normal\" or \"verbose\")"
            )),
        }
    }
}

/// Log level embedded by the producer in its own log lines
/// (e.g. `%AETEST-INFO:` or `- WARNING -`).
///
/// Ordered from least to most severe so thresholds compare with `>=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Default for ProducerLevel {
    fn default() -> Self {
        ProducerLevel::Warning
    }
}

impl FromStr for ProducerLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" => Ok(ProducerLevel::Debug),
            "info" => Ok(ProducerLevel::Info),
            "warn" | "warning" => Ok(ProducerLevel::Warning),
            "error" => Ok(ProducerLevel::Error),
            "critical" | "fatal" => Ok(ProducerLevel::Critical),
            other => Err(format!("invalid producer log level: {other}")),
        }
    }
}
