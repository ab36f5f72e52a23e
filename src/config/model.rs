// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::{ProducerLevel, Verbosity};

/// Top-level runner configuration as read from a TOML file.
///
/// ```toml
/// [runner]
/// program = "pyats"
/// args = ["run", "job", "{job_file}", "--archive-dir", "{output_dir}"]
///
/// [stream]
/// max_line_bytes = 10485760
///
/// [output]
/// verbosity = "normal"
/// log_threshold = "info"
///
/// [batch]
/// max_parallel_jobs = 2
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRunnerConfig {
    #[serde(default)]
    pub runner: RunnerSection,
    #[serde(default)]
    pub stream: StreamSection,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub batch: BatchSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub http: HttpSection,
}

/// Validated configuration. Only obtainable through `TryFrom<RawRunnerConfig>`
/// (see `validate.rs`) or [`RunnerConfig::default`].
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub runner: RunnerSection,
    pub stream: StreamSection,
    pub output: OutputSection,
    pub batch: BatchSection,
    pub auth: AuthSection,
    pub http: HttpSection,
}

impl RunnerConfig {
    pub(crate) fn new_unchecked(raw: RawRunnerConfig) -> Self {
        Self {
            runner: raw.runner,
            stream: raw.stream,
            output: raw.output,
            batch: raw.batch,
            auth: raw.auth,
            http: raw.http,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new_unchecked(RawRunnerConfig::default())
    }
}

/// `[runner]` section: how the test-runner subprocess is invoked.
///
/// `args` may contain the placeholders `{job_file}`, `{output_dir}`,
/// `{archive_name}`, `{testbed}` and `{workers}`; they are substituted per
/// job by [`crate::job::command`].
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSection {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Extra environment variables for every runner process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_program() -> String {
    "pyats".to_string()
}

fn default_args() -> Vec<String> {
    [
        "run",
        "job",
        "{job_file}",
        "--archive-dir",
        "{output_dir}",
        "--archive-name",
        "{archive_name}",
        "--no-archive-subdir",
        "--no-mail",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            env: BTreeMap::new(),
        }
    }
}

/// `[stream]` section: stdout protocol handling.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSection {
    #[serde(default = "default_event_prefix")]
    pub event_prefix: String,

    /// Ceiling for a single output line. Longer lines are discarded up to
    /// the next line terminator.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,

    /// After this many oversized lines in a row, stop interpreting the
    /// stream and only drain it.
    #[serde(default = "default_max_consecutive_overflows")]
    pub max_consecutive_overflows: u32,

    #[serde(default = "default_drain_delay_ms")]
    pub drain_delay_ms: u64,

    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_event_prefix() -> String {
    crate::protocol::EVENT_PREFIX.to_string()
}

fn default_max_line_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_max_consecutive_overflows() -> u32 {
    3
}

fn default_drain_delay_ms() -> u64 {
    100
}

fn default_drain_timeout_ms() -> u64 {
    1000
}

impl StreamSection {
    pub fn drain_delay(&self) -> Duration {
        Duration::from_millis(self.drain_delay_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            event_prefix: default_event_prefix(),
            max_line_bytes: default_max_line_bytes(),
            max_consecutive_overflows: default_max_consecutive_overflows(),
            drain_delay_ms: default_drain_delay_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

/// `[output]` section: console echo of runner output.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputSection {
    #[serde(default)]
    pub verbosity: Verbosity,

    /// Minimum embedded producer level shown at `normal` verbosity.
    #[serde(default)]
    pub log_threshold: ProducerLevel,

    #[serde(default = "default_true")]
    pub echo: bool,

    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_true() -> bool {
    true
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::default(),
            log_threshold: ProducerLevel::default(),
            echo: true,
            color: true,
        }
    }
}

/// `[batch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSection {
    #[serde(default = "default_max_parallel_jobs")]
    pub max_parallel_jobs: usize,
}

fn default_max_parallel_jobs() -> usize {
    1
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            max_parallel_jobs: default_max_parallel_jobs(),
        }
    }
}

/// `[auth]` section: controller credential cache.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSection {
    /// Shared by every process of the same user. `None` means
    /// `<tmp>/nac-runner-auth`.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Subtracted from the real credential lifetime before it is cached.
    #[serde(default = "default_safety_margin_secs")]
    pub safety_margin_secs: u64,
}

fn default_lock_timeout_ms() -> u64 {
    30_000
}

fn default_safety_margin_secs() -> u64 {
    60
}

impl AuthSection {
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("nac-runner-auth"))
    }
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            cache_dir: None,
            lock_timeout_ms: default_lock_timeout_ms(),
            safety_margin_secs: default_safety_margin_secs(),
        }
    }
}

/// `[http]` section: shared connection limits.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpSection {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_max_keepalive")]
    pub max_keepalive: usize,

    #[serde(default = "default_keepalive_expiry_secs")]
    pub keepalive_expiry_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_connections() -> usize {
    100
}

fn default_max_keepalive() -> usize {
    20
}

fn default_keepalive_expiry_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_keepalive: default_max_keepalive(),
            keepalive_expiry_secs: default_keepalive_expiry_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
