#![allow(dead_code)]

use std::path::{Path, PathBuf};

use nac_runner::config::{RawRunnerConfig, RunnerConfig};
use nac_runner::job::{DeviceBinding, JobDescriptor};
use nac_runner::types::{ProducerLevel, Verbosity};

/// Builder for `RunnerConfig` to simplify test setup.
///
/// Starts from a config that runs `sh {job_file}` with echo disabled.
pub struct ConfigBuilder {
    config: RawRunnerConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = RawRunnerConfig::default();
        config.runner.program = "sh".to_string();
        config.runner.args = vec!["{job_file}".to_string()];
        config.output.echo = false;
        config.output.color = false;
        config.stream.drain_delay_ms = 10;
        config.stream.drain_timeout_ms = 200;
        Self { config }
    }

    pub fn program(mut self, program: &str, args: &[&str]) -> Self {
        self.config.runner.program = program.to_string();
        self.config.runner.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn max_line_bytes(mut self, n: usize) -> Self {
        self.config.stream.max_line_bytes = n;
        self
    }

    pub fn max_consecutive_overflows(mut self, n: u32) -> Self {
        self.config.stream.max_consecutive_overflows = n;
        self
    }

    pub fn drain(mut self, delay_ms: u64, timeout_ms: u64) -> Self {
        self.config.stream.drain_delay_ms = delay_ms;
        self.config.stream.drain_timeout_ms = timeout_ms;
        self
    }

    pub fn verbosity(mut self, verbosity: Verbosity, threshold: ProducerLevel) -> Self {
        self.config.output.verbosity = verbosity;
        self.config.output.log_threshold = threshold;
        self
    }

    pub fn max_parallel_jobs(mut self, n: usize) -> Self {
        self.config.batch.max_parallel_jobs = n;
        self
    }

    pub fn build(self) -> RunnerConfig {
        RunnerConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `JobDescriptor` rooted in a scratch directory.
///
/// The job file is `<dir>/runner.sh` and the output directory `<dir>/out`.
pub struct JobBuilder {
    job: JobDescriptor,
}

impl JobBuilder {
    pub fn new(name: &str, dir: &Path) -> Self {
        Self {
            job: JobDescriptor::new(name, dir.join("runner.sh"), dir.join("out")),
        }
    }

    pub fn job_file(mut self, path: PathBuf) -> Self {
        self.job.job_file = path;
        self
    }

    pub fn output_dir(mut self, path: PathBuf) -> Self {
        self.job.output_dir = path;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.job.workers = n;
        self
    }

    pub fn archive_name(mut self, name: &str) -> Self {
        self.job.archive_name = name.to_string();
        self
    }

    pub fn testbed(mut self, path: PathBuf) -> Self {
        self.job.testbed = Some(path);
        self
    }

    pub fn test_unit(mut self, path: &str) -> Self {
        self.job.test_units.push(PathBuf::from(path));
        self
    }

    pub fn device(mut self, hostname: &str, host: &str) -> Self {
        self.job.device = Some(DeviceBinding {
            hostname: hostname.to_string(),
            host: host.to_string(),
            username: "admin".to_string(),
            password: "s3cret".to_string(),
            os_family: "nxos".to_string(),
        });
        self
    }

    pub fn build(self) -> JobDescriptor {
        self.job
    }
}
