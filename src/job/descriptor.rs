// src/job/descriptor.rs

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{NacRunnerError, Result};

/// One invocation of the test-runner subprocess.
///
/// Produced once per run by the external job builder (which also renders
/// `job_file` and, for single-device runs, `testbed`); consumed read-only by
/// the supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Human-readable job name; also exported to the runner as `NAC_JOB_NAME`.
    pub name: String,

    /// Runner entry script rendered by the builder.
    pub job_file: PathBuf,

    /// Test units this job covers.
    #[serde(default)]
    pub test_units: Vec<PathBuf>,

    /// Parallel workers inside the runner.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Working directory of the runner and location of its archive.
    pub output_dir: PathBuf,

    #[serde(default = "default_archive_name")]
    pub archive_name: String,

    /// Testbed file materialised by the builder for device-bound jobs.
    #[serde(default)]
    pub testbed: Option<PathBuf>,

    #[serde(default)]
    pub device: Option<DeviceBinding>,
}

fn default_workers() -> usize {
    1
}

fn default_archive_name() -> String {
    "results.zip".to_string()
}

impl JobDescriptor {
    pub fn new(
        name: impl Into<String>,
        job_file: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            job_file: job_file.into(),
            test_units: Vec::new(),
            workers: default_workers(),
            output_dir: output_dir.into(),
            archive_name: default_archive_name(),
            testbed: None,
            device: None,
        }
    }

    /// Where the runner is expected to leave its results archive.
    pub fn archive_path(&self) -> PathBuf {
        self.output_dir.join(&self.archive_name)
    }
}

/// Connectivity for a job bound to a single device.
///
/// The password is never placed on the runner's argv; see
/// [`crate::job::command`].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceBinding {
    pub hostname: String,
    pub host: String,
    pub username: String,
    pub password: String,
    pub os_family: String,
}

impl std::fmt::Debug for DeviceBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBinding")
            .field("hostname", &self.hostname)
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("os_family", &self.os_family)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct JobFile {
    #[serde(default)]
    job: Vec<JobDescriptor>,
}

/// Load the `[[job]]` entries written by the job builder.
pub fn load_jobs(path: impl AsRef<Path>) -> Result<Vec<JobDescriptor>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let file: JobFile = toml::from_str(&contents)?;

    for job in &file.job {
        if job.workers == 0 {
            return Err(NacRunnerError::ConfigError(format!(
                "job '{}' must have workers >= 1 (got 0)",
                job.name
            )));
        }
    }

    Ok(file.job)
}
