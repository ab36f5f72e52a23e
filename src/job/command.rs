// src/job/command.rs

//! Materialise a [`JobDescriptor`] into the runner's argv, environment and
//! working directory.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use crate::config::{RunnerSection, StreamSection};
use crate::job::JobDescriptor;

pub const ENV_PROGRESS: &str = "NAC_PROGRESS";
pub const ENV_PROGRESS_PREFIX: &str = "NAC_PROGRESS_PREFIX";
pub const ENV_JOB_NAME: &str = "NAC_JOB_NAME";
pub const ENV_TEST_UNITS: &str = "NAC_TEST_UNITS";
pub const ENV_MAX_WORKERS: &str = "NAC_MAX_WORKERS";
pub const ENV_DEVICE_HOST: &str = "NAC_DEVICE_HOST";
pub const ENV_DEVICE_HOSTNAME: &str = "NAC_DEVICE_HOSTNAME";
pub const ENV_DEVICE_USERNAME: &str = "NAC_DEVICE_USERNAME";
pub const ENV_DEVICE_PASSWORD: &str = "NAC_DEVICE_PASSWORD";
pub const ENV_DEVICE_OS: &str = "NAC_DEVICE_OS";

/// Fully resolved runner invocation for one job.
#[derive(Debug, Clone)]
pub struct RunnerInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: PathBuf,
}

impl RunnerInvocation {
    /// Build the tokio command: explicit cwd, piped stdout/stderr, no stdin,
    /// killed if the supervising future is dropped.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        cmd
    }
}

/// Resolve argv/env/cwd for `job`.
///
/// Environment precedence (later wins): `[runner].env`, job-derived
/// `NAC_*` variables, then `extra_env` from the caller.
pub fn materialize(
    runner: &RunnerSection,
    stream: &StreamSection,
    job: &JobDescriptor,
    extra_env: &[(String, String)],
) -> io::Result<RunnerInvocation> {
    let args = substitute_args(&runner.args, job);

    let mut env: Vec<(String, String)> = runner
        .env
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    env.push(("PYTHONUNBUFFERED".into(), "1".into()));
    env.push((ENV_PROGRESS.into(), "1".into()));
    env.push((ENV_PROGRESS_PREFIX.into(), stream.event_prefix.clone()));
    env.push((ENV_JOB_NAME.into(), job.name.clone()));
    env.push((ENV_MAX_WORKERS.into(), job.workers.to_string()));

    if !job.test_units.is_empty() {
        let joined = std::env::join_paths(&job.test_units).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("test unit paths cannot be joined: {e}"),
            )
        })?;
        env.push((ENV_TEST_UNITS.into(), joined.to_string_lossy().into_owned()));
    }

    if let Some(device) = &job.device {
        env.push((ENV_DEVICE_HOSTNAME.into(), device.hostname.clone()));
        env.push((ENV_DEVICE_HOST.into(), device.host.clone()));
        env.push((ENV_DEVICE_USERNAME.into(), device.username.clone()));
        env.push((ENV_DEVICE_PASSWORD.into(), device.password.clone()));
        env.push((ENV_DEVICE_OS.into(), device.os_family.clone()));
    }

    env.extend(extra_env.iter().cloned());

    Ok(RunnerInvocation {
        program: runner.program.clone(),
        args,
        env,
        cwd: job.output_dir.clone(),
    })
}

/// Substitute `{placeholder}`s in the configured args.
///
/// An arg referencing a placeholder with no value for this job (only
/// `{testbed}` can be absent) is dropped, together with the flag right
/// before it (`--testbed-file {testbed}` disappears as a pair).
pub fn substitute_args(template: &[String], job: &JobDescriptor) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(template.len());

    for arg in template {
        match substitute_one(arg, job) {
            Some(value) => out.push(value),
            None => {
                if out.last().is_some_and(|prev| prev.starts_with('-')) {
                    out.pop();
                }
            }
        }
    }

    out
}

fn substitute_one(arg: &str, job: &JobDescriptor) -> Option<String> {
    let mut value = arg.to_string();

    if value.contains("{testbed}") {
        let testbed = job.testbed.as_ref()?;
        value = value.replace("{testbed}", &testbed.to_string_lossy());
    }

    Some(
        value
            .replace("{job_file}", &job.job_file.to_string_lossy())
            .replace("{output_dir}", &job.output_dir.to_string_lossy())
            .replace("{archive_name}", &job.archive_name)
            .replace("{workers}", &job.workers.to_string()),
    )
}
