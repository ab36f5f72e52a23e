use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nac_runner::errors::ExecutionFailure;
use nac_runner::exec::{JobArchive, JobExit, JobLauncher, LaunchFuture, StreamSummary};
use nac_runner::job::JobDescriptor;
use tokio_util::sync::CancellationToken;

/// Canned outcome for one job name.
#[derive(Debug, Clone, Copy)]
pub enum FakeOutcome {
    Success,
    ContentFailures,
    ExitCode(i32),
    /// Runs until cancelled.
    Hang,
}

/// A fake launcher that:
/// - records which jobs were launched, in order
/// - tracks the peak number of jobs running at once
/// - returns the configured outcome after a short delay.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    outcomes: Arc<HashMap<String, FakeOutcome>>,
    launched: Arc<Mutex<Vec<String>>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FakeLauncher {
    pub fn new(outcomes: &[(&str, FakeOutcome)]) -> Self {
        Self {
            outcomes: Arc::new(
                outcomes
                    .iter()
                    .map(|(name, outcome)| (name.to_string(), *outcome))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    pub fn launched(&self) -> Vec<String> {
        self.launched.lock().unwrap().clone()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl JobLauncher for FakeLauncher {
    fn launch<'a>(
        &'a self,
        job: &'a JobDescriptor,
        _env: &'a [(String, String)],
        cancel: &'a CancellationToken,
    ) -> LaunchFuture<'a> {
        Box::pin(async move {
            self.launched.lock().unwrap().push(job.name.clone());
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let outcome = self
                .outcomes
                .get(&job.name)
                .copied()
                .unwrap_or(FakeOutcome::Success);

            let result = match outcome {
                FakeOutcome::Hang => {
                    cancel.cancelled().await;
                    Err(ExecutionFailure::Cancelled)
                }
                other => {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    match other {
                        FakeOutcome::Success => Ok(archive(job, JobExit::Success)),
                        FakeOutcome::ContentFailures => Ok(archive(job, JobExit::ContentFailures)),
                        FakeOutcome::ExitCode(code) => Err(ExecutionFailure::ExitCode {
                            code,
                            stream: StreamSummary::default(),
                        }),
                        FakeOutcome::Hang => unreachable!(),
                    }
                }
            };

            self.running.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }
}

fn archive(job: &JobDescriptor, exit: JobExit) -> JobArchive {
    JobArchive {
        path: job.archive_path(),
        exit,
        stream: StreamSummary::default(),
    }
}
