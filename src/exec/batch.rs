// src/exec/batch.rs

//! Run a list of jobs with a cap on how many runners are alive at once.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::errors::ExecutionFailure;
use crate::exec::backend::JobLauncher;
use crate::exec::supervisor::{JobArchive, JobExit};
use crate::job::JobDescriptor;
use crate::output::{StatusTable, TestStatus};

/// Outcome of one job in a batch.
#[derive(Debug)]
pub struct JobResult {
    pub job: String,
    pub outcome: Result<JobArchive, ExecutionFailure>,
}

/// Outcome of a whole batch, in job order.
#[derive(Debug)]
pub struct BatchReport {
    pub results: Vec<JobResult>,
    pub table: StatusTable,
}

impl BatchReport {
    /// Process exit code: 2 if any job failed to execute, 1 if any test did
    /// not pass, else 0.
    pub fn exit_code(&self) -> i32 {
        if self.results.iter().any(|r| r.outcome.is_err()) {
            return 2;
        }

        let content_failures = self.results.iter().any(|r| {
            matches!(
                &r.outcome,
                Ok(JobArchive {
                    exit: JobExit::ContentFailures,
                    ..
                })
            )
        });
        let counts = self.table.counts();

        if content_failures || counts.failed > 0 || counts.errored > 0 {
            1
        } else {
            0
        }
    }

    pub fn execution_failures(&self) -> impl Iterator<Item = (&str, &ExecutionFailure)> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (r.job.as_str(), e)))
    }

    pub fn archives(&self) -> impl Iterator<Item = &JobArchive> {
        self.results.iter().filter_map(|r| r.outcome.as_ref().ok())
    }

    /// Tests that never reached a terminal state.
    pub fn unfinished(&self) -> usize {
        self.table
            .iter()
            .filter(|r| matches!(r.status, TestStatus::Pending | TestStatus::Executing))
            .count()
    }
}

pub struct BatchRunner<L> {
    launcher: Arc<L>,
    max_parallel_jobs: usize,
}

impl<L: JobLauncher + 'static> BatchRunner<L> {
    /// `max_parallel_jobs` of 0 is treated as 1.
    pub fn new(launcher: L, max_parallel_jobs: usize) -> Self {
        Self {
            launcher: Arc::new(launcher),
            max_parallel_jobs: max_parallel_jobs.max(1),
        }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Run every job. Jobs not yet started when `cancel` fires are reported
    /// as cancelled. `snapshot` supplies the final status table.
    pub async fn run<F>(
        &self,
        jobs: Vec<JobDescriptor>,
        env: Vec<(String, String)>,
        cancel: CancellationToken,
        snapshot: F,
    ) -> BatchReport
    where
        F: FnOnce() -> StatusTable,
    {
        let names: Vec<String> = jobs.iter().map(|j| j.name.clone()).collect();
        let mut slots: Vec<Option<Result<JobArchive, ExecutionFailure>>> =
            names.iter().map(|_| None).collect();

        info!(
            jobs = names.len(),
            max_parallel_jobs = self.max_parallel_jobs,
            "starting batch"
        );

        let env = Arc::new(env);
        let mut pending = jobs.into_iter().enumerate();
        let mut running = JoinSet::new();
        let mut task_slots = HashMap::new();

        loop {
            while running.len() < self.max_parallel_jobs && !cancel.is_cancelled() {
                let Some((idx, job)) = pending.next() else {
                    break;
                };

                let launcher = Arc::clone(&self.launcher);
                let env = Arc::clone(&env);
                let cancel = cancel.clone();
                let handle = running.spawn(async move {
                    let outcome = launcher.launch(&job, &env, &cancel).await;
                    (idx, outcome)
                });
                task_slots.insert(handle.id(), idx);
            }

            match running.join_next().await {
                Some(Ok((idx, outcome))) => slots[idx] = Some(outcome),
                Some(Err(e)) => {
                    error!(error = %e, "job task panicked or was aborted");
                    if let Some(&idx) = task_slots.get(&e.id()) {
                        slots[idx] = Some(Err(ExecutionFailure::Io(io::Error::other(format!(
                            "job task failed: {e}"
                        )))));
                    }
                }
                None => break,
            }
        }

        let results = names
            .into_iter()
            .zip(slots)
            .map(|(job, slot)| JobResult {
                outcome: slot.unwrap_or_else(|| Err(ExecutionFailure::Cancelled)),
                job,
            })
            .collect();

        BatchReport {
            results,
            table: snapshot(),
        }
    }
}
