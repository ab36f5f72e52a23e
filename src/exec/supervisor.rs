// src/exec/supervisor.rs

//! Launches one runner process per job and feeds its output into the shared
//! [`OutputProcessor`].
//!
//! The supervisor is the async shell around the synchronous processor. It
//! owns the child, the pipes, cancellation and the post-EOF drain; all
//! status-table semantics live in the processor.
//!
//! Stdout is read until EOF, or until the runner has exited and either the
//! `stream_complete` sentinel was seen or the drain timeout ran out.

use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::process::{Child, ChildStderr};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::{RunnerConfig, RunnerSection, StreamSection};
use crate::errors::ExecutionFailure;
use crate::exec::line_reader::{BoundedLineReader, ReadLine, split_lines};
use crate::job::{JobDescriptor, materialize};
use crate::output::{EventKind, LineKind, OutputProcessor};
use crate::protocol::producer::unix_now;

/// Processor shared by every job of a batch. Never locked across an await.
pub type SharedProcessor = Arc<Mutex<OutputProcessor>>;

/// Time a runner gets between SIGTERM and SIGKILL on cancellation.
const TERM_GRACE: Duration = Duration::from_secs(5);

/// What happened on the runner's stdout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub lines: u64,
    pub events: u64,
    pub malformed: u64,
    pub overflows: u64,
    pub sentinel_seen: bool,
    /// The bounded post-EOF drain ran (no sentinel was seen).
    pub extra_drain: bool,
    pub recovered_bytes: usize,
    /// Too many oversized lines in a row; the rest was drained uninterpreted.
    pub structural_disabled: bool,
    pub orphans_reconciled: usize,
}

/// How a runner that exited normally finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobExit {
    /// Exit code 0: every test passed.
    Success,
    /// Exit code 1: the run completed but some tests failed.
    ContentFailures,
}

/// Successful supervision outcome: the archive can be trusted.
#[derive(Debug, Clone)]
pub struct JobArchive {
    pub path: PathBuf,
    pub exit: JobExit,
    pub stream: StreamSummary,
}

/// Classification of a raw exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    Finished(JobExit),
    ExecutionFailure,
}

/// 0 and 1 mean the runner finished; anything else means it did not.
pub fn classify_exit_code(code: i32) -> ExitClass {
    match code {
        0 => ExitClass::Finished(JobExit::Success),
        1 => ExitClass::Finished(JobExit::ContentFailures),
        _ => ExitClass::ExecutionFailure,
    }
}

#[derive(Clone)]
pub struct SubprocessSupervisor {
    runner: RunnerSection,
    stream: StreamSection,
    processor: SharedProcessor,
}

impl SubprocessSupervisor {
    pub fn new(cfg: &RunnerConfig, processor: SharedProcessor) -> Self {
        Self {
            runner: cfg.runner.clone(),
            stream: cfg.stream.clone(),
            processor,
        }
    }

    pub fn processor(&self) -> &SharedProcessor {
        &self.processor
    }

    /// Run `job` to completion without external cancellation.
    pub async fn launch(
        &self,
        job: &JobDescriptor,
        env: &[(String, String)],
    ) -> Result<JobArchive, ExecutionFailure> {
        self.launch_with_cancel(job, env, &CancellationToken::new())
            .await
    }

    /// Run `job` to completion.
    ///
    /// If `cancel` fires, the child is terminated and awaited before
    /// [`ExecutionFailure::Cancelled`] is returned.
    pub async fn launch_with_cancel(
        &self,
        job: &JobDescriptor,
        env: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<JobArchive, ExecutionFailure> {
        let invocation = materialize(&self.runner, &self.stream, job, env)?;

        if let Err(source) = tokio::fs::create_dir_all(&invocation.cwd).await {
            error!(
                job = %job.name,
                cwd = ?invocation.cwd,
                error = %source,
                "failed to prepare runner working directory"
            );
            return Err(ExecutionFailure::WorkDir {
                path: invocation.cwd,
                source,
            });
        }

        info!(
            job = %job.name,
            program = %invocation.program,
            args = ?invocation.args,
            cwd = ?invocation.cwd,
            "starting runner process"
        );

        let mut child = match invocation.to_command().spawn() {
            Ok(child) => child,
            Err(source) => {
                error!(
                    job = %job.name,
                    program = %invocation.program,
                    error = %source,
                    "failed to spawn runner process"
                );
                return Err(ExecutionFailure::Spawn {
                    program: invocation.program,
                    source,
                });
            }
        };

        let stdout = child.stdout.take();
        let stderr_task = child.stderr.take().map(|stderr| {
            spawn_stderr_pump(
                job.name.clone(),
                stderr,
                self.processor.clone(),
                self.stream.max_line_bytes,
            )
        });

        let mut state = StreamState::new(
            &job.name,
            &self.processor,
            self.stream.max_consecutive_overflows,
        );

        let mut reader =
            stdout.map(|stdout| BoundedLineReader::new(stdout, self.stream.max_line_bytes));
        let mut stdout_open = reader.is_some();
        let mut stdout_stalled = false;
        let mut exited: Option<ExitStatus> = None;
        let mut tail_deadline: Option<Instant> = None;

        // Once the runner has exited, the sentinel is authoritative: a
        // grandchild still holding the pipe must not keep us reading.
        let status = loop {
            if let Some(status) = exited {
                if !stdout_open || state.summary.sentinel_seen {
                    break status;
                }
            }

            tokio::select! {
                read = next_read(&mut reader, tail_deadline), if stdout_open => match read {
                    None => {
                        debug!(job = %job.name, "stdout still open after runner exit; not waiting");
                        stdout_open = false;
                        stdout_stalled = true;
                    }
                    Some(Ok(ReadLine::Eof)) => stdout_open = false,
                    Some(Ok(read)) => state.on_read(read),
                    Some(Err(e)) => {
                        warn!(job = %job.name, error = %e, "error reading runner stdout");
                        stdout_open = false;
                    }
                },
                status = child.wait(), if exited.is_none() => {
                    exited = Some(status?);
                    tail_deadline = Some(Instant::now() + self.stream.drain_timeout());
                },
                _ = cancel.cancelled() => {
                    let failure = terminate(&mut child, &job.name).await;
                    state.reconcile_leftovers();
                    return Err(failure);
                }
            }
        };

        if !state.summary.sentinel_seen && !stdout_stalled {
            if let Some(reader) = reader.as_mut() {
                self.extra_drain(reader, &mut state).await;
            }
        }

        if let Some(task) = stderr_task {
            if timeout(self.stream.drain_timeout(), task).await.is_err() {
                debug!(job = %job.name, "stderr still open after runner exit; not waiting");
            }
        }

        state.reconcile_leftovers();
        let stream = state.summary;

        let Some(code) = status.code() else {
            error!(job = %job.name, "runner terminated by signal");
            return Err(ExecutionFailure::Signal { stream });
        };

        match classify_exit_code(code) {
            ExitClass::Finished(exit) => {
                let path = job.archive_path();
                info!(
                    job = %job.name,
                    exit_code = code,
                    exit = ?exit,
                    archive = ?path,
                    events = stream.events,
                    "runner finished"
                );
                if !path.exists() {
                    warn!(job = %job.name, archive = ?path, "runner finished but archive is missing");
                }
                Ok(JobArchive { path, exit, stream })
            }
            ExitClass::ExecutionFailure => {
                error!(
                    job = %job.name,
                    exit_code = code,
                    "runner execution failed; archive not trusted"
                );
                Err(ExecutionFailure::ExitCode { code, stream })
            }
        }
    }

    /// The producer may have written its last lines just before exiting
    /// without the sentinel. Wait briefly, then read whatever is left with
    /// a hard timeout.
    async fn extra_drain<R: AsyncRead + Unpin>(
        &self,
        reader: &mut BoundedLineReader<R>,
        state: &mut StreamState<'_>,
    ) {
        debug!(job = %state.job, "no stream_complete sentinel; performing bounded drain");
        state.summary.extra_drain = true;

        tokio::time::sleep(self.stream.drain_delay()).await;
        match timeout(self.stream.drain_timeout(), reader.drain_to_end()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(job = %state.job, error = %e, "error during final drain"),
            Err(_) => debug!(job = %state.job, "final drain timed out"),
        }

        let recovered = reader.take_pending();
        if recovered.is_empty() {
            return;
        }

        info!(job = %state.job, bytes = recovered.len(), "recovered output after EOF");
        state.summary.recovered_bytes = recovered.len();
        for read in split_lines(&recovered, self.stream.max_line_bytes) {
            state.on_read(read);
        }
    }
}

/// Next stdout read, or `None` once `deadline` passes. Never resolves
/// without a reader.
async fn next_read<R: AsyncRead + Unpin>(
    reader: &mut Option<BoundedLineReader<R>>,
    deadline: Option<Instant>,
) -> Option<io::Result<ReadLine>> {
    let Some(reader) = reader.as_mut() else {
        return std::future::pending().await;
    };
    match deadline {
        Some(deadline) => timeout_at(deadline, reader.next_line()).await.ok(),
        None => Some(reader.next_line().await),
    }
}

/// Per-launch bookkeeping for the stdout stream.
struct StreamState<'a> {
    job: &'a str,
    processor: &'a SharedProcessor,
    max_overflows: u32,
    consecutive_overflows: u32,
    /// Worker ids that started tasks on this stream.
    workers: BTreeSet<Option<String>>,
    summary: StreamSummary,
}

impl<'a> StreamState<'a> {
    fn new(job: &'a str, processor: &'a SharedProcessor, max_overflows: u32) -> Self {
        Self {
            job,
            processor,
            max_overflows,
            consecutive_overflows: 0,
            workers: BTreeSet::new(),
            summary: StreamSummary::default(),
        }
    }

    fn on_read(&mut self, read: ReadLine) {
        match read {
            ReadLine::Line(line) => self.on_line(&line),
            ReadLine::Overflow { discarded } => self.on_overflow(discarded),
            ReadLine::Eof => {}
        }
    }

    fn on_line(&mut self, line: &str) {
        self.summary.lines += 1;
        self.consecutive_overflows = 0;

        if self.summary.structural_disabled {
            trace!(job = %self.job, "uninterpreted: {}", line);
            return;
        }

        let kind = lock(self.processor).process_line(line);
        match kind {
            LineKind::Event { kind, worker_id } => {
                self.summary.events += 1;
                match kind {
                    EventKind::StreamComplete => self.summary.sentinel_seen = true,
                    EventKind::TaskStart | EventKind::TaskEnd => {
                        self.workers.insert(worker_id);
                    }
                    _ => {}
                }
            }
            LineKind::Malformed => self.summary.malformed += 1,
            LineKind::Log { .. } => {}
        }
    }

    fn on_overflow(&mut self, discarded: usize) {
        self.summary.overflows += 1;
        self.consecutive_overflows += 1;
        warn!(job = %self.job, discarded, "discarded oversized output line");

        if self.consecutive_overflows >= self.max_overflows && !self.summary.structural_disabled {
            self.summary.structural_disabled = true;
            warn!(
                job = %self.job,
                consecutive = self.consecutive_overflows,
                "too many oversized lines in a row; draining output without interpreting it"
            );
        }
    }

    /// Tasks still executing after the runner is gone will never finish.
    fn reconcile_leftovers(&mut self) {
        let now = unix_now();
        let mut processor = lock(self.processor);
        for worker_id in &self.workers {
            let n = processor.reconcile_orphans(worker_id.as_deref(), now);
            if n > 0 {
                warn!(
                    job = %self.job,
                    worker_id = ?worker_id,
                    orphans = n,
                    "runner output ended with tasks still executing; marked ERRORED"
                );
                self.summary.orphans_reconciled += n;
            }
        }
    }
}

fn lock(processor: &SharedProcessor) -> MutexGuard<'_, OutputProcessor> {
    processor.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ask the runner to stop, escalate to a kill after [`TERM_GRACE`], and
/// wait for it to exit.
async fn terminate(child: &mut Child, job: &str) -> ExecutionFailure {
    info!(job = %job, "cancellation requested; stopping runner process");

    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: plain signal delivery to a pid we spawned and have not reaped.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }

    match timeout(TERM_GRACE, child.wait()).await {
        Ok(Ok(status)) => debug!(job = %job, ?status, "runner exited after SIGTERM"),
        Ok(Err(e)) => warn!(job = %job, error = %e, "error waiting for runner after SIGTERM"),
        Err(_) => {
            if let Err(e) = child.kill().await {
                warn!(job = %job, error = %e, "failed to kill runner process on cancellation");
            }
        }
    }

    ExecutionFailure::Cancelled
}

fn spawn_stderr_pump(
    job: String,
    stderr: ChildStderr,
    processor: SharedProcessor,
    max_line_bytes: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BoundedLineReader::new(stderr, max_line_bytes);
        loop {
            match reader.next_line().await {
                Ok(ReadLine::Line(line)) => {
                    lock(&processor).echo_log(&line);
                }
                Ok(ReadLine::Overflow { discarded }) => {
                    debug!(job = %job, discarded, "discarded oversized stderr line");
                }
                Ok(ReadLine::Eof) => break,
                Err(e) => {
                    debug!(job = %job, error = %e, "error reading runner stderr");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_zero_and_one_are_finished_runs() {
        assert_eq!(classify_exit_code(0), ExitClass::Finished(JobExit::Success));
        assert_eq!(
            classify_exit_code(1),
            ExitClass::Finished(JobExit::ContentFailures)
        );
        assert_eq!(classify_exit_code(2), ExitClass::ExecutionFailure);
        assert_eq!(classify_exit_code(-1), ExitClass::ExecutionFailure);
        assert_eq!(classify_exit_code(137), ExitClass::ExecutionFailure);
    }
}
