// src/output/processor.rs

//! Consumer-side state machine for the progress stream.
//!
//! [`OutputProcessor`] is synchronous and deterministic: it performs no IO
//! besides the optional echo sink, reads no clocks and uses only event
//! timestamps. Feeding the same ordered lines into a fresh processor always
//! yields the same [`StatusTable`]. The async supervisor is the shell that
//! reads lines from child processes and hands them in here.

use std::collections::HashSet;
use std::io::Write;

use tracing::{debug, warn};

use crate::archive::ArchivedTask;
use crate::config::RunnerConfig;
use crate::output::filter::VerbosityFilter;
use crate::output::render::render_completion;
use crate::output::status::{StatusTable, TaskKey, TestStatus, TestStatusRecord};
use crate::protocol::{
    EventBody, PROTOCOL_VERSION, ProgressEvent, TaskEnd, TaskStart, strip_event_prefix,
};

/// Result marker for records finalised by orphan reconciliation.
pub const ORPHANED_RESULT: &str = "orphaned";

/// Which event a line carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    JobStart,
    JobEnd,
    TaskStart,
    TaskEnd,
    SectionStart,
    SectionEnd,
    StreamComplete,
    Other,
}

/// Classification of one output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Event {
        kind: EventKind,
        worker_id: Option<String>,
    },
    /// Carried the event prefix but the payload did not decode.
    Malformed,
    /// Plain log text; `shown` is the verbosity filter's verdict.
    Log { shown: bool },
}

impl LineKind {
    pub fn is_stream_complete(&self) -> bool {
        matches!(
            self,
            LineKind::Event {
                kind: EventKind::StreamComplete,
                ..
            }
        )
    }
}

pub struct OutputProcessor {
    prefix: String,
    filter: VerbosityFilter,
    echo: Option<Box<dyn Write + Send>>,
    color: bool,
    table: StatusTable,
    next_test_id: u64,
    warned_versions: HashSet<String>,
}

impl std::fmt::Debug for OutputProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputProcessor")
            .field("prefix", &self.prefix)
            .field("filter", &self.filter)
            .field("table", &self.table)
            .field("next_test_id", &self.next_test_id)
            .finish_non_exhaustive()
    }
}

impl OutputProcessor {
    /// Processor without an echo sink.
    pub fn new(prefix: impl Into<String>, filter: VerbosityFilter) -> Self {
        Self {
            prefix: prefix.into(),
            filter,
            echo: None,
            color: false,
            table: StatusTable::new(),
            next_test_id: 1,
            warned_versions: HashSet::new(),
        }
    }

    /// Processor wired from `[stream]` and `[output]`, echoing to stdout
    /// when `[output].echo` is set.
    pub fn from_config(cfg: &RunnerConfig) -> Self {
        let filter = VerbosityFilter::new(cfg.output.verbosity, cfg.output.log_threshold);
        let processor = Self::new(cfg.stream.event_prefix.clone(), filter);
        if cfg.output.echo {
            processor.with_echo(std::io::stdout(), cfg.output.color)
        } else {
            processor
        }
    }

    pub fn with_echo(mut self, sink: impl Write + Send + 'static, color: bool) -> Self {
        self.echo = Some(Box::new(sink));
        self.color = color;
        self
    }

    pub fn table(&self) -> &StatusTable {
        &self.table
    }

    pub fn into_table(self) -> StatusTable {
        self.table
    }

    /// Classify one line and apply it.
    ///
    /// Never fails: malformed event payloads are dropped with a debug log.
    pub fn process_line(&mut self, line: &str) -> LineKind {
        let Some(json) = strip_event_prefix(line, &self.prefix) else {
            return LineKind::Log {
                shown: self.echo_log(line),
            };
        };

        match ProgressEvent::decode(json) {
            Ok(event) => {
                let worker_id = event.envelope.worker_id.clone();
                let kind = self.apply_event(event);
                LineKind::Event { kind, worker_id }
            }
            Err(err) => {
                debug!(error = %err, "dropping malformed progress event");
                LineKind::Malformed
            }
        }
    }

    /// Pass a plain log line through the verbosity filter, echoing it if
    /// shown. Returns the filter verdict.
    pub fn echo_log(&mut self, line: &str) -> bool {
        let shown = self.filter.should_show(line);
        if shown {
            write_echo(&mut self.echo, line);
        }
        shown
    }

    /// Apply a decoded event to the status table.
    pub fn apply_event(&mut self, event: ProgressEvent) -> EventKind {
        self.check_version(&event.envelope.version);

        let worker_id = event.envelope.worker_id.as_deref();
        let timestamp = event.envelope.timestamp;

        match &event.body {
            EventBody::JobStart(job) => {
                debug!(job = %job.name, worker_id = ?worker_id, "job started");
                EventKind::JobStart
            }
            EventBody::JobEnd(job) => {
                debug!(job = %job.name, worker_id = ?worker_id, "job ended");
                let orphans = self.reconcile_orphans(worker_id, timestamp);
                if orphans > 0 {
                    warn!(
                        job = %job.name,
                        worker_id = ?worker_id,
                        orphans,
                        "job ended with tasks still executing; marked ERRORED"
                    );
                }
                EventKind::JobEnd
            }
            EventBody::TaskStart(start) => {
                self.on_task_start(worker_id, timestamp, start);
                EventKind::TaskStart
            }
            EventBody::TaskEnd(end) => {
                self.on_task_end(worker_id, timestamp, end);
                EventKind::TaskEnd
            }
            EventBody::SectionStart(section) => {
                debug!(
                    section = ?section.section,
                    parent_task = %section.parent_task,
                    "section started"
                );
                EventKind::SectionStart
            }
            EventBody::SectionEnd(section) => {
                debug!(
                    section = ?section.section,
                    parent_task = %section.parent_task,
                    result = %section.result,
                    "section ended"
                );
                EventKind::SectionEnd
            }
            EventBody::StreamComplete => {
                debug!(worker_id = ?worker_id, "stream_complete sentinel received");
                EventKind::StreamComplete
            }
            EventBody::Other { event } => {
                debug!(event = %event, "ignoring unknown progress event type");
                EventKind::Other
            }
        }
    }

    /// Finalise every record still executing on `worker_id` as ERRORED,
    /// with duration `now - start_time` (clamped at zero).
    ///
    /// Only that worker's tasks are touched. Returns how many were finalised.
    pub fn reconcile_orphans(&mut self, worker_id: Option<&str>, now: f64) -> usize {
        let keys = self.table.executing_on(worker_id);

        for key in &keys {
            if let Some(record) = self.table.get_mut(key) {
                record.status = TestStatus::Errored;
                record.duration = Some((now - record.start_time).max(0.0));
                record.result = Some(ORPHANED_RESULT.to_string());
                debug!(
                    task_id = %record.task_id,
                    test_id = record.test_id,
                    "orphaned task finalised as ERRORED"
                );
                write_echo(&mut self.echo, &render_completion(record, self.color));
            }
        }

        keys.len()
    }

    /// Fill in tasks the live stream missed, from an archived result list.
    ///
    /// Missing records are created; EXECUTING records are finalised with the
    /// archived result. Terminal records are never changed, except those
    /// finalised by orphan reconciliation, which only stood in for the
    /// missing result. Returns the number of records created or updated.
    pub fn reconcile_from_archive(&mut self, archived: &[ArchivedTask]) -> usize {
        let mut changed = 0;

        for task in archived {
            let key = TaskKey::new(task.worker_id.as_deref(), &task.taskid);
            let status = self.status_for_result(&task.result, &task.taskid);

            match self.table.get_mut(&key) {
                Some(record)
                    if record.status.is_terminal()
                        && record.result.as_deref() != Some(ORPHANED_RESULT) =>
                {
                    continue;
                }
                Some(record) => {
                    record.status = status;
                    record.duration = Some(task.duration.max(0.0));
                    record.result = Some(task.result.clone());
                }
                None => {
                    let test_id = self.allocate_test_id();
                    self.table.insert(TestStatusRecord {
                        test_id,
                        task_id: task.taskid.clone(),
                        worker_id: task.worker_id.clone(),
                        title: task.test_name.clone(),
                        test_file: task.test_file.clone(),
                        device: task.hostname.clone(),
                        status,
                        start_time: task.start_time,
                        duration: Some(task.duration.max(0.0)),
                        result: Some(task.result.clone()),
                    });
                }
            }

            debug!(task_id = %task.taskid, %status, "status recovered from archive");
            changed += 1;
        }

        changed
    }

    fn on_task_start(&mut self, worker_id: Option<&str>, timestamp: f64, start: &TaskStart) {
        let key = TaskKey::new(worker_id, &start.taskid);
        if self.table.contains(&key) {
            debug!(
                task_id = %start.taskid,
                worker_id = ?worker_id,
                "duplicate task_start ignored"
            );
            return;
        }

        let test_id = self.allocate_test_id();
        self.table.insert(TestStatusRecord {
            test_id,
            task_id: start.taskid.clone(),
            worker_id: worker_id.map(str::to_string),
            title: start.test_name.clone(),
            test_file: start.test_file.clone(),
            device: start.hostname.clone(),
            status: TestStatus::Executing,
            start_time: timestamp,
            duration: None,
            result: None,
        });

        debug!(
            task_id = %start.taskid,
            test_id,
            test_name = %start.test_name,
            "task started"
        );
    }

    fn on_task_end(&mut self, worker_id: Option<&str>, timestamp: f64, end: &TaskEnd) {
        let key = TaskKey::new(worker_id, &end.taskid);
        let status = self.status_for_result(&end.result, &end.taskid);
        let duration = end.duration.max(0.0);

        match self.table.get_mut(&key) {
            Some(record) if record.status.is_terminal() => {
                debug!(
                    task_id = %end.taskid,
                    existing = %record.status,
                    "task_end for already finished task ignored"
                );
                return;
            }
            Some(record) => {
                record.status = status;
                record.duration = Some(duration);
                record.result = Some(end.result.clone());
            }
            None => {
                warn!(
                    task_id = %end.taskid,
                    worker_id = ?worker_id,
                    "task_end without matching task_start; recording result anyway"
                );
                let test_id = self.allocate_test_id();
                self.table.insert(TestStatusRecord {
                    test_id,
                    task_id: end.taskid.clone(),
                    worker_id: worker_id.map(str::to_string),
                    title: end.test_name.clone(),
                    test_file: end.test_file.clone(),
                    device: None,
                    status,
                    start_time: timestamp - duration,
                    duration: Some(duration),
                    result: Some(end.result.clone()),
                });
            }
        }

        if let Some(record) = self.table.get(&key) {
            debug!(task_id = %end.taskid, %status, duration, "task finished");
            write_echo(&mut self.echo, &render_completion(record, self.color));
        }
    }

    fn status_for_result(&self, result: &str, task_id: &str) -> TestStatus {
        TestStatus::from_result(result).unwrap_or_else(|| {
            warn!(task_id = %task_id, result = %result, "unknown task result; treating as ERRORED");
            TestStatus::Errored
        })
    }

    fn allocate_test_id(&mut self) -> u64 {
        let id = self.next_test_id;
        self.next_test_id += 1;
        id
    }

    fn check_version(&mut self, version: &str) {
        if version != PROTOCOL_VERSION && self.warned_versions.insert(version.to_string()) {
            warn!(
                version = %version,
                supported = PROTOCOL_VERSION,
                "progress event with unknown protocol version; processing anyway"
            );
        }
    }
}

fn write_echo(echo: &mut Option<Box<dyn Write + Send>>, line: &str) {
    if let Some(out) = echo.as_mut() {
        if let Err(e) = writeln!(out, "{line}") {
            debug!(error = %e, "echo sink write failed");
        }
    }
}
