// src/protocol/producer.rs

//! Producer side of the progress protocol.
//!
//! Runs inside the spawned runner process and writes one prefixed JSON line
//! per event to stdout. Every write is flushed so the supervisor sees events
//! as they happen, and [`ProgressReporter::stream_complete`] must be the
//! last line before stdout closes.

use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol::event::{
    Envelope, EventBody, JobMarker, ProgressEvent, SectionEnd, SectionPhase, SectionStart,
    TaskEnd, TaskStart,
};
use crate::protocol::{EVENT_PREFIX, PROTOCOL_VERSION, encode_line};

/// Externally supplied worker identifier.
pub const ENV_WORKER_ID: &str = "NAC_WORKER_ID";

/// Worker id from `NAC_WORKER_ID`, falling back to the OS pid.
pub fn worker_id_from_env() -> String {
    match std::env::var(ENV_WORKER_ID) {
        Ok(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => std::process::id().to_string(),
    }
}

pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

pub struct ProgressReporter<W: Write> {
    out: W,
    prefix: String,
    worker_id: String,
    pid: u32,
}

impl ProgressReporter<io::Stdout> {
    /// Reporter on this process's stdout, honouring `NAC_PROGRESS_PREFIX`.
    pub fn stdout() -> Self {
        let prefix = std::env::var(crate::job::command::ENV_PROGRESS_PREFIX)
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| EVENT_PREFIX.to_string());
        ProgressReporter::new(io::stdout(), prefix, worker_id_from_env())
    }
}

impl<W: Write> ProgressReporter<W> {
    pub fn new(out: W, prefix: impl Into<String>, worker_id: impl Into<String>) -> Self {
        Self {
            out,
            prefix: prefix.into(),
            worker_id: worker_id.into(),
            pid: std::process::id(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn job_start(&mut self, name: &str) -> io::Result<()> {
        let body = EventBody::JobStart(JobMarker {
            name: name.to_string(),
            pid: Some(self.pid),
        });
        self.emit(body)
    }

    pub fn job_end(&mut self, name: &str) -> io::Result<()> {
        let body = EventBody::JobEnd(JobMarker {
            name: name.to_string(),
            pid: Some(self.pid),
        });
        self.emit(body)
    }

    pub fn task_start(
        &mut self,
        taskid: &str,
        test_name: &str,
        test_file: &str,
        hostname: Option<&str>,
    ) -> io::Result<()> {
        let body = EventBody::TaskStart(TaskStart {
            taskid: taskid.to_string(),
            test_name: test_name.to_string(),
            test_file: test_file.to_string(),
            hostname: hostname.map(str::to_string),
            pid: Some(self.pid),
        });
        self.emit(body)
    }

    pub fn task_end(
        &mut self,
        taskid: &str,
        test_name: &str,
        test_file: &str,
        result: &str,
        duration: f64,
    ) -> io::Result<()> {
        let body = EventBody::TaskEnd(TaskEnd {
            taskid: taskid.to_string(),
            test_name: test_name.to_string(),
            test_file: test_file.to_string(),
            result: result.to_string(),
            duration,
            pid: Some(self.pid),
        });
        self.emit(body)
    }

    pub fn section_start(&mut self, section: SectionPhase, parent_task: &str) -> io::Result<()> {
        let body = EventBody::SectionStart(SectionStart {
            section,
            parent_task: parent_task.to_string(),
        });
        self.emit(body)
    }

    pub fn section_end(
        &mut self,
        section: SectionPhase,
        parent_task: &str,
        result: &str,
    ) -> io::Result<()> {
        let body = EventBody::SectionEnd(SectionEnd {
            section,
            parent_task: parent_task.to_string(),
            result: result.to_string(),
        });
        self.emit(body)
    }

    /// Synchronisation sentinel. Nothing may be written after it.
    pub fn stream_complete(&mut self) -> io::Result<()> {
        self.emit(EventBody::StreamComplete)
    }

    fn emit(&mut self, body: EventBody) -> io::Result<()> {
        let event = ProgressEvent::new(
            Envelope {
                version: PROTOCOL_VERSION.to_string(),
                timestamp: unix_now(),
                worker_id: Some(self.worker_id.clone()),
            },
            body,
        );
        let line = encode_line(&self.prefix, &event)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.out.write_all(line.as_bytes())?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}
