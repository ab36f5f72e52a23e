// src/exec/mod.rs

//! Process execution layer.
//!
//! This module runs the test-runner subprocess for each job using
//! `tokio::process::Command` and feeds its output into the shared
//! [`crate::output::OutputProcessor`].
//!
//! - [`supervisor`] launches one runner and supervises its pipes and exit.
//! - [`line_reader`] reads stdout/stderr with a per-line ceiling.
//! - [`batch`] runs many jobs with a concurrency cap.
//! - [`backend`] provides the `JobLauncher` trait, implemented by the
//!   supervisor in production and by fakes in tests.

pub mod backend;
pub mod batch;
pub mod line_reader;
pub mod supervisor;

pub use backend::{JobLauncher, LaunchFuture};
pub use batch::{BatchReport, BatchRunner, JobResult};
pub use line_reader::{BoundedLineReader, ReadLine};
pub use supervisor::{
    ExitClass, JobArchive, JobExit, SharedProcessor, StreamSummary, SubprocessSupervisor,
    classify_exit_code,
};
