// src/exec/backend.rs

//! Pluggable job launcher abstraction.
//!
//! The batch runner talks to a `JobLauncher` instead of the supervisor
//! directly, so tests can swap in a fake launcher that never spawns a
//! process.
//!
//! - [`SubprocessSupervisor`] is the production implementation.
//! - Tests can provide their own launcher that records which jobs were run
//!   and returns canned outcomes.

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::errors::ExecutionFailure;
use crate::exec::supervisor::{JobArchive, SubprocessSupervisor};
use crate::job::JobDescriptor;

pub type LaunchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<JobArchive, ExecutionFailure>> + Send + 'a>>;

/// Trait abstracting how a single job is executed.
pub trait JobLauncher: Send + Sync {
    /// Run `job` to completion, or until `cancel` fires.
    fn launch<'a>(
        &'a self,
        job: &'a JobDescriptor,
        env: &'a [(String, String)],
        cancel: &'a CancellationToken,
    ) -> LaunchFuture<'a>;
}

impl JobLauncher for SubprocessSupervisor {
    fn launch<'a>(
        &'a self,
        job: &'a JobDescriptor,
        env: &'a [(String, String)],
        cancel: &'a CancellationToken,
    ) -> LaunchFuture<'a> {
        Box::pin(self.launch_with_cancel(job, env, cancel))
    }
}
