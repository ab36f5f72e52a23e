// src/job/mod.rs

//! Job descriptors and their translation into runner processes.
//!
//! - [`descriptor`] holds the immutable [`JobDescriptor`] handed over by the
//!   external job builder, and the loader for its TOML form.
//! - [`command`] turns a descriptor plus the `[runner]` config into argv,
//!   environment and working directory.

pub mod command;
pub mod descriptor;

pub use command::{RunnerInvocation, materialize};
pub use descriptor::{DeviceBinding, JobDescriptor, load_jobs};
