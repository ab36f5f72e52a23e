// src/output/mod.rs

//! Runner output interpretation.
//!
//! - [`processor`] classifies each line and owns the status table.
//! - [`status`] is the table itself and its record/status types.
//! - [`filter`] decides which plain log lines are echoed.
//! - [`render`] formats completion lines.

pub mod filter;
pub mod processor;
pub mod render;
pub mod status;

pub use filter::VerbosityFilter;
pub use processor::{EventKind, LineKind, ORPHANED_RESULT, OutputProcessor};
pub use status::{StatusCounts, StatusTable, TaskKey, TestStatus, TestStatusRecord};
