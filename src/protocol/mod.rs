// src/protocol/mod.rs

//! Progress event wire protocol.
//!
//! The runner writes newline-delimited text to stdout. Lines that start with
//! [`EVENT_PREFIX`] carry one JSON event right after the prefix; every other
//! line is opaque log text. Nothing else is used for progress IPC.
//!
//! - [`event`] is the typed event model and JSON codec.
//! - [`producer`] is the emitting side, for test code running inside the
//!   runner process.
//! - [`naming`] derives dotted test names from file paths.

pub mod event;
pub mod naming;
pub mod producer;

pub use event::{
    DecodeError, Envelope, EventBody, JobMarker, ProgressEvent, SectionEnd, SectionPhase,
    SectionStart, TaskEnd, TaskStart,
};
pub use naming::derive_test_name;
pub use producer::{ProgressReporter, worker_id_from_env};

/// Literal tag in front of every event line.
pub const EVENT_PREFIX: &str = "NAC_PROGRESS:";

/// Schema version written by this producer. Consumers warn on others.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Return the JSON body if `line` is an event line.
///
/// Leading whitespace and a trailing carriage return are tolerated.
pub fn strip_event_prefix<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.trim_start()
        .strip_prefix(prefix)
        .map(|body| body.trim_end_matches('\r'))
}

/// Encode `event` as a full event line, without the trailing newline.
pub fn encode_line(prefix: &str, event: &ProgressEvent) -> serde_json::Result<String> {
    Ok(format!("{prefix}{}", event.encode()?))
}
