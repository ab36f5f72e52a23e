// src/archive/mod.rs

//! Read-only access to a runner's results archive.
//!
//! When live streaming missed data (a crashed producer, a disabled stream),
//! the archive is queried for well-known member files. Decompression is done
//! by an external tool; this module reads from the extracted bundle.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::PoisonError;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::errors::{NacRunnerError, Result};
use crate::exec::{JobResult, SharedProcessor};

/// Member holding per-task results.
pub const RESULTS_MEMBER: &str = "results.json";

/// Source of archive members by name.
pub trait ArchiveSource {
    /// Contents of `name`, or `None` if the archive has no such member.
    fn read_member(&self, name: &str) -> io::Result<Option<Vec<u8>>>;
}

/// An archive already unpacked into a directory.
#[derive(Debug, Clone)]
pub struct ExtractedArchive {
    root: PathBuf,
}

impl ExtractedArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArchiveSource for ExtractedArchive {
    fn read_member(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("archive member name escapes archive root: {name}"),
            ));
        }

        match fs::read(self.root.join(relative)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// One task entry from [`RESULTS_MEMBER`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArchivedTask {
    pub taskid: String,
    pub test_name: String,
    #[serde(default)]
    pub test_file: String,
    #[serde(default)]
    pub worker_id: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    pub result: String,
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub duration: f64,
}

#[derive(Debug, Deserialize)]
struct ResultsDocument {
    #[serde(default)]
    tasks: Vec<ArchivedTask>,
}

/// Load archived task results. An archive without the results member
/// yields an empty list.
pub fn load_results(source: &dyn ArchiveSource) -> Result<Vec<ArchivedTask>> {
    let Some(bytes) = source.read_member(RESULTS_MEMBER)? else {
        debug!(member = RESULTS_MEMBER, "archive has no results member");
        return Ok(Vec::new());
    };

    let doc: ResultsDocument = serde_json::from_slice(&bytes).map_err(NacRunnerError::from)?;
    Ok(doc.tasks)
}

/// Where the external decompressor unpacks `results.zip`: a sibling
/// directory named after the archive stem.
pub fn extracted_dir(archive: &Path) -> PathBuf {
    archive.with_extension("")
}

/// For jobs that finished but whose stream carried no usable events, fill
/// the status table from the extracted archive in the matching entry of
/// `archive_dirs`. Returns the number of records created or updated.
pub fn recover_job_statuses(
    results: &[JobResult],
    archive_dirs: &[PathBuf],
    processor: &SharedProcessor,
) -> usize {
    let mut recovered = 0;

    for (result, dir) in results.iter().zip(archive_dirs) {
        let Ok(archive) = &result.outcome else {
            continue;
        };
        if archive.stream.events > 0 && !archive.stream.structural_disabled {
            continue;
        }
        if !dir.is_dir() {
            debug!(job = %result.job, dir = ?dir, "no extracted archive to recover from");
            continue;
        }

        match load_results(&ExtractedArchive::new(dir)) {
            Ok(tasks) => {
                let n = processor
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .reconcile_from_archive(&tasks);
                info!(job = %result.job, recovered = n, "status recovered from archive");
                recovered += n;
            }
            Err(e) => warn!(job = %result.job, error = %e, "failed to read archive results"),
        }
    }

    recovered
}
