// src/output/status.rs

//! Per-test status table.

use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle of a single test. `Passed`, `Failed`, `Errored` and `Skipped`
/// are terminal: once reached, a record never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestStatus {
    Pending,
    Executing,
    Passed,
    Failed,
    Errored,
    Skipped,
}

impl TestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TestStatus::Passed | TestStatus::Failed | TestStatus::Errored | TestStatus::Skipped
        )
    }

    /// Map a producer `result` string. `None` for values we do not know.
    pub fn from_result(result: &str) -> Option<Self> {
        match result.trim().to_lowercase().as_str() {
            "passed" | "passx" => Some(TestStatus::Passed),
            "failed" => Some(TestStatus::Failed),
            "errored" | "aborted" => Some(TestStatus::Errored),
            "skipped" | "blocked" => Some(TestStatus::Skipped),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Pending => "PENDING",
            TestStatus::Executing => "EXECUTING",
            TestStatus::Passed => "PASSED",
            TestStatus::Failed => "FAILED",
            TestStatus::Errored => "ERRORED",
            TestStatus::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a task: task ids are unique only within their worker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskKey {
    pub worker_id: Option<String>,
    pub task_id: String,
}

impl TaskKey {
    pub fn new(worker_id: Option<&str>, task_id: &str) -> Self {
        Self {
            worker_id: worker_id.map(str::to_string),
            task_id: task_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestStatusRecord {
    /// Monotonic id assigned by the consumer, unique across all workers.
    pub test_id: u64,
    pub task_id: String,
    pub worker_id: Option<String>,
    pub title: String,
    pub test_file: String,
    pub device: Option<String>,
    pub status: TestStatus,
    /// Producer timestamp (seconds since the epoch).
    pub start_time: f64,
    /// Seconds; set once the record is terminal.
    pub duration: Option<f64>,
    /// Raw producer result string, or a marker for reconciled records.
    pub result: Option<String>,
}

impl TestStatusRecord {
    pub fn key(&self) -> TaskKey {
        TaskKey::new(self.worker_id.as_deref(), &self.task_id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub executing: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.executing + self.passed + self.failed + self.errored + self.skipped
    }
}

/// Status records keyed by [`TaskKey`]. Records are only ever added or
/// updated during a run, never removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusTable {
    records: BTreeMap<TaskKey, TestStatusRecord>,
}

impl StatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &TaskKey) -> Option<&TestStatusRecord> {
        self.records.get(key)
    }

    /// First record with this task id, whatever its worker.
    pub fn find_task(&self, task_id: &str) -> Option<&TestStatusRecord> {
        self.records.values().find(|r| r.task_id == task_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestStatusRecord> {
        self.records.values()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for record in self.records.values() {
            match record.status {
                TestStatus::Pending => counts.pending += 1,
                TestStatus::Executing => counts.executing += 1,
                TestStatus::Passed => counts.passed += 1,
                TestStatus::Failed => counts.failed += 1,
                TestStatus::Errored => counts.errored += 1,
                TestStatus::Skipped => counts.skipped += 1,
            }
        }
        counts
    }

    /// Keys of records still executing on `worker_id`.
    pub fn executing_on(&self, worker_id: Option<&str>) -> Vec<TaskKey> {
        self.records
            .iter()
            .filter(|(_, r)| r.status == TestStatus::Executing && r.worker_id.as_deref() == worker_id)
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub(crate) fn contains(&self, key: &TaskKey) -> bool {
        self.records.contains_key(key)
    }

    pub(crate) fn get_mut(&mut self, key: &TaskKey) -> Option<&mut TestStatusRecord> {
        self.records.get_mut(key)
    }

    pub(crate) fn insert(&mut self, record: TestStatusRecord) {
        self.records.insert(record.key(), record);
    }
}
