mod common;
use crate::common::events;
use crate::common::init_tracing;

use std::error::Error;
use std::io::Write;
use std::sync::{Arc, Mutex};

use nac_runner::output::{
    EventKind, LineKind, ORPHANED_RESULT, OutputProcessor, TaskKey, TestStatus, VerbosityFilter,
};
use nac_runner::protocol::EVENT_PREFIX;
use nac_runner::types::{ProducerLevel, Verbosity};

type TestResult = Result<(), Box<dyn Error>>;

/// Echo sink the test can read back.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn processor() -> OutputProcessor {
    OutputProcessor::new(
        EVENT_PREFIX,
        VerbosityFilter::new(Verbosity::Quiet, ProducerLevel::Warning),
    )
}

fn key(worker: &str, task: &str) -> TaskKey {
    TaskKey::new(Some(worker), task)
}

#[test]
fn job_end_without_task_end_marks_task_errored() -> TestResult {
    init_tracing();
    let mut p = processor();

    p.process_line(&events::task_start("w1", "s1_t1", "verify_bd", 100.0));
    p.process_line(&events::job_end("w1", "job", 107.5));

    let record = p.table().get(&key("w1", "s1_t1")).ok_or("missing record")?;
    assert_eq!(record.status, TestStatus::Errored);
    assert_eq!(record.duration, Some(7.5));
    assert_eq!(record.result.as_deref(), Some(ORPHANED_RESULT));
    Ok(())
}

#[test]
fn mixed_stream_creates_one_record_and_flags_sentinel() -> TestResult {
    init_tracing();
    let mut p = processor();

    let plain = p.process_line("plain log");
    let start = p.process_line(&events::task_start("w1", "t1", "verify_vrf", 10.0));
    let bad = p.process_line(&format!("{EVENT_PREFIX}{{not json}}"));
    let done = p.process_line(&events::stream_complete("w1", 11.0));

    assert_eq!(plain, LineKind::Log { shown: false });
    assert_eq!(
        start,
        LineKind::Event {
            kind: EventKind::TaskStart,
            worker_id: Some("w1".into())
        }
    );
    assert_eq!(bad, LineKind::Malformed);
    assert!(done.is_stream_complete());
    assert_eq!(p.table().len(), 1);
    Ok(())
}

#[test]
fn task_end_finalises_by_task_id_not_name() -> TestResult {
    init_tracing();
    let mut p = processor();

    // Same test name on two devices, different task ids.
    p.process_line(&events::task_start("w1", "t1", "verify_bd", 1.0));
    p.process_line(&events::task_start("w1", "t2", "verify_bd", 2.0));
    p.process_line(&events::task_end("w1", "t2", "verify_bd", "failed", 3.0, 5.0));

    let t1 = p.table().get(&key("w1", "t1")).ok_or("t1")?;
    let t2 = p.table().get(&key("w1", "t2")).ok_or("t2")?;
    assert_eq!(t1.status, TestStatus::Executing);
    assert_eq!(t2.status, TestStatus::Failed);
    assert_eq!(t2.duration, Some(3.0));
    Ok(())
}

#[test]
fn test_ids_are_monotonic_across_workers() -> TestResult {
    init_tracing();
    let mut p = processor();

    p.process_line(&events::task_start("w1", "t1", "a", 1.0));
    p.process_line(&events::task_start("w2", "t1", "a", 1.0));
    p.process_line(&events::task_start("w1", "t2", "b", 2.0));

    let ids: Vec<u64> = [key("w1", "t1"), key("w2", "t1"), key("w1", "t2")]
        .iter()
        .map(|k| p.table().get(k).map(|r| r.test_id).unwrap_or(0))
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn orphan_reconciliation_only_touches_the_ending_worker() -> TestResult {
    init_tracing();
    let mut p = processor();

    p.process_line(&events::task_start("w1", "a", "a", 10.0));
    p.process_line(&events::task_start("w1", "b", "b", 11.0));
    p.process_line(&events::task_end("w1", "b", "b", "passed", 1.0, 12.0));
    p.process_line(&events::task_start("w2", "c", "c", 10.0));
    p.process_line(&events::job_end("w1", "job1", 20.0));

    assert_eq!(p.table().get(&key("w1", "a")).ok_or("a")?.status, TestStatus::Errored);
    assert_eq!(p.table().get(&key("w1", "b")).ok_or("b")?.status, TestStatus::Passed);
    assert_eq!(p.table().get(&key("w2", "c")).ok_or("c")?.status, TestStatus::Executing);
    Ok(())
}

#[test]
fn orphan_duration_is_never_negative() -> TestResult {
    let mut p = processor();

    p.process_line(&events::task_start("w1", "a", "a", 50.0));
    p.process_line(&events::job_end("w1", "job", 40.0));

    let record = p.table().get(&key("w1", "a")).ok_or("a")?;
    assert_eq!(record.status, TestStatus::Errored);
    assert_eq!(record.duration, Some(0.0));
    Ok(())
}

#[test]
fn task_end_before_task_start_is_recorded_and_kept() -> TestResult {
    init_tracing();
    let mut p = processor();

    p.process_line(&events::task_end("w1", "t1", "late", "passed", 2.0, 10.0));
    p.process_line(&events::task_start("w1", "t1", "late", 8.0));

    assert_eq!(p.table().len(), 1);
    let record = p.table().get(&key("w1", "t1")).ok_or("t1")?;
    assert_eq!(record.status, TestStatus::Passed);
    assert_eq!(record.start_time, 8.0);
    Ok(())
}

#[test]
fn terminal_records_are_never_changed() -> TestResult {
    let mut p = processor();

    p.process_line(&events::task_start("w1", "t1", "x", 1.0));
    p.process_line(&events::task_end("w1", "t1", "x", "passed", 1.0, 2.0));
    p.process_line(&events::task_end("w1", "t1", "x", "failed", 9.0, 3.0));
    p.process_line(&events::job_end("w1", "job", 4.0));

    let record = p.table().get(&key("w1", "t1")).ok_or("t1")?;
    assert_eq!(record.status, TestStatus::Passed);
    assert_eq!(record.duration, Some(1.0));
    Ok(())
}

#[test]
fn section_events_do_not_touch_the_table() -> TestResult {
    let mut p = processor();

    p.process_line(&events::task_start("w1", "t1", "x", 1.0));
    let before = p.table().clone();

    let kind = p.process_line(&events::section_start("w1", "setup", "t1", 1.5));
    p.process_line(&events::section_end("w1", "setup", "t1", "passed", 1.7));
    p.process_line(&events::section_start("w1", "bogus_phase", "t1", 1.8));

    assert!(matches!(
        kind,
        LineKind::Event {
            kind: EventKind::SectionStart,
            ..
        }
    ));
    assert_eq!(p.table(), &before);
    Ok(())
}

#[test]
fn unknown_version_and_unknown_event_are_tolerated() -> TestResult {
    init_tracing();
    let mut p = processor();

    let future = format!(
        r#"{EVENT_PREFIX}{{"version":"9.9","event":"task_start","timestamp":1.0,"worker_id":"w1","taskid":"t1","test_name":"x"}}"#
    );
    let odd = format!(
        r#"{EVENT_PREFIX}{{"version":"1.0","event":"heartbeat","timestamp":1.0,"worker_id":"w1"}}"#
    );

    p.process_line(&future);
    let kind = p.process_line(&odd);

    assert_eq!(p.table().get(&key("w1", "t1")).ok_or("t1")?.status, TestStatus::Executing);
    assert_eq!(
        kind,
        LineKind::Event {
            kind: EventKind::Other,
            worker_id: Some("w1".into())
        }
    );
    Ok(())
}

#[test]
fn result_strings_map_to_statuses() -> TestResult {
    let mut p = processor();
    let cases = [
        ("passx", TestStatus::Passed),
        ("blocked", TestStatus::Skipped),
        ("aborted", TestStatus::Errored),
        ("something-new", TestStatus::Errored),
    ];

    for (i, (result, _)) in cases.iter().enumerate() {
        let id = format!("t{i}");
        p.process_line(&events::task_start("w1", &id, "x", 1.0));
        p.process_line(&events::task_end("w1", &id, "x", result, 1.0, 2.0));
    }

    for (i, (_, expected)) in cases.iter().enumerate() {
        let record = p.table().get(&key("w1", &format!("t{i}"))).ok_or("record")?;
        assert_eq!(record.status, *expected);
    }
    Ok(())
}

#[test]
fn numeric_ids_from_dynamic_producers_are_accepted() -> TestResult {
    let mut p = processor();

    let line = format!(
        r#"{EVENT_PREFIX}{{"version":1.0,"event":"task_start","timestamp":3.0,"worker_id":4321,"taskid":7,"test_name":"x"}}"#
    );
    p.process_line(&line);

    assert!(p.table().get(&key("4321", "7")).is_some());
    Ok(())
}

#[test]
fn completion_lines_and_severe_logs_are_echoed() -> TestResult {
    init_tracing();
    let sink = SharedBuf::default();
    let mut p = processor().with_echo(sink.clone(), false);

    p.process_line("just chatter");
    p.process_line("ERROR: device unreachable");
    p.process_line("| ERROR | table cell |");
    p.process_line(&events::task_start("w1", "t1", "verify_bd", 1.0));
    p.process_line(&events::task_end("w1", "t1", "verify_bd", "passed", 2.5, 3.0));

    let lines = sink.lines();
    assert_eq!(lines.len(), 2, "echoed: {lines:?}");
    assert_eq!(lines[0], "ERROR: device unreachable");
    assert!(lines[1].ends_with("[1] verify_bd (leaf-101) PASSED in 2.5s"));
    Ok(())
}
