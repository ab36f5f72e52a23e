mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::path::Path;

use nac_runner::output::{OutputProcessor, TaskKey, TestStatus, VerbosityFilter};
use nac_runner::protocol::{
    DecodeError, EVENT_PREFIX, EventBody, ProgressEvent, ProgressReporter, SectionPhase,
    derive_test_name, strip_event_prefix,
};
use nac_runner::types::{ProducerLevel, Verbosity};

type TestResult = Result<(), Box<dyn Error>>;

fn decode_all(bytes: &[u8]) -> Result<Vec<ProgressEvent>, Box<dyn Error>> {
    let text = std::str::from_utf8(bytes)?;
    let mut events = Vec::new();
    for line in text.lines() {
        let json = strip_event_prefix(line, EVENT_PREFIX).ok_or("line without prefix")?;
        events.push(ProgressEvent::decode(json)?);
    }
    Ok(events)
}

#[test]
fn reporter_writes_one_prefixed_line_per_event() -> TestResult {
    init_tracing();
    let mut reporter = ProgressReporter::new(Vec::new(), EVENT_PREFIX, "gw0");

    reporter.job_start("nightly")?;
    reporter.task_start("t1", "aci.tenant.verify_bd", "tests/aci/tenant/verify_bd.robot", Some("apic1"))?;
    reporter.section_start(SectionPhase::Setup, "t1")?;
    reporter.section_end(SectionPhase::Setup, "t1", "passed")?;
    reporter.task_end("t1", "aci.tenant.verify_bd", "tests/aci/tenant/verify_bd.robot", "passed", 1.25)?;
    reporter.job_end("nightly")?;
    reporter.stream_complete()?;

    let events = decode_all(&reporter.into_inner())?;
    let names: Vec<&str> = events.iter().map(|e| e.body.name()).collect();
    assert_eq!(
        names,
        [
            "job_start",
            "task_start",
            "section_start",
            "section_end",
            "task_end",
            "job_end",
            "stream_complete"
        ]
    );

    for event in &events {
        assert_eq!(event.envelope.version, "1.0");
        assert_eq!(event.envelope.worker_id.as_deref(), Some("gw0"));
        assert!(event.envelope.timestamp > 0.0);
    }

    let EventBody::TaskEnd(end) = &events[4].body else {
        return Err("expected task_end".into());
    };
    assert_eq!(end.taskid, "t1");
    assert_eq!(end.result, "passed");
    assert_eq!(end.duration, 1.25);
    Ok(())
}

#[test]
fn reporter_output_drives_the_processor() -> TestResult {
    init_tracing();
    let mut reporter = ProgressReporter::new(Vec::new(), EVENT_PREFIX, "gw1");
    reporter.task_start("t1", "a", "tests/a.robot", None)?;
    reporter.task_end("t1", "a", "tests/a.robot", "failed", 0.5)?;
    reporter.task_start("t2", "b", "tests/b.robot", None)?;
    reporter.job_end("job")?;
    reporter.stream_complete()?;

    let output = String::from_utf8(reporter.into_inner())?;
    let mut processor = OutputProcessor::new(
        EVENT_PREFIX,
        VerbosityFilter::new(Verbosity::Quiet, ProducerLevel::Warning),
    );
    let mut saw_sentinel = false;
    for line in output.lines() {
        saw_sentinel |= processor.process_line(line).is_stream_complete();
    }

    assert!(saw_sentinel);
    let table = processor.table();
    let status = |task: &str| table.get(&TaskKey::new(Some("gw1"), task)).map(|r| r.status);
    assert_eq!(status("t1"), Some(TestStatus::Failed));
    assert_eq!(status("t2"), Some(TestStatus::Errored));
    Ok(())
}

#[test]
fn custom_prefix_is_honoured() -> TestResult {
    let mut reporter = ProgressReporter::new(Vec::new(), "@@EV@@", "w");
    reporter.stream_complete()?;

    let output = String::from_utf8(reporter.into_inner())?;
    assert!(output.starts_with("@@EV@@{"));
    assert!(output.ends_with("}\n"));
    assert_eq!(output.matches('\n').count(), 1);
    Ok(())
}

#[test]
fn prefix_tolerates_indentation_and_carriage_return() {
    assert_eq!(
        strip_event_prefix("   NAC_PROGRESS:{\"a\":1}\r", EVENT_PREFIX),
        Some("{\"a\":1}")
    );
    assert_eq!(strip_event_prefix("log NAC_PROGRESS:{}", EVENT_PREFIX), None);
}

#[test]
fn decode_rejects_non_objects_and_missing_tags() {
    assert!(matches!(ProgressEvent::decode("[1,2]"), Err(DecodeError::NotAnObject)));
    assert!(matches!(
        ProgressEvent::decode(r#"{"version":"1.0","timestamp":1.0}"#),
        Err(DecodeError::MissingEvent)
    ));
    assert!(matches!(ProgressEvent::decode("{nope"), Err(DecodeError::Json(_))));
}

#[test]
fn unknown_section_phase_decodes_as_other() -> TestResult {
    let event = ProgressEvent::decode(
        r#"{"version":"1.0","event":"section_start","timestamp":1.0,"section":"teardown_all","parent_task":5}"#,
    )?;
    let EventBody::SectionStart(start) = event.body else {
        return Err("expected section_start".into());
    };
    assert_eq!(start.section, SectionPhase::Other);
    assert_eq!(start.parent_task, "5");
    Ok(())
}

#[test]
fn test_names_come_from_the_path_below_the_last_tests_dir() {
    let cases = [
        ("/work/tests/aci/tenant/verify_bd.robot", "aci.tenant.verify_bd"),
        ("tests/verify_vrf.py", "verify_vrf"),
        ("/srv/tests/old/tests/nxos/verify_vlan.py", "nxos.verify_vlan"),
        ("suite/sdwan/verify_edge.robot", "suite.sdwan.verify_edge"),
        ("verify_plain", "verify_plain"),
    ];

    for (path, expected) in cases {
        assert_eq!(derive_test_name(Path::new(path)), expected, "path {path}");
    }
}
