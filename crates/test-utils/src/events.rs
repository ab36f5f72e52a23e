//! Hand-built progress event lines with explicit timestamps, so tests can
//! replay deterministic streams.

use nac_runner::protocol::EVENT_PREFIX;
use serde_json::{Value, json};

pub fn line(value: Value) -> String {
    format!("{EVENT_PREFIX}{value}")
}

pub fn job_start(worker: &str, name: &str, ts: f64) -> String {
    line(json!({
        "version": "1.0", "event": "job_start", "timestamp": ts,
        "worker_id": worker, "name": name, "pid": 4242
    }))
}

pub fn job_end(worker: &str, name: &str, ts: f64) -> String {
    line(json!({
        "version": "1.0", "event": "job_end", "timestamp": ts,
        "worker_id": worker, "name": name, "pid": 4242
    }))
}

pub fn task_start(worker: &str, taskid: &str, test_name: &str, ts: f64) -> String {
    line(json!({
        "version": "1.0", "event": "task_start", "timestamp": ts,
        "worker_id": worker, "taskid": taskid, "test_name": test_name,
        "test_file": format!("tests/{test_name}.py"), "hostname": "leaf-101", "pid": 4242
    }))
}

pub fn task_end(
    worker: &str,
    taskid: &str,
    test_name: &str,
    result: &str,
    duration: f64,
    ts: f64,
) -> String {
    line(json!({
        "version": "1.0", "event": "task_end", "timestamp": ts,
        "worker_id": worker, "taskid": taskid, "test_name": test_name,
        "test_file": format!("tests/{test_name}.py"), "result": result,
        "duration": duration, "pid": 4242
    }))
}

pub fn section_start(worker: &str, section: &str, parent_task: &str, ts: f64) -> String {
    line(json!({
        "version": "1.0", "event": "section_start", "timestamp": ts,
        "worker_id": worker, "section": section, "parent_task": parent_task
    }))
}

pub fn section_end(worker: &str, section: &str, parent_task: &str, result: &str, ts: f64) -> String {
    line(json!({
        "version": "1.0", "event": "section_end", "timestamp": ts,
        "worker_id": worker, "section": section, "parent_task": parent_task,
        "result": result
    }))
}

pub fn stream_complete(worker: &str, ts: f64) -> String {
    line(json!({
        "version": "1.0", "event": "stream_complete", "timestamp": ts,
        "worker_id": worker
    }))
}
