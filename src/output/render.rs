// src/output/render.rs

use owo_colors::OwoColorize;

use crate::output::status::{TestStatus, TestStatusRecord};

/// One-line completion message for a terminal record.
///
/// Green for passed, red for failed/errored, yellow for everything else.
pub fn render_completion(record: &TestStatusRecord, color: bool) -> String {
    let device = record
        .device
        .as_deref()
        .map(|d| format!(" ({d})"))
        .unwrap_or_default();
    let duration = record.duration.unwrap_or(0.0);

    let (symbol, label) = match record.status {
        TestStatus::Passed => ("✓", record.status.as_str()),
        TestStatus::Failed | TestStatus::Errored => ("✗", record.status.as_str()),
        _ => ("-", record.status.as_str()),
    };

    let text = format!(
        "{symbol} [{}] {}{device} {label} in {duration:.1}s",
        record.test_id, record.title
    );

    if !color {
        return text;
    }

    match record.status {
        TestStatus::Passed => text.green().to_string(),
        TestStatus::Failed | TestStatus::Errored => text.red().to_string(),
        _ => text.yellow().to_string(),
    }
}
