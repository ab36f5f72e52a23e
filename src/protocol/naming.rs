// src/protocol/naming.rs

use std::path::{Component, Path};

/// Path segment that marks the root of the test tree.
pub const TEST_ROOT_MARKER: &str = "tests";

/// Derive a dotted test name from a test file path.
///
/// Everything after the *last* `tests` segment is kept, the extension is
/// dropped and the remaining segments are joined with dots:
///
/// `/work/tests/aci/tenant/verify_bd.robot` -> `aci.tenant.verify_bd`
///
/// Without the marker the whole (relative) path is used.
pub fn derive_test_name(path: &Path) -> String {
    let segments: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let start = segments
        .iter()
        .rposition(|s| s == TEST_ROOT_MARKER)
        .map(|idx| idx + 1)
        .unwrap_or(0);

    let mut tail: Vec<String> = segments[start..].to_vec();
    if let Some(last) = tail.last_mut() {
        if let Some(stem) = Path::new(last.as_str()).file_stem() {
            *last = stem.to_string_lossy().into_owned();
        }
    }

    tail.join(".")
}
