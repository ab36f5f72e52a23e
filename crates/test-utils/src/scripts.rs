//! Fake runner scripts: small `sh` programs standing in for the real test
//! runner. Jobs built with [`crate::builders::JobBuilder`] point their
//! `job_file` at the script and the config runs `sh {job_file}`.

use std::fs;
use std::path::{Path, PathBuf};

/// Write `body` as `<dir>/runner.sh` and return its path.
pub fn write_runner_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("runner.sh");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write runner script");
    path
}

/// `printf` commands writing each line to stdout.
pub fn print_lines<S: AsRef<str>>(lines: &[S]) -> String {
    lines
        .iter()
        .map(|l| format!("printf '%s\\n' {}", sh_quote(l.as_ref())))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Single-quote `s` for `sh`.
pub fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Script that prints `lines`, creates the archive file and exits `code`.
pub fn runner_body<S: AsRef<str>>(lines: &[S], archive_name: &str, code: i32) -> String {
    format!(
        "{}\n: > {}\nexit {code}",
        print_lines(lines),
        sh_quote(archive_name)
    )
}
