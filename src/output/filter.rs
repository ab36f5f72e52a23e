// src/output/filter.rs

//! Verbosity filter for plain (non-event) runner output.
//!
//! Runs once per line, so the quiet path is substring checks only; the
//! level regex is consulted at `normal` verbosity.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{ProducerLevel, Verbosity};

/// Keywords that make a line visible even at the quietest level.
const SEVERITY_KEYWORDS: &[&str] = &[
    "ERROR",
    "FAILED",
    "CRITICAL",
    "Traceback",
    "Exception",
];

/// Leading characters of table borders and summary boxes.
const DECORATION_LEADERS: &[char] = &[
    '|', '+', '│', '┃', '├', '┤', '└', '┘', '┌', '┐', '╭', '╰', '║', '╔', '╚', '╠', '═', '─',
];

static LEVEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:%[A-Z0-9_]+-|\s-\s|\[|^)(DEBUG|INFO|WARNING|WARN|ERROR|CRITICAL)\b")
        .expect("level pattern is a valid regex")
});

#[derive(Debug, Clone, Copy)]
pub struct VerbosityFilter {
    verbosity: Verbosity,
    threshold: ProducerLevel,
}

impl VerbosityFilter {
    pub fn new(verbosity: Verbosity, threshold: ProducerLevel) -> Self {
        Self {
            verbosity,
            threshold,
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn should_show(&self, line: &str) -> bool {
        match self.verbosity {
            Verbosity::Verbose => true,
            Verbosity::Quiet => is_severe(line),
            Verbosity::Normal => {
                is_severe(line) || embedded_level(line).is_some_and(|lvl| lvl >= self.threshold)
            }
        }
    }
}

/// Severity keyword present and the line is not decoration.
pub fn is_severe(line: &str) -> bool {
    SEVERITY_KEYWORDS.iter().any(|kw| line.contains(kw)) && !looks_like_decoration(line)
}

/// Table borders, box-drawing rows and separator rules.
pub fn looks_like_decoration(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.starts_with(DECORATION_LEADERS) {
        return true;
    }
    trimmed.len() >= 4 && trimmed.chars().all(|c| "-=*_~+ ".contains(c))
}

/// Level the producer embedded in its own log line, if any.
pub fn embedded_level(line: &str) -> Option<ProducerLevel> {
    let caps = LEVEL_RE.captures(line)?;
    caps.get(1)?.as_str().parse().ok()
}
