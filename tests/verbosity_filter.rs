use nac_runner::output::VerbosityFilter;
use nac_runner::output::filter::{embedded_level, is_severe, looks_like_decoration};
use nac_runner::types::{ProducerLevel, Verbosity};

#[test]
fn quiet_shows_only_severe_non_decoration_lines() {
    let f = VerbosityFilter::new(Verbosity::Quiet, ProducerLevel::Debug);

    assert!(f.should_show("ERROR: connection refused"));
    assert!(f.should_show("Traceback (most recent call last):"));
    assert!(f.should_show("test verify_bd FAILED"));
    assert!(!f.should_show("2024-01-01 - INFO - starting section"));
    assert!(!f.should_show("|   verify_bd   |  FAILED  |"));
    assert!(!f.should_show("+-----------+--------+"));
    assert!(!f.should_show(""));
}

#[test]
fn normal_adds_lines_at_or_above_the_threshold() {
    let f = VerbosityFilter::new(Verbosity::Normal, ProducerLevel::Warning);

    assert!(f.should_show("%AETEST-WARNING: section skipped"));
    assert!(f.should_show("2024-01-01 12:00:00 - ERROR - boom"));
    assert!(f.should_show("[CRITICAL] device lost"));
    assert!(!f.should_show("%AETEST-INFO: Starting common setup"));
    assert!(!f.should_show("[DEBUG] payload"));
    assert!(!f.should_show("no level here"));
    // Severity keywords still win regardless of the threshold.
    assert!(f.should_show("Exception raised in cleanup"));
}

#[test]
fn verbose_passes_everything() {
    let f = VerbosityFilter::new(Verbosity::Verbose, ProducerLevel::Critical);

    for line in ["", "plain", "|----|", "%AETEST-DEBUG: x"] {
        assert!(f.should_show(line), "line {line:?} hidden");
    }
}

#[test]
fn embedded_levels_are_recognised_in_common_formats() {
    assert_eq!(embedded_level("%AETEST-INFO: hi"), Some(ProducerLevel::Info));
    assert_eq!(embedded_level("x - WARN - y"), Some(ProducerLevel::Warning));
    assert_eq!(embedded_level("[ERROR] z"), Some(ProducerLevel::Error));
    assert_eq!(embedded_level("DEBUG at line start"), Some(ProducerLevel::Debug));
    assert_eq!(embedded_level("INFORMATIONAL only"), None);
    assert_eq!(embedded_level("nothing"), None);
}

#[test]
fn decoration_detection() {
    assert!(looks_like_decoration("│ ERROR │"));
    assert!(looks_like_decoration("  ==========  "));
    assert!(looks_like_decoration("-----"));
    assert!(!looks_like_decoration("ERROR - something"));
    assert!(!is_severe("╭── ERROR summary ──╮"));
}
