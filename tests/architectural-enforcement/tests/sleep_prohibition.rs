//! Integration Test: Sleep Prohibition
//!
//! **Policy**: production code in the streamer crates MUST NOT call sleep.
//! Periodic work goes through `tokio::time::interval`, waiting goes through
//! channels. Test code may sleep (the tests run on a paused clock).

use architectural_enforcement::{is_sleep_call, scan, streamer_root, Violation};

fn report(violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ Sleep calls found in production code:\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    eprintln!("\n✅ Use tokio::time::interval for periodic work and channels for waiting");
    panic!("Found {} sleep violation(s) in production code", violations.len());
}

#[test]
fn test_no_sleep_in_core() {
    let dir = streamer_root().join("core").join("src");
    assert!(dir.exists(), "missing {}", dir.display());
    report(&scan(&dir, is_sleep_call));
}

#[test]
fn test_no_sleep_in_daemon() {
    let dir = streamer_root().join("daemon").join("src");
    assert!(dir.exists(), "missing {}", dir.display());
    report(&scan(&dir, is_sleep_call));
}
