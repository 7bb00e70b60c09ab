//! Integration Test: Core Layering
//!
//! The core library is transport-agnostic: it must not depend on the HTTP
//! server stack, and it must propagate errors instead of panicking.

use std::fs;

use architectural_enforcement::{is_panicking_unwrap, scan, streamer_root};

const SERVER_CRATES: [&str; 3] = ["axum", "hyper", "tower-http"];

/// Core's manifest does not pull in a server framework
#[test]
fn test_core_manifest_has_no_server_stack() {
    let manifest = streamer_root().join("core").join("Cargo.toml");
    let content = fs::read_to_string(&manifest).expect("read core Cargo.toml");

    for line in content.lines() {
        let name = line.split('=').next().unwrap_or_default().trim();
        assert!(
            !SERVER_CRATES.contains(&name),
            "core depends on server crate '{name}': {}",
            manifest.display()
        );
    }
}

/// Core sources never import a server framework
#[test]
fn test_core_sources_do_not_use_server_stack() {
    let dir = streamer_root().join("core").join("src");
    let violations = scan(&dir, |code| {
        SERVER_CRATES
            .iter()
            .any(|krate| code.contains(&format!("use {}::", krate.replace('-', "_"))))
    });

    for violation in &violations {
        eprintln!("  ❌ {violation}");
    }
    assert!(violations.is_empty(), "core imports the server stack");
}

/// Core production code propagates errors instead of panicking
#[test]
fn test_no_unwrap_in_core_production_code() {
    let dir = streamer_root().join("core").join("src");
    let violations = scan(&dir, is_panicking_unwrap);

    for violation in &violations {
        eprintln!("  ❌ {violation}");
    }
    assert!(
        violations.is_empty(),
        "Found {} unwrap()/expect() call(s) in core production code",
        violations.len()
    );
}

/// The daemon is the only crate allowed to use anyhow
#[test]
fn test_anyhow_stays_in_daemon() {
    let dir = streamer_root().join("core").join("src");
    let violations = scan(&dir, |code| code.contains("anyhow"));
    assert!(violations.is_empty(), "core uses anyhow: {violations:?}");
}
