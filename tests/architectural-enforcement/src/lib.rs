//! Architectural Enforcement Helpers
//!
//! Source scanning shared by the integration tests in `tests/`. The tests
//! enforce rules a compiler won't:
//! - No sleep() calls in production code (timers use `tokio::time::interval`)
//! - No `unwrap()`/`expect()` in production core code
//! - The core library stays free of the HTTP server stack
//!
//! "Production code" is every line of a `src/` file outside `#[cfg(test)]`
//! items and outside comments.

use std::fs;
use std::path::{Path, PathBuf};

/// A production source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// 1-based line number
    pub number: usize,
    /// Line text with any trailing `//` comment removed
    pub code: String,
}

/// A rule violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File the line came from
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// Offending code
    pub code: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line, self.code.trim())
    }
}

/// Root of the `streamer/` crates
pub fn streamer_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("streamer")
}

/// Every `.rs` file under `dir`
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect()
}

/// Production lines of a source text
///
/// Drops `#[cfg(test)]` items (tracked by brace depth), full-line comments
/// and trailing `//` comments.
pub fn production_lines(source: &str) -> Vec<SourceLine> {
    let mut out = Vec::new();
    let mut skipping = false;
    let mut depth: i64 = 0;
    let mut opened = false;

    for (idx, raw) in source.lines().enumerate() {
        let trimmed = raw.trim_start();

        if !skipping && trimmed.starts_with("#[cfg(test)]") {
            skipping = true;
            depth = 0;
            opened = false;
            continue;
        }

        if skipping {
            depth += brace_delta(raw);
            if raw.contains('{') {
                opened = true;
            }
            // a braceless item (`use`, `fn ...;`) ends at its semicolon
            let ended = if opened {
                depth <= 0
            } else {
                trimmed.ends_with(';')
            };
            if ended {
                skipping = false;
            }
            continue;
        }

        if trimmed.starts_with("//") {
            continue;
        }
        let code = raw.split("//").next().unwrap_or(raw);
        out.push(SourceLine {
            number: idx + 1,
            code: code.to_string(),
        });
    }

    out
}

fn brace_delta(line: &str) -> i64 {
    line.chars().fold(0, |acc, c| match c {
        '{' => acc + 1,
        '}' => acc - 1,
        _ => acc,
    })
}

/// Scan production code under `dir` for lines matching `predicate`
pub fn scan<F>(dir: &Path, predicate: F) -> Vec<Violation>
where
    F: Fn(&str) -> bool,
{
    let mut violations = Vec::new();
    for path in rust_files(dir) {
        let Ok(source) = fs::read_to_string(&path) else {
            continue;
        };
        for line in production_lines(&source) {
            if predicate(&line.code) {
                violations.push(Violation {
                    path: path.clone(),
                    line: line.number,
                    code: line.code,
                });
            }
        }
    }
    violations
}

/// Whether a line calls a sleep function
pub fn is_sleep_call(code: &str) -> bool {
    code.contains("::sleep(") || code.contains(".sleep(") || code.contains("sleep_until(")
}

/// Whether a line unwraps a `Result`/`Option` with a panic
pub fn is_panicking_unwrap(code: &str) -> bool {
    code.contains(".unwrap()") || code.contains(".expect(")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cfg_test_module_is_skipped() {
        let source = "fn real() {\n    work();\n}\n\n#[cfg(test)]\nmod tests {\n    fn t() {\n        x.unwrap();\n    }\n}\n\nfn after() {}\n";
        let lines = production_lines(source);
        let codes: Vec<&str> = lines.iter().map(|l| l.code.trim()).collect();

        assert!(codes.contains(&"work();"));
        assert!(codes.contains(&"fn after() {}"));
        assert!(!codes.iter().any(|c| c.contains("unwrap")));
    }

    #[test]
    fn test_cfg_test_use_is_skipped() {
        let source = "#[cfg(test)]\nuse crate::helpers::sample;\nfn keep() { a.expect(\"x\"); }\n";
        let lines = production_lines(source);
        assert_eq!(lines.len(), 1);
        assert!(is_panicking_unwrap(&lines[0].code));
    }

    #[test]
    fn test_comments_are_ignored() {
        let lines = production_lines("// tokio::time::sleep(d)\nlet x = 1; // .unwrap()\n");
        assert_eq!(lines.len(), 1);
        assert!(!is_panicking_unwrap(&lines[0].code));
        assert!(!is_sleep_call(&lines[0].code));
    }

    #[test]
    fn test_matchers() {
        assert!(is_sleep_call("tokio::time::sleep(Duration::from_millis(10)).await;"));
        assert!(is_sleep_call("std::thread::sleep(d);"));
        assert!(!is_sleep_call("ticker.tick().await;"));
        assert!(is_panicking_unwrap("let v = x.unwrap();"));
        assert!(!is_panicking_unwrap("let v = x.unwrap_or_default();"));
    }
}
