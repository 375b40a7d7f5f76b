//! Integration Test: Panic Prohibition
//!
//! **Policy**: Core production code propagates errors; it MUST NOT call
//! `.unwrap()` or `.expect(..)`.
//! **Exceptions**: `#[cfg(test)]` modules and doc comments.

use architectural_enforcement::{report, scan};

#[test]
fn test_no_unwrap_or_expect_in_core() {
    let violations = scan("streambuf/core/src", &[], |code| {
        code.contains(".unwrap()") || code.contains(".expect(")
    });

    report(".unwrap() / .expect( in core production code", &violations);
}

#[test]
fn test_core_has_no_ui_dependencies() {
    let violations = scan("streambuf/core/src", &[], |code| {
        code.contains("ratatui::") || code.contains("crossterm::")
    });

    report("UI framework imports in the core crate", &violations);
}
