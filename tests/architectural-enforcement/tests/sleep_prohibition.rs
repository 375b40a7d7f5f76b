//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT block a thread with `std::thread::sleep`.
//! The core crate may only wait on a timer inside the render throttle, whose
//! single deadline is the whole point of the component.
//! **Exceptions**: test code, and async sleeps in the TUI producer that pace
//! simulated output.

use architectural_enforcement::{report, scan};

const PRODUCTION_DIRS: &[&str] = &["streambuf/core/src", "tui/src"];

#[test]
fn test_no_thread_sleep_in_production_code() {
    let violations: Vec<_> = PRODUCTION_DIRS
        .iter()
        .flat_map(|dir| {
            scan(dir, &[], |code| {
                code.contains("thread::sleep(") || code.contains("thread::sleep_ms(")
            })
        })
        .collect();

    report("std::thread::sleep in production code", &violations);
}

#[test]
fn test_core_only_waits_inside_throttle() {
    let violations = scan(
        "streambuf/core/src",
        &["streaming/throttle.rs"],
        |code| code.contains("sleep(") || code.contains("sleep_until(") || code.contains("interval("),
    );

    report(
        "timer waits in the core outside streaming/throttle.rs",
        &violations,
    );
}
