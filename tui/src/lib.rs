//! Streambuf TUI - Terminal surface for the streambuf message pipeline
//!
//! A small full-screen client that renders a [`streambuf_core::MessageStore`]
//! at frame rate while a simulated backend streams replies into it.
//!
//! # Architecture
//!
//! - **App**: event loop; redraws on throttled version changes only
//! - **Display**: snapshot to wrapped lines, plus the status bar
//! - **Producer**: scripted replies streamed chunk by chunk with jitter

pub mod app;
pub mod display;
pub mod producer;

pub use app::{run_headless, App, HeadlessReport};
pub use producer::{DemoProducer, Exchange, DEMO_SCRIPT};
