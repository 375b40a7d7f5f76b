//! Streambuf Core - Streamed Message Buffering with Throttled Redraws
//!
//! This crate holds the messages a streaming response produces and tells a
//! rendering surface when to redraw them, without tying either side to a UI
//! framework.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  start / append /  ┌──────────────┐  raw ping   ┌───────────────────┐
//! │   Producer   │  finish / clear    │ MessageStore │ ──────────▶ │ ThrottledNotifier │
//! │ (LLM stream) │ ─────────────────▶ │              │             │  ≤ 1 bump / 16ms  │
//! └──────────────┘                    └──────┬───────┘             └─────────┬─────────┘
//!                                            │ snapshot()                    │ version
//!                                            ▼                               ▼
//!                                    ┌─────────────────────────────────────────────┐
//!                                    │        Rendering surface (TUI, GUI)         │
//!                                    └─────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`MessageStore`]: ordered, append-only buffer with raw change notifications
//! - [`Snapshot`]: immutable view of the store at one point in time
//! - [`Subscription`]: RAII handle for a raw-notification callback
//! - [`ThrottledNotifier`]: coalesces raw notifications into a version counter
//! - [`StreamConfig`]: TOML/env configuration for surfaces
//!
//! # Module Overview
//!
//! - [`messages`]: message identity, kind and content
//! - [`store`]: the message store and its subscriptions
//! - [`streaming`]: render throttling
//! - [`config`]: configuration file and environment loading
//!
//! # No TUI Dependencies
//!
//! Like any core crate that several surfaces share, this one has no
//! dependency on ratatui, crossterm, or any other UI framework.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod messages;
pub mod store;
pub mod streaming;

// Re-exports for convenience
pub use messages::{Message, MessageId, MessageKind};
pub use store::{MessageStore, Snapshot, StoreError, Subscription, UpdateCallback};
pub use streaming::{NotifierStats, ThrottledNotifier, DEFAULT_THROTTLE_INTERVAL};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, ProducerConfig, StreamConfig, StreamToml,
};
