//! Render Throttling for Streamed Messages
//!
//! A streaming response can append to the store hundreds of times per second.
//! Redrawing on every append would burn CPU for frames no human can see, so
//! the [`ThrottledNotifier`] sits between the store and the rendering surface
//! and turns that burst into at most one "redraw now" signal per frame.
//!
//! # Architecture
//!
//! ```text
//!  MessageStore ──raw ping──▶ ThrottledNotifier ──version++──▶ render loop
//!   (every append)            ┌──────────────────┐             (≤ 1 per window)
//!                             │ pending: bool    │
//!                             │ timer: Option<_> │
//!                             └──────────────────┘
//! ```
//!
//! The first ping in a quiet period arms a timer for one interval; further
//! pings only set the pending flag. When the timer fires, a pending flag turns
//! into exactly one version bump. The consumer watches the version and reads
//! [`ThrottledNotifier::snapshot`] whenever it changes.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use streambuf_core::{MessageKind, MessageStore, ThrottledNotifier};
//!
//! let store = MessageStore::new();
//! let notifier = ThrottledNotifier::new(store.clone(), Duration::from_millis(16));
//! notifier.attach();
//!
//! let mut versions = notifier.subscribe_versions();
//! let id = store.start_message(MessageKind::Assistant);
//! store.append_content(id, "Hello")?;
//!
//! versions.changed().await?;
//! render(&notifier.snapshot());
//! ```

mod throttle;

pub use throttle::{NotifierStats, ThrottledNotifier, DEFAULT_THROTTLE_INTERVAL};
