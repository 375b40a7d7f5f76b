//! Main Application
//!
//! The App wires a [`MessageStore`] to a [`ThrottledNotifier`] and draws the
//! store whenever the notifier's version moves:
//! - Terminal events (keys, resize) are handled as they arrive
//! - A [`DemoProducer`] streams scripted replies into the store
//! - Redraws happen only on version changes, never per append
//!
//! [`run_headless`] drives the same pipeline without a terminal and reports
//! what a surface would have drawn.

use std::io::Write;

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use ratatui::backend::Backend;
use ratatui::Terminal;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;

use streambuf_core::{
    Message, MessageId, MessageKind, MessageStore, StoreError, StreamConfig, ThrottledNotifier,
};

use crate::display::{self, StatusInfo, Viewport};
use crate::producer::{DemoProducer, DEMO_SCRIPT};

/// Rows scrolled per PageUp/PageDown
const PAGE_LINES: usize = 10;

/// Main application state
pub struct App {
    /// Is the app still running?
    running: bool,

    // === Message Pipeline ===
    store: MessageStore,
    notifier: ThrottledNotifier,
    /// Version changes, one item per redraw signal
    updates: WatchStream<u64>,

    // === Producer ===
    producer: DemoProducer,
    /// Reply currently streaming, if any
    streaming: Option<JoinHandle<Result<MessageId, StoreError>>>,
    /// Next exchange of the demo script to play
    next_exchange: usize,

    // === View State ===
    viewport: Viewport,
    frames: u64,
}

impl App {
    /// Create a new App instance
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(config: &StreamConfig) -> Self {
        let store = MessageStore::new();
        let notifier = ThrottledNotifier::new(store.clone(), config.throttle_interval);
        let updates = notifier.updates();
        let producer = DemoProducer::new(store.clone(), config.producer.clone());

        Self {
            running: true,
            store,
            notifier,
            updates,
            producer,
            streaming: None,
            next_exchange: 0,
            viewport: Viewport::default(),
            frames: 0,
        }
    }

    /// Main event loop
    pub async fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> anyhow::Result<()> {
        let mut event_stream = EventStream::new();

        self.producer.post(
            MessageKind::System,
            "Scripted replies stream in below. The screen redraws at most once per throttle window.",
        )?;
        self.notifier.attach();
        self.start_exchange();

        while self.running {
            tokio::select! {
                biased;

                // Terminal events - highest priority
                maybe_event = event_stream.next() => match maybe_event {
                    Some(Ok(event)) => self.handle_event(event, terminal)?,
                    Some(Err(e)) => return Err(e.into()),
                    None => self.running = false,
                },

                // Redraw signal from the throttled notifier
                maybe_version = self.updates.next() => match maybe_version {
                    Some(version) => {
                        tracing::trace!(version, "Redraw");
                        self.render(terminal)?;
                    }
                    None => self.running = false,
                },
            }
        }

        self.stop_streaming();
        self.notifier.detach();
        tracing::debug!(frames = self.frames, stats = ?self.notifier.stats(), "App stopped");
        Ok(())
    }

    fn handle_event<B: Backend>(
        &mut self,
        event: Event,
        terminal: &mut Terminal<B>,
    ) -> anyhow::Result<()> {
        match event {
            // Only handle Press events (not Release or Repeat)
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if self.handle_key(key) {
                    self.render(terminal)?;
                }
            }
            Event::Resize(..) => self.render(terminal)?,
            _ => {}
        }
        Ok(())
    }

    /// Handle keyboard input, returning true if only the view changed
    ///
    /// Store mutations redraw through the notifier; scrolling has no store
    /// mutation behind it and needs a direct redraw.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => self.running = false,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.running = false;
            }

            KeyCode::Char('n') | KeyCode::Enter => {
                self.viewport.follow();
                self.start_exchange();
            }
            KeyCode::Char('c') => {
                self.stop_streaming();
                self.viewport.follow();
                self.store.clear();
            }

            KeyCode::PageUp => {
                self.viewport.scroll_up(PAGE_LINES);
                return true;
            }
            KeyCode::PageDown => {
                self.viewport.scroll_down(PAGE_LINES);
                return true;
            }
            KeyCode::End => {
                self.viewport.follow();
                return true;
            }

            _ => {}
        }
        false
    }

    fn is_streaming(&self) -> bool {
        self.streaming
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Start the next scripted exchange unless a reply is still streaming
    fn start_exchange(&mut self) {
        if self.is_streaming() {
            return;
        }
        let exchange = DEMO_SCRIPT[self.next_exchange % DEMO_SCRIPT.len()];
        self.next_exchange += 1;

        let producer = self.producer.clone();
        self.streaming = Some(tokio::spawn(async move { producer.play(&exchange).await }));
    }

    fn stop_streaming(&mut self) {
        if let Some(task) = self.streaming.take() {
            task.abort();
        }
    }

    fn render<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> anyhow::Result<()> {
        let snapshot = self.notifier.snapshot();
        let status = StatusInfo {
            version: self.notifier.version(),
            stats: self.notifier.stats(),
            frames: self.frames + 1,
            streaming: self.is_streaming(),
        };
        let viewport = &mut self.viewport;

        terminal.draw(|frame| display::render(frame, &snapshot, viewport, &status))?;
        self.frames += 1;
        Ok(())
    }

    /// Frames drawn so far
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

// ============================================================================
// Headless Mode
// ============================================================================

/// Summary of a headless run
#[derive(Debug, Serialize)]
pub struct HeadlessReport {
    /// Final notifier version
    pub version: u64,
    /// Version changes observed, one per would-be redraw
    pub redraws: u64,
    /// Store mutations the notifier saw
    pub raw_notifications: u64,
    /// Timer fires that bumped the version
    pub flushes: u64,
    /// Final store contents
    pub messages: Vec<Message>,
}

/// Report one observed version change
fn write_redraw<W: Write>(
    out: &mut W,
    versions: &mut watch::Receiver<u64>,
    notifier: &ThrottledNotifier,
) -> anyhow::Result<()> {
    let version = *versions.borrow_and_update();
    let snapshot = notifier.snapshot();
    let bytes: usize = snapshot.iter().map(|m| m.content.len()).sum();
    writeln!(out, "version {version}: {} messages, {bytes} bytes", snapshot.len())?;
    Ok(())
}

/// Play the whole demo script without a terminal
///
/// Writes one line per version change to `out`, then returns once the
/// producer has finished and the last window has flushed.
pub async fn run_headless<W: Write>(
    config: &StreamConfig,
    out: &mut W,
) -> anyhow::Result<HeadlessReport> {
    let store = MessageStore::new();
    let notifier = ThrottledNotifier::new(store.clone(), config.throttle_interval);
    notifier.attach();
    let mut versions = notifier.subscribe_versions();

    let producer = DemoProducer::new(store, config.producer.clone());
    let mut playback = tokio::spawn(async move { producer.play_script(DEMO_SCRIPT).await });
    let mut finished = false;
    let mut redraws = 0;

    loop {
        tokio::select! {
            biased;

            changed = versions.changed() => {
                changed?;
                write_redraw(out, &mut versions, &notifier)?;
                redraws += 1;
            }
            done = &mut playback, if !finished => {
                done??;
                finished = true;
            }
        }

        if finished && !notifier.is_pending() && !notifier.is_armed() {
            // The last flush can land between the poll above and this check
            if versions.has_changed()? {
                write_redraw(out, &mut versions, &notifier)?;
                redraws += 1;
            }
            break;
        }
    }

    let stats = notifier.stats();
    notifier.detach();
    Ok(HeadlessReport {
        version: notifier.version(),
        redraws,
        raw_notifications: stats.raw_notifications,
        flushes: stats.flushes,
        messages: notifier.snapshot().to_vec(),
    })
}
