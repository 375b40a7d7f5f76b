//! Throttled Notifier Implementation
//!
//! Coalesces the store's raw per-mutation pings into at most one version bump
//! per interval.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio_stream::wrappers::WatchStream;

use crate::store::{MessageStore, Snapshot, Subscription};

/// Default coalescing window: one 60 Hz frame
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(16);

// ============================================================================
// Statistics
// ============================================================================

/// Counters for a notifier instance
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NotifierStats {
    /// Raw store notifications received while attached
    pub raw_notifications: u64,
    /// Timer fires that produced a version bump
    pub flushes: u64,
    /// Timer fires that found nothing pending
    pub spurious_fires: u64,
}

// ============================================================================
// Shared Throttle State
// ============================================================================

#[derive(Default)]
struct ThrottleState {
    attached: bool,
    /// A mutation arrived since the last bump
    pending: bool,
    /// Armed flush timer, if any
    timer: Option<AbortHandle>,
    /// Incremented on attach/detach; a timer from an older epoch is stale
    epoch: u64,
    stats: NotifierStats,
}

/// State reachable from the store callback and the timer task
///
/// Holds no reference to the store, so the callback does not keep the
/// notifier alive through a cycle.
struct Shared {
    state: Mutex<ThrottleState>,
    version: watch::Sender<u64>,
    interval: Duration,
    runtime: Handle,
}

impl Shared {
    fn on_raw_update(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if !state.attached {
            return;
        }

        state.stats.raw_notifications += 1;
        state.pending = true;

        if state.timer.is_none() {
            // Deadline is fixed at arm time, not at first poll of the task
            let deadline = tokio::time::Instant::now() + self.interval;
            let epoch = state.epoch;
            let shared = Arc::clone(self);
            let task = self.runtime.spawn(async move {
                tokio::time::sleep_until(deadline).await;
                shared.flush(epoch);
            });
            state.timer = Some(task.abort_handle());
            tracing::trace!(interval = ?self.interval, "Throttle timer armed");
        }
    }

    fn flush(&self, epoch: u64) {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return;
        }

        state.timer = None;
        if state.pending {
            state.pending = false;
            state.stats.flushes += 1;
            self.bump();
        } else {
            state.stats.spurious_fires += 1;
            tracing::trace!("Throttle timer fired with nothing pending");
        }
    }

    fn bump(&self) {
        let mut current = 0;
        self.version.send_modify(|version| {
            *version += 1;
            current = *version;
        });
        tracing::trace!(version = current, "Render version bumped");
    }
}

// ============================================================================
// Throttled Notifier
// ============================================================================

/// Rate-limited "redraw now" signal over a [`MessageStore`]
///
/// # State Machine
///
/// ```text
///            raw ping                     raw ping (timer untouched)
///   ┌──────┐ ─────────▶ ┌───────┐ ◀──────────────┐
///   │ Idle │            │ Armed │ ───────────────┘
///   └──────┘ ◀───────── └───────┘
///            timer fires: bump version once
/// ```
///
/// `detach()` from any state returns to `Idle` and releases the store
/// subscription. Dropping the notifier detaches it.
pub struct ThrottledNotifier {
    store: MessageStore,
    shared: Arc<Shared>,
    subscription: Mutex<Option<Subscription>>,
}

impl ThrottledNotifier {
    /// Create a detached notifier on the current Tokio runtime
    ///
    /// # Panics
    ///
    /// Panics if called outside the context of a Tokio runtime.
    #[must_use]
    pub fn new(store: MessageStore, interval: Duration) -> Self {
        Self::with_runtime(store, interval, Handle::current())
    }

    /// Create a detached notifier whose timers run on `runtime`
    #[must_use]
    pub fn with_runtime(store: MessageStore, interval: Duration, runtime: Handle) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            store,
            shared: Arc::new(Shared {
                state: Mutex::new(ThrottleState::default()),
                version,
                interval,
                runtime,
            }),
            subscription: Mutex::new(None),
        }
    }

    /// Start listening to the store
    ///
    /// Bumps the version once straight away so a consumer attaching to a
    /// non-empty store renders what is already there. Attaching an attached
    /// notifier does nothing.
    pub fn attach(&self) {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            return;
        }

        {
            let mut state = self.shared.state.lock();
            state.attached = true;
            state.pending = false;
            state.epoch += 1;
        }

        let shared = Arc::clone(&self.shared);
        *subscription = Some(self.store.on_update(move || shared.on_raw_update()));

        // Subscribed before the initial bump, so nothing between the two is lost
        self.shared.bump();

        tracing::debug!(
            interval = ?self.shared.interval,
            "Throttled notifier attached"
        );
    }

    /// Stop listening and cancel any armed timer
    ///
    /// Returns `true` if the notifier was attached. Once this returns, the
    /// version does not change again until the next `attach()`.
    pub fn detach(&self) -> bool {
        let Some(subscription) = self.subscription.lock().take() else {
            return false;
        };
        subscription.unsubscribe();

        let mut state = self.shared.state.lock();
        state.attached = false;
        state.pending = false;
        state.epoch += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        tracing::debug!("Throttled notifier detached");
        true
    }

    /// Whether the notifier is currently subscribed to the store
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Current messages (delegates to the store)
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    /// The coalesced version counter
    #[must_use]
    pub fn version(&self) -> u64 {
        *self.shared.version.borrow()
    }

    /// Receiver that observes every version bump
    #[must_use]
    pub fn subscribe_versions(&self) -> watch::Receiver<u64> {
        self.shared.version.subscribe()
    }

    /// Version bumps as a stream
    ///
    /// The stream yields the current version first, then each later one.
    #[must_use]
    pub fn updates(&self) -> WatchStream<u64> {
        WatchStream::new(self.subscribe_versions())
    }

    /// The store this notifier wraps
    #[must_use]
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// The coalescing window
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    /// Whether a flush timer is currently armed
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.shared.state.lock().timer.is_some()
    }

    /// Whether a mutation is waiting for the next flush
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.shared.state.lock().pending
    }

    /// Counters since construction
    #[must_use]
    pub fn stats(&self) -> NotifierStats {
        self.shared.state.lock().stats
    }
}

impl Drop for ThrottledNotifier {
    fn drop(&mut self) {
        self.detach();
    }
}

impl fmt::Debug for ThrottledNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottledNotifier")
            .field("interval", &self.shared.interval)
            .field("version", &self.version())
            .field("attached", &self.is_attached())
            .field("armed", &self.is_armed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageKind;
    use tokio::time::sleep;
    use tokio_test::{assert_pending, assert_ready};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test]
    async fn test_new_notifier_is_detached() {
        let notifier = ThrottledNotifier::new(MessageStore::new(), DEFAULT_THROTTLE_INTERVAL);
        assert!(!notifier.is_attached());
        assert_eq!(notifier.version(), 0);
        assert_eq!(notifier.interval(), ms(16));
        assert_eq!(notifier.stats(), NotifierStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_bumps_immediately() {
        let store = MessageStore::new();
        let notifier = ThrottledNotifier::new(store.clone(), ms(16));

        notifier.attach();
        assert_eq!(notifier.version(), 1);
        assert!(notifier.is_attached());
        assert_eq!(store.subscriber_count(), 1);
        assert!(!notifier.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_twice_is_noop() {
        let store = MessageStore::new();
        let notifier = ThrottledNotifier::new(store.clone(), ms(16));

        notifier.attach();
        notifier.attach();
        assert_eq!(notifier.version(), 1);
        assert_eq!(store.subscriber_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_raw_update_arms_single_timer() {
        let store = MessageStore::new();
        let notifier = ThrottledNotifier::new(store.clone(), ms(16));
        notifier.attach();

        let id = store.start_message(MessageKind::Assistant);
        assert!(notifier.is_armed());
        assert!(notifier.is_pending());

        store.append_content(id, "a").unwrap();
        store.append_content(id, "b").unwrap();
        assert!(notifier.is_armed());
        assert_eq!(notifier.stats().raw_notifications, 3);

        sleep(ms(17)).await;
        assert!(!notifier.is_armed());
        assert!(!notifier.is_pending());
        assert_eq!(notifier.version(), 2);
        assert_eq!(notifier.stats().flushes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_is_not_extended_by_later_updates() {
        let store = MessageStore::new();
        let notifier = ThrottledNotifier::new(store.clone(), ms(16));
        notifier.attach();

        let id = store.start_message(MessageKind::Assistant);
        sleep(ms(10)).await;
        store.append_content(id, "x").unwrap();
        sleep(ms(5)).await;
        store.append_content(id, "y").unwrap();
        assert_eq!(notifier.version(), 1);

        // First mutation was at t=0, so the flush lands at t=16 regardless
        sleep(ms(2)).await;
        assert_eq!(notifier.version(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_cancels_armed_timer() {
        let store = MessageStore::new();
        let notifier = ThrottledNotifier::new(store.clone(), ms(16));
        notifier.attach();

        store.start_message(MessageKind::Assistant);
        assert!(notifier.is_armed());

        assert!(notifier.detach());
        assert!(!notifier.is_armed());
        assert!(!notifier.is_pending());
        assert_eq!(store.subscriber_count(), 0);

        sleep(ms(50)).await;
        assert_eq!(notifier.version(), 1);
        assert_eq!(notifier.stats().flushes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_is_idempotent() {
        let store = MessageStore::new();
        let notifier = ThrottledNotifier::new(store.clone(), ms(16));
        notifier.attach();

        assert!(notifier.detach());
        assert!(!notifier.detach());
        assert!(!notifier.is_attached());
    }

    #[tokio::test(start_paused = true)]
    async fn test_version_receiver_sees_bump() {
        let store = MessageStore::new();
        let notifier = ThrottledNotifier::new(store.clone(), ms(16));
        notifier.attach();

        let mut rx = notifier.subscribe_versions();
        assert_eq!(*rx.borrow_and_update(), 1);

        {
            let mut changed = tokio_test::task::spawn(rx.changed());
            assert_pending!(changed.poll());

            store.start_message(MessageKind::Assistant);
            assert_pending!(changed.poll());
        }

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_bump_after_detach() {
        let store = MessageStore::new();
        let notifier = ThrottledNotifier::new(store.clone(), ms(16));
        notifier.attach();
        notifier.detach();

        let mut rx = notifier.subscribe_versions();
        rx.borrow_and_update();

        let id = store.start_message(MessageKind::Assistant);
        store.append_content(id, "ignored").unwrap();
        sleep(ms(100)).await;

        let mut changed = tokio_test::task::spawn(rx.changed());
        assert_pending!(changed.poll());
        assert_eq!(notifier.stats().raw_notifications, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_from_inside_store_callback() {
        let store = MessageStore::new();
        let notifier = Arc::new(ThrottledNotifier::new(store.clone(), ms(16)));

        // Registered before the notifier, so it runs first in each dispatch
        let detacher = {
            let notifier = Arc::clone(&notifier);
            store.on_update(move || {
                notifier.detach();
            })
        };
        notifier.attach();
        assert_eq!(notifier.version(), 1);

        let id = store.start_message(MessageKind::Assistant);
        store.append_content(id, "dropped").unwrap();
        sleep(ms(50)).await;

        assert_eq!(notifier.version(), 1);
        assert_eq!(notifier.stats().raw_notifications, 0);
        assert!(!notifier.is_attached());
        assert!(!notifier.is_armed());
        assert_eq!(store.subscriber_count(), 1);
        drop(detacher);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reattach_bumps_again() {
        let store = MessageStore::new();
        let notifier = ThrottledNotifier::new(store.clone(), ms(16));
        notifier.attach();
        notifier.detach();
        notifier.attach();

        assert_eq!(notifier.version(), 2);
        store.start_message(MessageKind::User);
        sleep(ms(20)).await;
        assert_eq!(notifier.version(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_subscription() {
        let store = MessageStore::new();
        {
            let notifier = ThrottledNotifier::new(store.clone(), ms(16));
            notifier.attach();
            store.start_message(MessageKind::User);
            assert_eq!(store.subscriber_count(), 1);
        }
        assert_eq!(store.subscriber_count(), 0);
        sleep(ms(20)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_stream_yields_current_then_changes() {
        use tokio_stream::StreamExt;

        let store = MessageStore::new();
        let notifier = ThrottledNotifier::new(store.clone(), ms(16));
        notifier.attach();

        let mut updates = notifier.updates();
        assert_eq!(updates.next().await, Some(1));

        store.start_message(MessageKind::Assistant);
        assert_eq!(updates.next().await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spurious_flush_is_counted_not_bumped() {
        let store = MessageStore::new();
        let notifier = ThrottledNotifier::new(store.clone(), ms(16));
        notifier.attach();
        store.start_message(MessageKind::Assistant);

        // Clear the pending flag behind the timer's back
        notifier.shared.state.lock().pending = false;
        sleep(ms(20)).await;

        assert_eq!(notifier.version(), 1);
        assert_eq!(notifier.stats().spurious_fires, 1);
        assert!(!notifier.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_version_ready_after_window() {
        let store = MessageStore::new();
        let notifier = ThrottledNotifier::new(store.clone(), ms(16));
        notifier.attach();
        let mut rx = notifier.subscribe_versions();
        rx.borrow_and_update();

        store.start_message(MessageKind::System);
        sleep(ms(17)).await;

        let mut changed = tokio_test::task::spawn(rx.changed());
        assert_ready!(changed.poll()).unwrap();
    }
}
