//! Message Store
//!
//! The append-only buffer that a streaming producer writes into and a
//! rendering surface reads from.
//!
//! # Architecture
//!
//! ```text
//!   producer                     MessageStore                      consumers
//!  ┌──────────┐  start/append   ┌───────────────────────────┐
//!  │ streaming│ ──────────────▶ │ Arc<Vec<Arc<Message>>>    │ ── snapshot() ──▶ renderer
//!  │ response │                 │   (copy-on-write)         │
//!  └──────────┘                 ├───────────────────────────┤
//!                               │ subscriber slots          │ ── raw ping ────▶ notifier
//!                               └───────────────────────────┘
//! ```
//!
//! Every successful mutation fires one raw, unthrottled notification to every
//! subscriber. Rate limiting is left to the next layer
//! ([`ThrottledNotifier`](crate::streaming::ThrottledNotifier)).
//!
//! # Thread Safety
//!
//! Message state lives behind a `RwLock`; snapshots are `Arc` clones, so
//! readers never block the producer for longer than a pointer copy. No store
//! lock is held while callbacks run, which lets a callback read a snapshot or
//! even mutate the store again.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use thiserror::Error;

use crate::messages::{Message, MessageId, MessageKind};

/// Callback invoked on every store mutation
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

/// Errors returned by store mutations
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The id does not belong to a message currently in this store
    #[error("message {id} not found in store")]
    NotFound {
        /// The id that was looked up
        id: MessageId,
    },
}

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable, order-preserving view of the store at one point in time
///
/// Later mutations to the store never show up in an existing snapshot.
#[derive(Clone, Default)]
pub struct Snapshot {
    messages: Arc<Vec<Arc<Message>>>,
}

impl Snapshot {
    /// Iterate over the messages in display order
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().map(|message| &**message)
    }

    /// Copy the messages out (e.g. for serialization)
    #[must_use]
    pub fn to_vec(&self) -> Vec<Message> {
        self.iter().cloned().collect()
    }

    /// Whether two snapshots share the same underlying data
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.messages, &other.messages)
    }
}

impl Deref for Snapshot {
    type Target = [Arc<Message>];

    fn deref(&self) -> &Self::Target {
        &self.messages
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

/// One registered callback
///
/// The reentrant lock is held for the duration of a dispatch. A cancel from
/// another thread therefore waits for an in-flight callback to return, while a
/// cancel from inside the callback itself re-enters the lock.
struct SubscriberSlot {
    callback: ReentrantMutex<RefCell<Option<UpdateCallback>>>,
}

impl SubscriberSlot {
    fn new(callback: UpdateCallback) -> Self {
        Self {
            callback: ReentrantMutex::new(RefCell::new(Some(callback))),
        }
    }

    fn fire(&self) {
        let guard = self.callback.lock();
        // Release the borrow before calling so the callback may cancel itself
        let callback = guard.borrow().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn cancel(&self) -> bool {
        let guard = self.callback.lock();
        let cancelled = guard.borrow_mut().take().is_some();
        cancelled
    }

    fn is_active(&self) -> bool {
        self.callback.lock().borrow().is_some()
    }
}

/// Registration handle returned by [`MessageStore::on_update`]
///
/// Dropping the handle unsubscribes.
///
/// # Blocking
///
/// If the callback is running on another thread, [`unsubscribe`](Self::unsubscribe)
/// blocks until it returns. Two callbacks dispatched concurrently from
/// different producer threads must therefore not cancel each other's
/// subscriptions: each would wait for the other and neither returns.
/// Cancelling from the same dispatch (a callback cancelling itself or a later
/// subscriber) never blocks.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    slot: Arc<SubscriberSlot>,
    store: Weak<StoreInner>,
}

impl Subscription {
    /// Stop receiving notifications
    ///
    /// Returns `true` if this call did the cancelling, `false` if the
    /// subscription was already cancelled. Once this returns, the callback is
    /// never invoked again.
    pub fn unsubscribe(&self) -> bool {
        let cancelled = self.slot.cancel();
        if let Some(store) = self.store.upgrade() {
            store.subscribers.lock().remove(&self.id);
        }
        if cancelled {
            tracing::debug!(subscription = self.id, "Store subscription cancelled");
        }
        cancelled
    }

    /// Whether the callback is still registered
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.slot.is_active()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

// ============================================================================
// Message Store
// ============================================================================

#[derive(Default)]
struct StoreState {
    messages: Arc<Vec<Arc<Message>>>,
    index: HashMap<MessageId, usize>,
    next_seq: u64,
}

#[derive(Default)]
struct StoreInner {
    state: RwLock<StoreState>,
    subscribers: Mutex<BTreeMap<u64, Arc<SubscriberSlot>>>,
    next_subscriber: AtomicU64,
}

/// Ordered, append-only message buffer with raw change notifications
///
/// Cloning a `MessageStore` yields another handle to the same store.
///
/// The store is built for a single producer. Handles may be shared across
/// threads, but mutating from several threads at once makes callbacks run
/// concurrently, and callbacks must then not cancel each other's
/// subscriptions (see [`Subscription`]).
#[derive(Clone, Default)]
pub struct MessageStore {
    inner: Arc<StoreInner>,
}

impl MessageStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new, empty message at the end of the sequence
    pub fn start_message(&self, kind: MessageKind) -> MessageId {
        let id = {
            let mut state = self.inner.state.write();
            let seq = state.next_seq;
            state.next_seq += 1;

            let message = Message::streaming(kind, seq);
            let id = message.id;
            let position = state.messages.len();
            Arc::make_mut(&mut state.messages).push(Arc::new(message));
            state.index.insert(id, position);
            id
        };

        tracing::trace!(message_id = %id, "Message started");
        self.notify();
        id
    }

    /// Append a chunk to an existing message
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if `id` is not in the store. No
    /// notification fires in that case.
    pub fn append_content(&self, id: MessageId, chunk: &str) -> Result<(), StoreError> {
        self.mutate(id, |message| message.append(chunk))
    }

    /// Mark a message as no longer streaming
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if `id` is not in the store.
    pub fn finish_message(&self, id: MessageId) -> Result<(), StoreError> {
        self.mutate(id, Message::complete)
    }

    /// Remove every message
    ///
    /// Sequence numbers keep counting from where they were, and ids issued
    /// before the clear are no longer recognised.
    pub fn clear(&self) {
        {
            let mut state = self.inner.state.write();
            state.messages = Arc::new(Vec::new());
            state.index.clear();
        }

        tracing::debug!("Message store cleared");
        self.notify();
    }

    /// Take an immutable copy of the current messages
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            messages: Arc::clone(&self.inner.state.read().messages),
        }
    }

    /// Look up a single message
    #[must_use]
    pub fn get(&self, id: MessageId) -> Option<Arc<Message>> {
        let state = self.inner.state.read();
        state
            .index
            .get(&id)
            .map(|&position| Arc::clone(&state.messages[position]))
    }

    /// Number of messages in the store
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.read().messages.len()
    }

    /// Whether the store holds no messages
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a callback fired after every successful mutation
    pub fn on_update<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(SubscriberSlot::new(Arc::new(callback)));
        self.inner.subscribers.lock().insert(id, Arc::clone(&slot));

        tracing::debug!(subscription = id, "Store subscription registered");

        Subscription {
            id,
            slot,
            store: Arc::downgrade(&self.inner),
        }
    }

    /// Number of live subscriptions
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    fn mutate<F>(&self, id: MessageId, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Message),
    {
        {
            let mut state = self.inner.state.write();
            let Some(&position) = state.index.get(&id) else {
                tracing::warn!(message_id = %id, "Rejected mutation of unknown message");
                return Err(StoreError::NotFound { id });
            };
            let messages = Arc::make_mut(&mut state.messages);
            apply(Arc::make_mut(&mut messages[position]));
        }

        self.notify();
        Ok(())
    }

    /// Fire every registered callback, in registration order
    fn notify(&self) {
        let slots: Vec<Arc<SubscriberSlot>> =
            self.inner.subscribers.lock().values().cloned().collect();

        tracing::trace!(subscribers = slots.len(), "Dispatching store update");

        for slot in slots {
            slot.fire();
        }
    }
}

impl fmt::Debug for MessageStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageStore")
            .field("messages", &self.len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
