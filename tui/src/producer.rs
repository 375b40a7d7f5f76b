//! Demo Producer
//!
//! Stands in for a model backend: writes canned exchanges into a
//! [`MessageStore`] one chunk at a time, pausing a jittered interval between
//! chunks so the throttled notifier has realistic bursts to coalesce.

use std::time::Duration;

use rand::Rng;
use streambuf_core::{MessageId, MessageKind, MessageStore, ProducerConfig, StoreError};

/// One scripted turn of the demo conversation
#[derive(Clone, Copy, Debug)]
pub struct Exchange {
    /// What the user "typed"
    pub prompt: &'static str,
    /// Optional tool event as `(tool name, output)`
    pub tool: Option<(&'static str, &'static str)>,
    /// The streamed assistant reply
    pub reply: &'static str,
}

/// The conversation the demo plays back
pub const DEMO_SCRIPT: &[Exchange] = &[
    Exchange {
        prompt: "What does this demo show?",
        tool: None,
        reply: "Every word of this reply is appended to the message store as its own \
                chunk. The store pings on every append, but the screen only redraws \
                once per frame window, so a fast stream costs a handful of redraws \
                instead of hundreds.",
    },
    Exchange {
        prompt: "How many redraws did that take?",
        tool: Some(("stats", "see the status bar: version vs raw pings")),
        reply: "Look at the status bar. The version counts redraw signals and the raw \
                counter counts store mutations. While a reply streams, the raw counter \
                runs far ahead of the version.",
    },
    Exchange {
        prompt: "What happens when I clear?",
        tool: None,
        reply: "Clearing empties the store in one mutation. Any reply still streaming \
                is cancelled, and its message id stops being valid, so a late append \
                would be rejected instead of resurrecting old content.",
    },
];

/// Splits text into chunks of `words` whitespace-terminated words.
///
/// Concatenating the chunks gives back the original text.
#[must_use]
pub fn chunk_text(text: &str, words: usize) -> Vec<String> {
    let words = words.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for word in text.split_inclusive(char::is_whitespace) {
        current.push_str(word);
        if !word.trim().is_empty() {
            count += 1;
        }
        if count == words && word.ends_with(char::is_whitespace) {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Writes scripted messages into a store at a human-ish pace
#[derive(Clone, Debug)]
pub struct DemoProducer {
    store: MessageStore,
    config: ProducerConfig,
}

impl DemoProducer {
    /// Create a producer writing into `store`
    #[must_use]
    pub fn new(store: MessageStore, config: ProducerConfig) -> Self {
        Self { store, config }
    }

    /// Pause before the next chunk, uniformly within the configured range
    fn next_delay(&self) -> Duration {
        let (min, max) = (self.config.min_delay, self.config.max_delay);
        if min >= max {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }

    /// Add a complete message in one go
    pub fn post(&self, kind: MessageKind, text: &str) -> Result<MessageId, StoreError> {
        let id = self.store.start_message(kind);
        self.store.append_content(id, text)?;
        self.store.finish_message(id)?;
        Ok(id)
    }

    /// Stream `text` into a new message chunk by chunk
    ///
    /// Fails with [`StoreError::NotFound`] if the store is cleared mid-stream.
    pub async fn stream(&self, kind: MessageKind, text: &str) -> Result<MessageId, StoreError> {
        let chunks = chunk_text(text, self.config.chunk_words);
        let id = self.store.start_message(kind);
        tracing::debug!(message_id = %id, chunks = chunks.len(), "Streaming reply");

        for chunk in &chunks {
            tokio::time::sleep(self.next_delay()).await;
            self.store.append_content(id, chunk)?;
        }

        self.store.finish_message(id)?;
        tracing::debug!(message_id = %id, "Reply complete");
        Ok(id)
    }

    /// Play one exchange, returning the id of the streamed reply
    pub async fn play(&self, exchange: &Exchange) -> Result<MessageId, StoreError> {
        self.post(MessageKind::User, exchange.prompt)?;
        if let Some((name, output)) = exchange.tool {
            self.post(
                MessageKind::Tool {
                    name: name.to_string(),
                },
                output,
            )?;
        }
        self.stream(MessageKind::Assistant, exchange.reply).await
    }

    /// Play a whole script in order
    pub async fn play_script(&self, script: &[Exchange]) -> Result<Vec<MessageId>, StoreError> {
        let mut replies = Vec::with_capacity(script.len());
        for exchange in script {
            replies.push(self.play(exchange).await?);
        }
        Ok(replies)
    }
}
