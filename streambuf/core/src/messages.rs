//! Streamed Messages
//!
//! The unit of content held by a [`MessageStore`](crate::store::MessageStore).
//! A message is created empty by the producer, grows chunk by chunk while a
//! response streams in, and is finally marked complete.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message identifier
///
/// Unique within a store instance. Ids are never reused, so an id handed out
/// before a `clear()` is simply unknown afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a new unique message ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg_{}", self.0.simple())
    }
}

/// Who (or what) produced a message
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageKind {
    /// User input
    User,
    /// AI assistant output
    Assistant,
    /// System message
    System,
    /// Output of a tool invocation
    Tool {
        /// Name of the tool that ran
        name: String,
    },
}

impl MessageKind {
    /// Short label for rendering surfaces
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::User => "you",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool { name } => name,
        }
    }
}

/// A message in the store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// Role of the message
    pub kind: MessageKind,
    /// Accumulated content
    pub content: String,
    /// Position in creation order (strictly increasing, never reassigned)
    pub seq: u64,
    /// When the message was started
    pub created_at: DateTime<Utc>,
    /// Whether the producer is still appending to this message
    pub streaming: bool,
}

impl Message {
    /// Create a new, empty streaming message
    pub(crate) fn streaming(kind: MessageKind, seq: u64) -> Self {
        Self {
            id: MessageId::new(),
            kind,
            content: String::new(),
            seq,
            created_at: Utc::now(),
            streaming: true,
        }
    }

    /// Append a chunk to the content
    pub(crate) fn append(&mut self, chunk: &str) {
        self.content.push_str(chunk);
    }

    /// Mark streaming as complete
    pub(crate) fn complete(&mut self) {
        self.streaming = false;
    }
}
