//! Conversation state: committed messages plus the in-flight streaming turn

use std::fmt;

use lumen_stream::StreamEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accumulator::{BlockAccumulator, Step};
use crate::block::Block;

/// Message identity, assigned at turn start and stable through commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A committed conversation message, immutable once appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        id: MessageId,
        text: String,
        timestamp: i64,
    },
    Assistant {
        id: MessageId,
        blocks: Vec<Block>,
        timestamp: i64,
    },
}

impl Message {
    pub fn id(&self) -> MessageId {
        match self {
            Message::User { id, .. } | Message::Assistant { id, .. } => *id,
        }
    }

    /// Blocks of an assistant message; empty for user messages
    pub fn blocks(&self) -> &[Block] {
        match self {
            Message::Assistant { blocks, .. } => blocks,
            Message::User { .. } => &[],
        }
    }
}

/// Owns the finalized message history and the currently streaming block
/// sequence.
///
/// Every mutation is visible to readers as soon as the call returns; the
/// render layer polls `streaming_blocks` between events to keep the open
/// block highlighted.
#[derive(Debug, Default)]
pub struct ConversationStore {
    messages: Vec<Message>,
    streaming: Vec<Block>,
    accumulator: BlockAccumulator,
    pending_assistant: Option<MessageId>,
    is_loading: bool,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finalized messages, oldest first
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Blocks of the turn currently streaming
    pub fn streaming_blocks(&self) -> &[Block] {
        &self.streaming
    }

    /// Whether a turn is in flight
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// The pre-assigned id of the in-flight assistant message
    pub fn pending_assistant(&self) -> Option<MessageId> {
        self.pending_assistant
    }

    /// Append a user message and return its id
    pub fn append_user_message(&mut self, text: impl Into<String>) -> MessageId {
        let id = MessageId::new();
        self.messages.push(Message::User {
            id,
            text: text.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        });
        id
    }

    /// Pre-assign the assistant message id and mark the conversation loading.
    ///
    /// The same id is used by the streaming view and the finalized message,
    /// so render layers keep component identity across commit. Returns the
    /// existing id if a turn is already in flight.
    pub fn begin_assistant_turn(&mut self) -> MessageId {
        if let Some(id) = self.pending_assistant {
            return id;
        }
        let id = MessageId::new();
        self.pending_assistant = Some(id);
        self.is_loading = true;
        id
    }

    /// Fold one event into the streaming sequence
    pub fn apply_event(&mut self, event: StreamEvent) -> Step {
        if self.pending_assistant.is_none() {
            // Straggler after teardown; the turn it belonged to is gone.
            tracing::warn!("dropping event with no turn in flight: {:?}", event);
            return Step::Continue;
        }
        self.accumulator.apply(&mut self.streaming, event)
    }

    /// Move the streaming blocks into a finalized assistant message under the
    /// pre-assigned id, force-closing any still-open block first.
    ///
    /// Idempotent: returns `None` when no turn is pending.
    pub fn commit_turn(&mut self) -> Option<MessageId> {
        let id = self.pending_assistant.take()?;
        self.accumulator.force_close(&mut self.streaming);
        let blocks = std::mem::take(&mut self.streaming);
        self.messages.push(Message::Assistant {
            id,
            blocks,
            timestamp: chrono::Utc::now().timestamp_millis(),
        });
        self.is_loading = false;
        Some(id)
    }

    /// Drop all conversation state
    pub fn reset(&mut self) {
        self.messages.clear();
        self.streaming.clear();
        self.accumulator = BlockAccumulator::new();
        self.pending_assistant = None;
        self.is_loading = false;
    }
}
