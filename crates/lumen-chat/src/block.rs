//! Blocks: the renderable units of an assistant turn

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use lumen_stream::TablePayload;
use serde::{Deserialize, Serialize};

static NEXT_BLOCK_ID: AtomicU64 = AtomicU64::new(1);

/// Unique, monotonically assigned block identity.
///
/// Render layers key on this, so it must not change when a block closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(u64);

impl BlockId {
    /// Allocate the next id from the process-wide counter
    pub fn next() -> Self {
        Self(NEXT_BLOCK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// One unit of renderable content within an assistant turn.
///
/// Reasoning, Answer, and ToolCall blocks start open and close exactly once;
/// Chart, Table, Warning, and Error blocks are born closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    /// Model reasoning narrative, streamed in chunks
    Reasoning { id: BlockId, text: String, open: bool },

    /// Final answer text, streamed in chunks
    Answer { id: BlockId, text: String, open: bool },

    /// A tool invocation; `result` is filled when the tool finishes
    ToolCall {
        id: BlockId,
        name: String,
        arguments: serde_json::Value,
        result: Option<String>,
        open: bool,
    },

    /// A chart spec, rendered by the chart widget downstream
    Chart { id: BlockId, payload: serde_json::Value },

    /// A tabular result
    Table { id: BlockId, payload: TablePayload },

    /// A non-fatal notice
    Warning { id: BlockId, message: String },

    /// A turn-terminating failure
    Error { id: BlockId, message: String },
}

impl Block {
    /// Open a new reasoning block seeded with `text`
    pub fn reasoning(text: impl Into<String>) -> Self {
        Block::Reasoning {
            id: BlockId::next(),
            text: text.into(),
            open: true,
        }
    }

    /// Open a new answer block seeded with `text`
    pub fn answer(text: impl Into<String>) -> Self {
        Block::Answer {
            id: BlockId::next(),
            text: text.into(),
            open: true,
        }
    }

    /// Open a new tool call block with no result yet
    pub fn tool_call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Block::ToolCall {
            id: BlockId::next(),
            name: name.into(),
            arguments,
            result: None,
            open: true,
        }
    }

    /// Append a closed chart block
    pub fn chart(payload: serde_json::Value) -> Self {
        Block::Chart {
            id: BlockId::next(),
            payload,
        }
    }

    /// Append a closed table block
    pub fn table(payload: TablePayload) -> Self {
        Block::Table {
            id: BlockId::next(),
            payload,
        }
    }

    /// Append a closed warning block
    pub fn warning(message: impl Into<String>) -> Self {
        Block::Warning {
            id: BlockId::next(),
            message: message.into(),
        }
    }

    /// Append a closed error block
    pub fn error(message: impl Into<String>) -> Self {
        Block::Error {
            id: BlockId::next(),
            message: message.into(),
        }
    }

    pub fn id(&self) -> BlockId {
        match self {
            Block::Reasoning { id, .. }
            | Block::Answer { id, .. }
            | Block::ToolCall { id, .. }
            | Block::Chart { id, .. }
            | Block::Table { id, .. }
            | Block::Warning { id, .. }
            | Block::Error { id, .. } => *id,
        }
    }

    /// Whether the block is still receiving updates
    pub fn is_open(&self) -> bool {
        match self {
            Block::Reasoning { open, .. }
            | Block::Answer { open, .. }
            | Block::ToolCall { open, .. } => *open,
            _ => false,
        }
    }

    /// Close the block. No-op for born-closed kinds.
    pub fn close(&mut self) {
        match self {
            Block::Reasoning { open, .. }
            | Block::Answer { open, .. }
            | Block::ToolCall { open, .. } => *open = false,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_ids_are_unique_and_increasing() {
        let a = Block::reasoning("x");
        let b = Block::answer("y");
        let c = Block::warning("z");
        assert!(a.id() < b.id());
        assert!(b.id() < c.id());
    }

    #[test]
    fn test_streamable_blocks_start_open() {
        assert!(Block::reasoning("").is_open());
        assert!(Block::answer("").is_open());
        assert!(Block::tool_call("q", serde_json::Value::Null).is_open());
    }

    #[test]
    fn test_display_blocks_are_born_closed() {
        assert!(!Block::chart(serde_json::json!({})).is_open());
        assert!(
            !Block::table(TablePayload {
                columns: vec![],
                data: vec![]
            })
            .is_open()
        );
        assert!(!Block::warning("w").is_open());
        assert!(!Block::error("e").is_open());
    }

    #[test]
    fn test_close_preserves_identity() {
        let mut block = Block::answer("partial");
        let id = block.id();
        block.close();
        assert!(!block.is_open());
        assert_eq!(block.id(), id);
    }
}
