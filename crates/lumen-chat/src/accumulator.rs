//! Folds stream events into an ordered block sequence

use lumen_stream::StreamEvent;

use crate::block::{Block, BlockId};

/// Outcome of folding one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep streaming
    Continue,
    /// Terminal event seen; the caller must commit the turn
    Commit,
}

#[derive(Debug, Clone, Copy)]
enum TextKind {
    Reasoning,
    Answer,
}

/// Folds one event at a time into the current block sequence.
///
/// Holds exactly one piece of state besides the sequence itself: the identity
/// of the currently open block. At most one block is open at any time; any
/// event that opens a new block implicitly closes the previous one. Blocks
/// are appended in arrival order and never reordered.
#[derive(Debug, Default)]
pub struct BlockAccumulator {
    active: Option<BlockId>,
}

impl BlockAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity of the currently open block, if any
    pub fn active_block(&self) -> Option<BlockId> {
        self.active
    }

    /// Fold one event into `blocks`
    pub fn apply(&mut self, blocks: &mut Vec<Block>, event: StreamEvent) -> Step {
        match event {
            // Retry narration folds into the reasoning stream (wire
            // compatibility; see DESIGN.md).
            StreamEvent::Thinking { content } | StreamEvent::Retrying { content } => {
                self.append_chunk(blocks, content, TextKind::Reasoning);
                Step::Continue
            }
            StreamEvent::Text { content } => {
                self.append_chunk(blocks, content, TextKind::Answer);
                Step::Continue
            }
            StreamEvent::ToolCallStart { name, args } => {
                self.close_active(blocks);
                self.open(blocks, Block::tool_call(name, args));
                Step::Continue
            }
            StreamEvent::ToolCallResult { result } => {
                let idx = self.active_index(blocks);
                match idx.map(|i| &mut blocks[i]) {
                    Some(Block::ToolCall {
                        result: slot, open, ..
                    }) => {
                        *slot = Some(result);
                        *open = false;
                        self.active = None;
                    }
                    // Never attach a result to an unrelated block.
                    _ => {
                        tracing::warn!("dropping tool result with no open tool call");
                    }
                }
                Step::Continue
            }
            StreamEvent::Plotly { json } => {
                self.close_active(blocks);
                blocks.push(Block::chart(json));
                Step::Continue
            }
            StreamEvent::DataTable { json } => {
                self.close_active(blocks);
                blocks.push(Block::table(json));
                Step::Continue
            }
            // Warnings land closed and leave the active block streaming.
            StreamEvent::Warning { message } => {
                blocks.push(Block::warning(message));
                Step::Continue
            }
            StreamEvent::Done {} => {
                self.close_active(blocks);
                Step::Commit
            }
            StreamEvent::Error { message } => {
                self.close_active(blocks);
                blocks.push(Block::error(message));
                Step::Commit
            }
        }
    }

    /// Close the open block if any. Commit paths call this so that no block
    /// is ever finalized while still marked open.
    pub fn force_close(&mut self, blocks: &mut [Block]) {
        self.close_active(blocks);
    }

    fn append_chunk(&mut self, blocks: &mut Vec<Block>, chunk: String, kind: TextKind) {
        if let Some(i) = self.active_index(blocks) {
            match (kind, &mut blocks[i]) {
                (TextKind::Reasoning, Block::Reasoning { text, .. })
                | (TextKind::Answer, Block::Answer { text, .. }) => {
                    text.push_str(&chunk);
                    return;
                }
                _ => {}
            }
        }
        self.close_active(blocks);
        let block = match kind {
            TextKind::Reasoning => Block::reasoning(chunk),
            TextKind::Answer => Block::answer(chunk),
        };
        self.open(blocks, block);
    }

    fn open(&mut self, blocks: &mut Vec<Block>, block: Block) {
        self.active = Some(block.id());
        blocks.push(block);
    }

    fn close_active(&mut self, blocks: &mut [Block]) {
        if let Some(id) = self.active.take() {
            if let Some(block) = blocks.iter_mut().rev().find(|b| b.id() == id) {
                block.close();
            }
        }
    }

    fn active_index(&self, blocks: &[Block]) -> Option<usize> {
        let id = self.active?;
        blocks.iter().rposition(|b| b.id() == id)
    }
}
