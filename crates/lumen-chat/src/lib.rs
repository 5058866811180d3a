//! lumen-chat: stream-to-document assembly for agent conversations
//!
//! This crate folds the backend's typed wire events, one at a time, into a
//! stable append-only document of blocks, and orchestrates the turn
//! lifecycle around it: at most one block is open at any moment, chunks of
//! the same kind coalesce, and every exit path (done, error, cancellation,
//! transport drop) commits the turn with no block left dangling open.

pub mod accumulator;
pub mod block;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod handle;
pub mod producer;

pub use accumulator::{BlockAccumulator, Step};
pub use block::{Block, BlockId};
pub use conversation::{ConversationStore, Message, MessageId};
pub use dispatcher::{DispatcherConfig, TurnDispatcher, TurnPhase};
pub use error::Error;
pub use events::TurnEvent;
pub use handle::TurnHandle;
pub use producer::{HttpProducer, Producer};
