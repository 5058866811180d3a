//! Turn lifecycle notifications for the render layer

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::conversation::{Message, MessageId};

/// Events emitted while a turn runs.
///
/// These are value snapshots: receivers must treat them as immutable copies,
/// never mutate them in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A turn started; `assistant_id` is the pre-assigned message id that
    /// the finalized assistant message will carry
    TurnStart {
        user: Message,
        assistant_id: MessageId,
    },

    /// The streaming block sequence changed
    StreamUpdate {
        assistant_id: MessageId,
        blocks: Vec<Block>,
    },

    /// The turn committed; `message` is the finalized assistant message
    TurnEnd { message: Message },
}
