//! lumen-stream: wire events and transport channel
//!
//! This crate decodes the agent backend's server-push frames into typed
//! events and owns the lifecycle of the per-conversation SSE connection.

pub mod channel;
pub mod error;
pub mod events;

pub use channel::{Channel, ChannelSignal, SignalStream};
pub use error::{Error, Result};
pub use events::{StreamEvent, TablePayload};
