//! Error types for lumen-stream

use thiserror::Error;

/// Result type alias using lumen-stream Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the transport layer
#[derive(Error, Debug)]
pub enum Error {
    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),
}
