//! Error types for lumen-chat

use thiserror::Error;

/// Result type alias using lumen-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while orchestrating a turn
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the transport layer
    #[error("transport error: {0}")]
    Stream(#[from] lumen_stream::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend refused to start the turn
    #[error("turn rejected: {0}")]
    Rejected(String),
}
