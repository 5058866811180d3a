//! SSE transport channel, one per conversation

use std::pin::Pin;

use async_stream::stream;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    events::StreamEvent,
};

/// A signal delivered to the channel's registered handler
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    /// A decoded wire event
    Event(StreamEvent),
    /// The connection failed without a terminal frame
    Dropped { reason: String },
}

/// A stream of channel signals
pub type SignalStream = Pin<Box<dyn Stream<Item = ChannelSignal> + Send>>;

/// Server-push connection for one conversation.
///
/// `connect` is idempotent; `disconnect` tears the pump down unconditionally,
/// and no signals are delivered to a handler whose receiver has been dropped.
pub struct Channel {
    client: reqwest::Client,
    base_url: String,
    live: Option<Live>,
}

struct Live {
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl Channel {
    /// Create a channel against the given backend base URL
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            live: None,
        }
    }

    /// Whether a live connection exists
    pub fn is_connected(&self) -> bool {
        self.live.as_ref().is_some_and(|l| !l.task.is_finished())
    }

    /// Open the push connection for `conversation`, forwarding signals to `tx`.
    ///
    /// A no-op when a connection is already open.
    pub fn connect(
        &mut self,
        conversation: &str,
        tx: mpsc::UnboundedSender<ChannelSignal>,
    ) -> Result<()> {
        if self.is_connected() {
            tracing::debug!("channel already open for {}", conversation);
            return Ok(());
        }

        let url = format!("{}/stream/{}", self.base_url, conversation);
        tracing::debug!("opening event source: {}", url);

        let source = EventSource::new(self.client.get(&url))
            .map_err(|e| Error::Sse(format!("failed to open event source: {}", e)))?;

        let cancel = CancellationToken::new();
        let mut signals = signal_stream(source);
        let pump_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = pump_cancel.cancelled() => return,
                    next = signals.next() => match next {
                        Some(signal) => {
                            // Handler gone means the turn is already over.
                            if tx.send(signal).is_err() {
                                return;
                            }
                        }
                        None => return,
                    },
                }
            }
        });

        self.live = Some(Live { cancel, task });
        Ok(())
    }

    /// Tear the connection down. Safe to call when not connected.
    pub fn disconnect(&mut self) {
        if let Some(live) = self.live.take() {
            live.cancel.cancel();
            live.task.abort();
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Decode SSE events into channel signals.
///
/// Ends after forwarding a terminal frame: client-initiated close is
/// authoritative even if the server keeps the connection open. Frames that
/// fail to decode are logged and dropped.
fn signal_stream(mut source: EventSource) -> SignalStream {
    Box::pin(stream! {
        while let Some(item) = source.next().await {
            match item {
                Ok(Event::Open) => {}
                Ok(Event::Message(message)) => match message.event.as_str() {
                    // Keepalive, carries no payload.
                    "heartbeat" => {}
                    "error" => {
                        source.close();
                        yield ChannelSignal::Dropped { reason: message.data };
                        return;
                    }
                    _ => match serde_json::from_str::<StreamEvent>(&message.data) {
                        Ok(event) => {
                            let terminal = event.is_terminal();
                            yield ChannelSignal::Event(event);
                            if terminal {
                                source.close();
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::warn!("dropping undecodable frame: {}", e);
                        }
                    },
                },
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    // Server closed without a terminal frame.
                    yield ChannelSignal::Dropped {
                        reason: "connection closed by server".to_string(),
                    };
                    return;
                }
                Err(e) => {
                    source.close();
                    yield ChannelSignal::Dropped { reason: e.to_string() };
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_starts_disconnected() {
        let channel = Channel::new(reqwest::Client::new(), "http://localhost:8000");
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_when_not_connected_is_noop() {
        let mut channel = Channel::new(reqwest::Client::new(), "http://localhost:8000");
        channel.disconnect();
        channel.disconnect();
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn test_connect_then_disconnect() {
        let mut channel = Channel::new(reqwest::Client::new(), "http://localhost:1");
        let (tx, _rx) = mpsc::unbounded_channel();
        channel.connect("alice@example.com", tx).unwrap();
        channel.disconnect();
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let mut channel = Channel::new(reqwest::Client::new(), "http://localhost:1");
        let (tx, _rx) = mpsc::unbounded_channel();
        channel.connect("alice@example.com", tx.clone()).unwrap();
        // Second connect must not replace the live connection.
        channel.connect("alice@example.com", tx).unwrap();
        assert!(channel.is_connected());
        channel.disconnect();
    }
}
