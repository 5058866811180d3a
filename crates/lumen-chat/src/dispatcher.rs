//! Turn orchestration: request, stream, commit

use std::sync::Arc;

use lumen_stream::{Channel, ChannelSignal, StreamEvent};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::accumulator::Step;
use crate::conversation::ConversationStore;
use crate::error::{Error, Result};
use crate::events::TurnEvent;
use crate::handle::TurnHandle;
use crate::producer::{HttpProducer, Producer};

/// Turn-level state.
///
/// `Committing` is the single exit door: every way a turn ends (done, error,
/// cancellation, transport drop) passes through it before returning to Idle,
/// which is what guarantees no block is ever left open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    AwaitingAccept,
    Streaming,
    Committing,
}

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Backend base URL
    pub base_url: String,
    /// Conversation identity; one push channel each
    pub conversation: String,
}

/// Orchestrates one user → assistant turn at a time.
///
/// Owns the conversation store and the transport channel; render layers
/// subscribe to [`TurnEvent`] snapshots and cancel through a [`TurnHandle`].
pub struct TurnDispatcher {
    config: DispatcherConfig,
    producer: Arc<dyn Producer>,
    channel: Channel,
    store: ConversationStore,
    phase: TurnPhase,
    event_tx: broadcast::Sender<TurnEvent>,
    handle: TurnHandle,
}

impl TurnDispatcher {
    /// Create a dispatcher talking HTTP to the given backend
    pub fn new(config: DispatcherConfig) -> Self {
        let client = reqwest::Client::new();
        let producer = Arc::new(HttpProducer::new(client.clone(), config.base_url.clone()));
        Self::with_producer(config, client, producer)
    }

    /// Create with a custom producer (tests use a mock)
    pub fn with_producer(
        config: DispatcherConfig,
        client: reqwest::Client,
        producer: Arc<dyn Producer>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let channel = Channel::new(client, config.base_url.clone());
        Self {
            config,
            producer,
            channel,
            store: ConversationStore::new(),
            phase: TurnPhase::Idle,
            event_tx,
            handle: TurnHandle::new(),
        }
    }

    /// Subscribe to turn lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<TurnEvent> {
        self.event_tx.subscribe()
    }

    /// The conversation state
    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Current turn phase
    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Get a cloneable handle for cancelling from another task
    pub fn handle(&self) -> TurnHandle {
        self.handle.clone()
    }

    /// Request cancellation of the running turn. Idempotent.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Run one user → assistant turn to completion.
    ///
    /// Returns once the turn has committed; failures along the way end up as
    /// an error block in the committed message, never as an `Err` here.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        // Fresh token per turn; a cancel left over from the previous turn
        // must not end this one.
        *self.handle.token.lock() = CancellationToken::new();

        self.store.append_user_message(text);
        let assistant_id = self.store.begin_assistant_turn();
        if let Some(user) = self.store.messages().last() {
            let _ = self.event_tx.send(TurnEvent::TurnStart {
                user: user.clone(),
                assistant_id,
            });
        }
        self.phase = TurnPhase::AwaitingAccept;

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Err(e) = self.channel.connect(&self.config.conversation, tx) {
            self.fail_turn(Error::Stream(e));
            return Ok(());
        }

        match self
            .producer
            .start_turn(&self.config.conversation, text)
            .await
        {
            Ok(()) => self.phase = TurnPhase::Streaming,
            Err(e) => {
                tracing::warn!("turn not accepted: {}", e);
                self.fail_turn(e);
                return Ok(());
            }
        }

        let cancel = self.handle.token.lock().clone();
        self.stream_loop(&mut rx, cancel).await;

        self.finish_turn();
        Ok(())
    }

    /// Fold channel signals until the turn ends or cancellation fires.
    async fn stream_loop(
        &mut self,
        rx: &mut mpsc::UnboundedReceiver<ChannelSignal>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    // Local cleanup never waits on the notice being delivered.
                    self.spawn_cancel_notice();
                    return;
                }
                signal = rx.recv() => {
                    let signal = signal.unwrap_or(ChannelSignal::Dropped {
                        reason: "channel closed".to_string(),
                    });
                    if self.pump(signal) == Step::Commit {
                        return;
                    }
                }
            }
        }
    }

    /// Fold one channel signal into the store, notifying subscribers.
    fn pump(&mut self, signal: ChannelSignal) -> Step {
        let step = match signal {
            ChannelSignal::Event(event) => self.store.apply_event(event),
            // No server-provided terminal frame exists; synthesize one.
            ChannelSignal::Dropped { reason } => self.store.apply_event(StreamEvent::Error {
                message: format!("connection lost: {}", reason),
            }),
        };
        if let Some(assistant_id) = self.store.pending_assistant() {
            let _ = self.event_tx.send(TurnEvent::StreamUpdate {
                assistant_id,
                blocks: self.store.streaming_blocks().to_vec(),
            });
        }
        step
    }

    /// End a turn that failed before any stream event arrived.
    fn fail_turn(&mut self, error: Error) {
        self.store.apply_event(StreamEvent::Error {
            message: error.to_string(),
        });
        self.finish_turn();
    }

    /// The single exit door: commit, notify, tear the channel down.
    fn finish_turn(&mut self) {
        self.phase = TurnPhase::Committing;
        if self.store.commit_turn().is_some() {
            if let Some(message) = self.store.messages().last() {
                let _ = self.event_tx.send(TurnEvent::TurnEnd {
                    message: message.clone(),
                });
            }
        }
        self.channel.disconnect();
        self.phase = TurnPhase::Idle;
    }

    fn spawn_cancel_notice(&self) {
        let producer = Arc::clone(&self.producer);
        let conversation = self.config.conversation.clone();
        tokio::spawn(async move {
            if let Err(e) = producer.cancel_turn(&conversation).await {
                tracing::debug!("cancel notice not delivered: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::error::Error;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// A mock producer that records calls and answers from a script.
    struct MockProducer {
        accept: bool,
        started: Mutex<Vec<String>>,
        cancelled: Mutex<Vec<String>>,
    }

    impl MockProducer {
        fn new(accept: bool) -> Self {
            Self {
                accept,
                started: Mutex::new(Vec::new()),
                cancelled: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Producer for MockProducer {
        async fn start_turn(&self, conversation: &str, _message: &str) -> crate::error::Result<()> {
            self.started.lock().push(conversation.to_string());
            if self.accept {
                Ok(())
            } else {
                Err(Error::Rejected("agent unavailable".to_string()))
            }
        }

        async fn cancel_turn(&self, conversation: &str) -> crate::error::Result<()> {
            self.cancelled.lock().push(conversation.to_string());
            Ok(())
        }
    }

    fn make_dispatcher(producer: Arc<MockProducer>) -> TurnDispatcher {
        TurnDispatcher::with_producer(
            DispatcherConfig {
                base_url: "http://127.0.0.1:1".to_string(),
                conversation: "alice@example.com".to_string(),
            },
            reqwest::Client::new(),
            producer,
        )
    }

    fn thinking(s: &str) -> ChannelSignal {
        ChannelSignal::Event(StreamEvent::Thinking { content: s.into() })
    }

    #[tokio::test]
    async fn test_pump_updates_store_and_broadcasts_snapshot() {
        let mut dispatcher = make_dispatcher(Arc::new(MockProducer::new(true)));
        let mut events = dispatcher.subscribe();

        dispatcher.store.begin_assistant_turn();
        let step = dispatcher.pump(thinking("hello"));
        assert_eq!(step, Step::Continue);
        assert_eq!(dispatcher.store.streaming_blocks().len(), 1);

        match events.try_recv().unwrap() {
            TurnEvent::StreamUpdate { blocks, .. } => {
                assert_eq!(blocks.len(), 1);
                assert!(blocks[0].is_open());
            }
            other => panic!("expected StreamUpdate, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_done_signal_commits_turn() {
        let mut dispatcher = make_dispatcher(Arc::new(MockProducer::new(true)));
        dispatcher.store.begin_assistant_turn();

        dispatcher.pump(thinking("a"));
        let step = dispatcher.pump(ChannelSignal::Event(StreamEvent::Done {}));
        assert_eq!(step, Step::Commit);

        dispatcher.finish_turn();
        assert_eq!(dispatcher.phase(), TurnPhase::Idle);
        assert_eq!(dispatcher.store.messages().len(), 1);
        assert!(!dispatcher.store.is_loading());
    }

    #[tokio::test]
    async fn test_transport_drop_synthesizes_error_block() {
        let mut dispatcher = make_dispatcher(Arc::new(MockProducer::new(true)));
        dispatcher.store.begin_assistant_turn();

        dispatcher.pump(thinking("partial"));
        let step = dispatcher.pump(ChannelSignal::Dropped {
            reason: "reset by peer".to_string(),
        });
        assert_eq!(step, Step::Commit);

        dispatcher.finish_turn();
        let blocks = dispatcher.store.messages().last().unwrap().blocks();
        assert_eq!(blocks.len(), 2);
        assert!(!blocks[0].is_open());
        match &blocks[1] {
            Block::Error { message, .. } => {
                assert!(message.contains("reset by peer"));
            }
            other => panic!("expected Error block, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_commits_partial_without_error() {
        let producer = Arc::new(MockProducer::new(true));
        let mut dispatcher = make_dispatcher(Arc::clone(&producer));
        dispatcher.store.begin_assistant_turn();
        dispatcher.pump(thinking("half a tho"));

        // Sender stays alive so only the cancel branch can fire.
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let cancel = dispatcher.handle.token.lock().clone();
        dispatcher.cancel();
        dispatcher.stream_loop(&mut rx, cancel).await;
        dispatcher.finish_turn();

        // The cancel notice runs on a detached task.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(producer.cancelled.lock().as_slice(), ["alice@example.com"]);

        assert_eq!(dispatcher.phase(), TurnPhase::Idle);
        assert!(!dispatcher.store.is_loading());
        let blocks = dispatcher.store.messages().last().unwrap().blocks();
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            Block::Reasoning { text, open, .. } => {
                assert_eq!(text, "half a tho");
                assert!(!open);
            }
            other => panic!("expected Reasoning block, got {:?}", other),
        }
        assert!(!blocks.iter().any(|b| matches!(b, Block::Error { .. })));
    }

    #[tokio::test]
    async fn test_rejected_turn_commits_single_error_block() {
        let producer = Arc::new(MockProducer::new(false));
        let mut dispatcher = make_dispatcher(Arc::clone(&producer));

        dispatcher.send("show me revenue").await.unwrap();

        assert_eq!(producer.started.lock().len(), 1);
        assert_eq!(dispatcher.phase(), TurnPhase::Idle);
        assert!(!dispatcher.store.is_loading());

        // One user message plus one assistant message holding the error.
        let messages = dispatcher.store.messages();
        assert_eq!(messages.len(), 2);
        let blocks = messages[1].blocks();
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            Block::Error { message, .. } => {
                assert!(message.contains("agent unavailable"));
            }
            other => panic!("expected Error block, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_finish_turn_twice_commits_once() {
        let mut dispatcher = make_dispatcher(Arc::new(MockProducer::new(true)));
        dispatcher.store.begin_assistant_turn();
        dispatcher.pump(thinking("a"));

        dispatcher.finish_turn();
        dispatcher.finish_turn();

        assert_eq!(dispatcher.store.messages().len(), 1);
        assert_eq!(dispatcher.phase(), TurnPhase::Idle);
    }

    #[tokio::test]
    async fn test_straggler_signal_after_commit_is_dropped() {
        let mut dispatcher = make_dispatcher(Arc::new(MockProducer::new(true)));
        dispatcher.store.begin_assistant_turn();
        dispatcher.pump(thinking("a"));
        dispatcher.finish_turn();

        let before = dispatcher.store.messages().len();
        dispatcher.pump(thinking("late"));
        assert_eq!(dispatcher.store.messages().len(), before);
        assert!(dispatcher.store.streaming_blocks().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_handle_is_idempotent() {
        let dispatcher = make_dispatcher(Arc::new(MockProducer::new(true)));
        let handle = dispatcher.handle();
        dispatcher.cancel();
        dispatcher.cancel();
        assert!(handle.is_cancelled());
    }
}
