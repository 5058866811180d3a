//! Producer-facing requests: turn start and cancellation

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Body of an accepted turn-start response
#[derive(Debug, Deserialize)]
struct TurnAccepted {
    status: String,
}

/// The outbound half of the producer contract.
///
/// Both requests are fire-and-forget from the turn state machine's point of
/// view: their completion never gates event processing.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Ask the backend to start a turn. `Ok` means the turn was queued.
    async fn start_turn(&self, conversation: &str, message: &str) -> Result<()>;

    /// Best-effort cancellation notice; no payload is read.
    async fn cancel_turn(&self, conversation: &str) -> Result<()>;
}

/// HTTP producer talking to the agent backend
pub struct HttpProducer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProducer {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Producer for HttpProducer {
    async fn start_turn(&self, conversation: &str, message: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/chat", self.base_url))
            .json(&serde_json::json!({
                "conversation": conversation,
                "message": message,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Rejected(format!("{}: {}", status, body)));
        }

        let accepted: TurnAccepted = response.json().await?;
        if accepted.status != "queued" {
            return Err(Error::Rejected(format!(
                "unexpected status: {}",
                accepted.status
            )));
        }
        Ok(())
    }

    async fn cancel_turn(&self, conversation: &str) -> Result<()> {
        self.client
            .post(format!("{}/cancel/{}", self.base_url, conversation))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
