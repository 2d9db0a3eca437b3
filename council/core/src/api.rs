//! Council Backend API
//!
//! The transport the controller drives. [`CouncilApi`] is the contract:
//! conversation CRUD plus one long-lived event stream per send, with
//! events delivered in backend send order and the channel closing only
//! after the terminal event or on transport failure.
//!
//! [`HttpCouncilApi`] implements the contract over HTTP with
//! server-sent events: `data:` lines carrying one JSON event envelope
//! each, parsed out of the byte stream with a plain buffer loop.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::CouncilConfig;
use crate::events::StreamEvent;
use crate::transcript::{Conversation, ConversationId, ConversationSummary};

/// Capacity of the event channel between the transport pump and the
/// controller. Folding is cheap, so the pump rarely waits.
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Client contract to the council backend of record.
#[async_trait]
pub trait CouncilApi: Send + Sync {
    /// List conversation summaries.
    async fn list_conversations(&self) -> anyhow::Result<Vec<ConversationSummary>>;

    /// Create a new, empty conversation.
    async fn create_conversation(&self) -> anyhow::Result<ConversationSummary>;

    /// Fetch a full conversation.
    async fn get_conversation(&self, id: &ConversationId) -> anyhow::Result<Conversation>;

    /// Send a message and open its event stream.
    ///
    /// Events arrive on the returned channel in backend send order. The
    /// channel closes after the terminal event, or earlier if the
    /// transport breaks. The consumer treats an early close as a
    /// transport failure.
    async fn send_message_stream(
        &self,
        id: &ConversationId,
        content: &str,
    ) -> anyhow::Result<mpsc::Receiver<StreamEvent>>;
}

/// HTTP implementation of [`CouncilApi`].
#[derive(Clone)]
pub struct HttpCouncilApi {
    config: CouncilConfig,
    http: reqwest::Client,
}

impl HttpCouncilApi {
    /// Create a client against the given backend.
    #[must_use]
    pub fn new(config: CouncilConfig) -> Self {
        Self {
            config,
            // No overall timeout: the stream stays open for the whole
            // three-stage pipeline.
            http: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Create a client from environment configuration.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(CouncilConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url())
    }
}

#[async_trait]
impl CouncilApi for HttpCouncilApi {
    async fn list_conversations(&self) -> anyhow::Result<Vec<ConversationSummary>> {
        let response = self
            .http
            .get(self.url("/api/conversations"))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn create_conversation(&self) -> anyhow::Result<ConversationSummary> {
        let response = self
            .http
            .post(self.url("/api/conversations"))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn get_conversation(&self, id: &ConversationId) -> anyhow::Result<Conversation> {
        let response = self
            .http
            .get(self.url(&format!("/api/conversations/{id}")))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn send_message_stream(
        &self,
        id: &ConversationId,
        content: &str,
    ) -> anyhow::Result<mpsc::Receiver<StreamEvent>> {
        use futures::StreamExt;

        let response = self
            .http
            .post(self.url(&format!("/api/conversations/{id}/message")))
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await?
            .error_for_status()?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut buffer = String::new();

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));

                        while let Some(pos) = buffer.find('\n') {
                            let line = buffer[..pos].trim().to_string();
                            buffer = buffer[pos + 1..].to_string();

                            let Some(event) = decode_sse_line(&line) else {
                                continue;
                            };
                            let terminal = event.is_terminal();
                            if tx.send(event).await.is_err() {
                                // Consumer went away; stop pumping.
                                return;
                            }
                            if terminal {
                                return;
                            }
                        }
                    }
                    Err(error) => {
                        tracing::warn!(%error, "event stream transport error");
                        // Dropping tx closes the channel without a
                        // terminal event; the controller rolls back.
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Decode one SSE line into an event.
///
/// Returns `None` for non-`data:` lines, blank keep-alives, and
/// malformed frames (logged and skipped; a bad frame must not kill the
/// stream).
fn decode_sse_line(line: &str) -> Option<StreamEvent> {
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() {
        return None;
    }
    match serde_json::from_str(payload) {
        Ok(event) => Some(event),
        Err(error) => {
            tracing::warn!(%error, payload, "skipping malformed event frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_data_line() {
        let event = decode_sse_line(r#"data: {"type":"stage1_start"}"#);
        assert_eq!(event, Some(StreamEvent::Stage1Start));
    }

    #[test]
    fn test_decode_data_line_without_space() {
        let event = decode_sse_line(r#"data:{"type":"complete"}"#);
        assert_eq!(event, Some(StreamEvent::Complete));
    }

    #[test]
    fn test_decode_ignores_comment_and_blank_lines() {
        assert_eq!(decode_sse_line(": keep-alive"), None);
        assert_eq!(decode_sse_line(""), None);
        assert_eq!(decode_sse_line("data:"), None);
    }

    #[test]
    fn test_decode_skips_malformed_frames() {
        assert_eq!(decode_sse_line("data: {not json"), None);
    }

    #[test]
    fn test_decode_unknown_kind_survives() {
        let event = decode_sse_line(r#"data: {"type":"brand_new_event","x":1}"#);
        assert_eq!(event, Some(StreamEvent::Unknown));
    }
}
