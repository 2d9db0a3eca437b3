//! Turn Controller
//!
//! Runs one send-and-stream cycle per conversation: appends the
//! optimistic user/assistant pair, opens the event stream, folds every
//! arriving event through the transcript reducer, and rolls the pair
//! back when the transport fails before a terminal event.
//!
//! # Interaction Model
//!
//! The controller never blocks on the stream. Opening it spawns nothing
//! here: the transport delivers events on an internal channel, and the
//! surface drains that channel with [`TurnController::poll_events`]
//! once per frame. Folding therefore happens on the caller's thread,
//! synchronously, one ordered event at a time.
//!
//! At most one send may be outstanding per conversation. A second send
//! is rejected, not queued, which keeps rollback unambiguous.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::api::CouncilApi;
use crate::events::StreamEvent;
use crate::transcript::{ConversationId, ConversationSummary, Transcript, TurnId};

/// Why a send was rejected or abandoned.
///
/// `NoConversation` and `Busy` reject without touching any state.
/// `Transport` means the optimistic pair was appended and then rolled
/// back because the stream could not be opened.
#[derive(Debug, Error)]
pub enum SendError {
    /// No conversation is selected; the send is a no-op.
    #[error("no conversation selected")]
    NoConversation,
    /// A send is already outstanding on this conversation.
    #[error("a send is already outstanding")]
    Busy,
    /// The stream could not be opened; the optimistic pair was rolled back.
    #[error("failed to open event stream: {0}")]
    Transport(String),
}

/// Side effects accumulated while draining the event channel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ControllerSignals {
    /// The conversation summary list should be refreshed
    pub refresh_conversations: bool,
    /// The stream reported a server-side error (partial content kept)
    pub stream_error: Option<String>,
    /// The transport broke before a terminal event; the optimistic pair
    /// was rolled back
    pub rolled_back: bool,
}

impl ControllerSignals {
    /// Whether anything happened worth reacting to.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Orchestrates sends and stream consumption for the selected conversation.
pub struct TurnController {
    api: Arc<dyn CouncilApi>,
    conversations: Vec<ConversationSummary>,
    selected: Option<ConversationId>,
    transcript: Transcript,
    outstanding: bool,
    active_turn: Option<TurnId>,
    events: Option<mpsc::Receiver<StreamEvent>>,
}

impl TurnController {
    /// Create a controller over the given transport.
    pub fn new(api: Arc<dyn CouncilApi>) -> Self {
        Self {
            api,
            conversations: Vec::new(),
            selected: None,
            transcript: Transcript::default(),
            outstanding: false,
            active_turn: None,
            events: None,
        }
    }

    /// The current conversation summaries, newest ordering as served.
    #[must_use]
    pub fn conversations(&self) -> &[ConversationSummary] {
        &self.conversations
    }

    /// The selected conversation, if any.
    #[must_use]
    pub fn selected(&self) -> Option<&ConversationId> {
        self.selected.as_ref()
    }

    /// The current transcript value.
    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Whether a send is outstanding.
    #[must_use]
    pub fn is_outstanding(&self) -> bool {
        self.outstanding
    }

    /// Refresh the conversation summary list.
    ///
    /// A load failure is recovered locally: it is logged and the held
    /// list stays unchanged.
    pub async fn refresh_conversations(&mut self) {
        match self.api.list_conversations().await {
            Ok(summaries) => self.conversations = summaries,
            Err(error) => {
                tracing::warn!(%error, "failed to list conversations");
            }
        }
    }

    /// Create a new conversation and select it.
    ///
    /// Ignored while a send is outstanding: the controller owns the
    /// transcript for the duration of a send, and replacing it would
    /// orphan the open stream and its optimistic pair.
    pub async fn new_conversation(&mut self) {
        if self.outstanding {
            tracing::debug!("ignoring new conversation during outstanding send");
            return;
        }
        match self.api.create_conversation().await {
            Ok(summary) => {
                self.selected = Some(summary.id.clone());
                self.transcript = Transcript::default();
                self.conversations.push(summary);
            }
            Err(error) => {
                tracing::warn!(%error, "failed to create conversation");
            }
        }
    }

    /// Select a conversation, replacing the transcript wholesale with
    /// the backend's copy.
    ///
    /// Ignored while a send is outstanding; a load failure leaves the
    /// current selection and transcript untouched.
    pub async fn select_conversation(&mut self, id: ConversationId) {
        if self.outstanding {
            tracing::debug!(conversation = %id, "ignoring selection during outstanding send");
            return;
        }
        match self.api.get_conversation(&id).await {
            Ok(conversation) => {
                self.selected = Some(conversation.id);
                self.transcript = Transcript::from_messages(conversation.messages);
            }
            Err(error) => {
                tracing::warn!(conversation = %id, %error, "failed to load conversation");
            }
        }
    }

    /// Start one send-and-stream cycle.
    ///
    /// Appends the optimistic user/assistant pair before the backend
    /// acknowledges anything, then opens the stream. If the stream
    /// cannot be opened the pair is rolled back and `Transport` is
    /// returned; the transcript length equals its pre-send length.
    pub async fn send(&mut self, content: &str) -> Result<(), SendError> {
        let Some(conversation) = self.selected.clone() else {
            return Err(SendError::NoConversation);
        };
        if self.outstanding {
            return Err(SendError::Busy);
        }

        self.outstanding = true;
        let turn = TurnId::new();
        self.transcript = self.transcript.push_turn(turn, content);

        match self.api.send_message_stream(&conversation, content).await {
            Ok(rx) => {
                self.active_turn = Some(turn);
                self.events = Some(rx);
                Ok(())
            }
            Err(error) => {
                tracing::warn!(conversation = %conversation, %error, "failed to open stream");
                self.transcript = self.transcript.rollback_turn(turn);
                self.outstanding = false;
                Err(SendError::Transport(error.to_string()))
            }
        }
    }

    /// Drain pending events from the open stream, folding each into the
    /// transcript, and report the accumulated side effects.
    ///
    /// Call once per frame. A channel that closes without a terminal
    /// event is a transport failure: the optimistic pair is rolled back
    /// and the transcript returns to its pre-send length.
    pub fn poll_events(&mut self) -> ControllerSignals {
        let mut signals = ControllerSignals::default();
        let Some(mut rx) = self.events.take() else {
            return signals;
        };

        let mut finished = false;
        let mut disconnected = false;

        loop {
            match rx.try_recv() {
                Ok(event) => {
                    let (next, outcome) = self.transcript.fold(&event);
                    self.transcript = next;
                    if outcome.refresh_conversations {
                        signals.refresh_conversations = true;
                    }
                    if let Some(message) = outcome.error {
                        tracing::warn!(%message, "stream reported an error");
                        signals.stream_error = Some(message);
                    }
                    if outcome.finished {
                        finished = true;
                        break;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }

        if finished {
            self.close_stream();
        } else if disconnected {
            tracing::warn!("transport closed before a terminal event; rolling back send");
            if let Some(turn) = self.active_turn {
                self.transcript = self.transcript.rollback_turn(turn);
            }
            signals.rolled_back = true;
            self.close_stream();
        } else {
            // Stream still open: keep the receiver for the next poll.
            self.events = Some(rx);
        }

        signals
    }

    /// Converge to the idle state after a terminal event or failure.
    fn close_stream(&mut self) {
        self.outstanding = false;
        self.active_turn = None;
        self.events = None;
    }
}
