//! Conversation Transcript and Stream Reducer
//!
//! The transcript is an ordered sequence of user messages and assistant
//! turns for one conversation. Folding a stream event produces a new
//! transcript value; a transcript that has been handed out is never
//! mutated afterwards, so surfaces can hold onto any published value.
//!
//! # Reducer
//!
//! [`Transcript::fold`] dispatches exhaustively over [`StreamEvent`]
//! and applies stage events to the transcript's last message iff that
//! message is an assistant turn. Events that carry no transcript effect
//! (`title_complete`, `complete`, unknown kinds) fold to an observably
//! equal transcript; their side effects are reported through
//! [`FoldOutcome`] instead of a captured callback, so collaborators
//! (the conversation list, logging) stay outside the reducer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::StreamEvent;
use crate::turn::AssistantTurn;

/// Identifier of a conversation, assigned by the backend of record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identity of one send, tagged onto the entries it appended.
///
/// Rollback removes exactly the entries carrying the failed send's tag,
/// never a positional slice, so a violated no-concurrent-mutation
/// assumption cannot remove foreign entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub Uuid);

impl TurnId {
    /// Create a new unique turn ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

/// A summary row for the conversation sidebar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Conversation identifier
    pub id: ConversationId,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// Number of messages exchanged
    #[serde(default)]
    pub message_count: u32,
}

/// A full conversation as returned by the backend of record.
///
/// Replaces the local transcript wholesale when loaded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation identifier
    pub id: ConversationId,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// Messages in order
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// One entry in a transcript: a user message or an assistant turn.
///
/// The role is immutable once created. The `turn` tag is local-only
/// bookkeeping for optimistic rollback and never crosses the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// A message typed by the user
    User {
        /// The message text
        content: String,
        /// Send that appended this entry, if appended optimistically
        #[serde(skip)]
        turn: Option<TurnId>,
    },
    /// An assistant turn across the three pipeline stages
    Assistant {
        /// The per-stage turn state
        #[serde(flatten)]
        state: AssistantTurn,
        /// Send that appended this entry, if appended optimistically
        #[serde(skip)]
        turn: Option<TurnId>,
    },
}

impl Message {
    /// Create a user message tagged with its send.
    #[must_use]
    pub fn user(content: impl Into<String>, turn: TurnId) -> Self {
        Self::User {
            content: content.into(),
            turn: Some(turn),
        }
    }

    /// Create an empty assistant turn tagged with its send.
    #[must_use]
    pub fn assistant_placeholder(turn: TurnId) -> Self {
        Self::Assistant {
            state: AssistantTurn::default(),
            turn: Some(turn),
        }
    }

    /// The send tag on this entry, if any.
    #[must_use]
    pub fn turn_tag(&self) -> Option<TurnId> {
        match self {
            Self::User { turn, .. } | Self::Assistant { turn, .. } => *turn,
        }
    }
}

/// Side effects of one fold, reported to the caller instead of being
/// performed inside the reducer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FoldOutcome {
    /// The conversation summary list should be refreshed
    pub refresh_conversations: bool,
    /// The stream has terminated; no further events are expected
    pub finished: bool,
    /// The stream failed with this server-reported message
    pub error: Option<String>,
}

/// The ordered transcript of one conversation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Build a transcript from messages loaded from the backend of record.
    #[must_use]
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// The messages in order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The last entry, if any.
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Append the optimistic pair for one send: the user message and an
    /// empty assistant turn, both tagged with the send's identity.
    #[must_use]
    pub fn push_turn(&self, turn: TurnId, content: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.messages.push(Message::user(content, turn));
        next.messages.push(Message::assistant_placeholder(turn));
        next
    }

    /// Remove exactly the entries tagged with `turn`. Idempotent.
    #[must_use]
    pub fn rollback_turn(&self, turn: TurnId) -> Self {
        let mut next = self.clone();
        next.messages.retain(|m| m.turn_tag() != Some(turn));
        next
    }

    /// Fold one stream event, producing the successor transcript and the
    /// event's side effects.
    ///
    /// Stage events target the last message iff it is an assistant turn
    /// and are otherwise a no-op; the input transcript is never mutated.
    #[must_use]
    pub fn fold(&self, event: &StreamEvent) -> (Self, FoldOutcome) {
        let mut next = self.clone();
        let mut outcome = FoldOutcome::default();

        match event {
            StreamEvent::Stage1Start => next.with_open_turn(AssistantTurn::begin_stage1),
            StreamEvent::Stage1Chunk { model, content } => {
                next.with_open_turn(|t| t.apply_stage1_chunk(model, content));
            }
            StreamEvent::Stage1Complete { data } => {
                next.with_open_turn(|t| t.finish_stage1(data.clone()));
            }
            StreamEvent::Stage2Start => next.with_open_turn(AssistantTurn::begin_stage2),
            StreamEvent::Stage2Metadata { metadata } => {
                next.with_open_turn(|t| t.merge_metadata(metadata));
            }
            StreamEvent::Stage2Chunk { model, content } => {
                next.with_open_turn(|t| t.apply_stage2_chunk(model, content));
            }
            StreamEvent::Stage2Complete { data, metadata } => {
                next.with_open_turn(|t| t.finish_stage2(data.clone(), metadata.clone()));
            }
            StreamEvent::Stage3Start => next.with_open_turn(AssistantTurn::begin_stage3),
            StreamEvent::Stage3Chunk { content } => {
                next.with_open_turn(|t| t.apply_stage3_chunk(content));
            }
            StreamEvent::Stage3Complete { data } => {
                next.with_open_turn(|t| t.finish_stage3(data.clone()));
            }
            StreamEvent::TitleComplete => {
                outcome.refresh_conversations = true;
            }
            StreamEvent::Complete => {
                outcome.refresh_conversations = true;
                outcome.finished = true;
            }
            StreamEvent::Error { message } => {
                next.with_open_turn(AssistantTurn::abort);
                outcome.finished = true;
                outcome.error = Some(message.clone());
            }
            StreamEvent::Unknown => {}
        }

        (next, outcome)
    }

    /// Apply `op` to the last message if it is an assistant turn.
    fn with_open_turn(&mut self, op: impl FnOnce(&mut AssistantTurn)) {
        if let Some(Message::Assistant { state, .. }) = self.messages.last_mut() {
            op(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Stage1Entry, Stage3Result};
    use pretty_assertions::assert_eq;

    fn open_transcript() -> (Transcript, TurnId) {
        let turn = TurnId::new();
        (Transcript::default().push_turn(turn, "hello"), turn)
    }

    fn open_turn(transcript: &Transcript) -> &AssistantTurn {
        match transcript.last().unwrap() {
            Message::Assistant { state, .. } => state,
            Message::User { .. } => panic!("last message is not an assistant turn"),
        }
    }

    #[test]
    fn test_push_turn_appends_tagged_pair() {
        let (transcript, turn) = open_transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages()[0].turn_tag(), Some(turn));
        assert_eq!(transcript.messages()[1].turn_tag(), Some(turn));
        assert!(matches!(
            transcript.messages()[0],
            Message::User { ref content, .. } if content == "hello"
        ));
    }

    #[test]
    fn test_fold_produces_new_value_without_mutating_input() {
        let (before, _) = open_transcript();
        let snapshot = before.clone();

        let (after, _) = before.fold(&StreamEvent::Stage1Start);

        assert_eq!(before, snapshot);
        assert_ne!(after, before);
    }

    #[test]
    fn test_fold_scenario_stage1_happy_path() {
        let (t, _) = open_transcript();
        let (t, _) = t.fold(&StreamEvent::Stage1Start);
        let (t, _) = t.fold(&StreamEvent::Stage1Chunk {
            model: "a".to_string(),
            content: "Hi".to_string(),
        });
        let (t, _) = t.fold(&StreamEvent::Stage1Chunk {
            model: "a".to_string(),
            content: " there".to_string(),
        });
        let (t, _) = t.fold(&StreamEvent::Stage1Complete {
            data: vec![Stage1Entry {
                model: "a".to_string(),
                response: "Hi there".to_string(),
            }],
        });

        let turn = open_turn(&t);
        assert_eq!(
            turn.stage1,
            Some(vec![Stage1Entry {
                model: "a".to_string(),
                response: "Hi there".to_string(),
            }])
        );
        assert!(!turn.loading.stage1);
    }

    #[test]
    fn test_fold_stage3_chunk_without_start() {
        let (t, _) = open_transcript();
        let (t, _) = t.fold(&StreamEvent::Stage3Chunk {
            content: "X".to_string(),
        });
        assert_eq!(
            open_turn(&t).stage3,
            Some(Stage3Result {
                model: String::new(),
                response: "X".to_string(),
            })
        );
    }

    #[test]
    fn test_fold_unknown_event_is_observably_equal() {
        let (t, _) = open_transcript();
        let (t, _) = t.fold(&StreamEvent::Stage1Chunk {
            model: "a".to_string(),
            content: "Hi".to_string(),
        });

        let (folded, outcome) = t.fold(&StreamEvent::Unknown);
        assert_eq!(folded, t);
        assert_eq!(outcome, FoldOutcome::default());
    }

    #[test]
    fn test_fold_on_empty_transcript_is_noop() {
        let empty = Transcript::default();
        let (folded, _) = empty.fold(&StreamEvent::Stage1Chunk {
            model: "a".to_string(),
            content: "Hi".to_string(),
        });
        assert_eq!(folded, empty);
    }

    #[test]
    fn test_fold_ignores_non_assistant_tail() {
        // A lone user message must not absorb stage events.
        let t = Transcript::from_messages(vec![Message::User {
            content: "hi".to_string(),
            turn: None,
        }]);
        let (folded, _) = t.fold(&StreamEvent::Stage1Start);
        assert_eq!(folded, t);
    }

    #[test]
    fn test_fold_title_complete_signals_refresh_only() {
        let (t, _) = open_transcript();
        let (folded, outcome) = t.fold(&StreamEvent::TitleComplete);
        assert_eq!(folded, t);
        assert!(outcome.refresh_conversations);
        assert!(!outcome.finished);
    }

    #[test]
    fn test_fold_complete_finishes_and_signals_refresh() {
        let (t, _) = open_transcript();
        let (_, outcome) = t.fold(&StreamEvent::Complete);
        assert!(outcome.finished);
        assert!(outcome.refresh_conversations);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_fold_error_preserves_partial_content() {
        let (t, _) = open_transcript();
        let (t, _) = t.fold(&StreamEvent::Stage1Start);
        let (t, _) = t.fold(&StreamEvent::Stage1Chunk {
            model: "a".to_string(),
            content: "partial".to_string(),
        });

        let (t, outcome) = t.fold(&StreamEvent::Error {
            message: "upstream failed".to_string(),
        });

        assert!(outcome.finished);
        assert_eq!(outcome.error.as_deref(), Some("upstream failed"));
        let turn = open_turn(&t);
        assert_eq!(turn.stage1.as_ref().unwrap()[0].response, "partial");
        assert!(!turn.is_streaming());
    }

    #[test]
    fn test_rollback_removes_exactly_tagged_pair() {
        let base = Transcript::from_messages(vec![Message::User {
            content: "earlier".to_string(),
            turn: None,
        }]);
        let turn = TurnId::new();
        let with_send = base.push_turn(turn, "hello");
        assert_eq!(with_send.len(), 3);

        let rolled = with_send.rollback_turn(turn);
        assert_eq!(rolled, base);
    }

    #[test]
    fn test_rollback_is_idempotent() {
        let (t, turn) = open_transcript();
        let once = t.rollback_turn(turn);
        let twice = once.rollback_turn(turn);
        assert_eq!(once.len(), 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_rollback_leaves_other_turns_alone() {
        let first = TurnId::new();
        let second = TurnId::new();
        let t = Transcript::default()
            .push_turn(first, "one")
            .push_turn(second, "two");

        let rolled = t.rollback_turn(second);
        assert_eq!(rolled.len(), 2);
        assert!(rolled.messages().iter().all(|m| m.turn_tag() == Some(first)));
    }

    #[test]
    fn test_conversation_wire_shape() {
        let json = r#"{
            "id": "conv-1",
            "created_at": "2025-01-15T10:30:00Z",
            "messages": [
                {"role": "user", "content": "hello"},
                {"role": "assistant", "stage3": {"model": "chair", "response": "hi"}}
            ]
        }"#;
        let conversation: Conversation = serde_json::from_str(json).unwrap();
        assert_eq!(conversation.id, ConversationId::from("conv-1"));
        assert_eq!(conversation.messages.len(), 2);

        let transcript = Transcript::from_messages(conversation.messages);
        match transcript.last().unwrap() {
            Message::Assistant { state, turn } => {
                assert_eq!(state.stage3.as_ref().unwrap().model, "chair");
                assert_eq!(*turn, None);
            }
            Message::User { .. } => panic!("expected assistant turn"),
        }
    }
}
