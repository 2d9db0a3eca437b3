//! Stream Events
//!
//! The wire-level event envelope consumed from the council backend. One
//! send produces a single ordered stream of these events covering all
//! three pipeline stages (parallel drafts, peer rankings, chairman
//! synthesis) plus stream bookkeeping.
//!
//! # Design Philosophy
//!
//! The event set is a closed tagged union with exhaustive dispatch in
//! the reducer. Forward compatibility is preserved by the [`Unknown`]
//! arm: any event kind this client does not recognize deserializes to
//! `Unknown` and folds as a no-op instead of failing the stream.
//!
//! [`Unknown`]: StreamEvent::Unknown

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One event from the council backend, tagged by kind.
///
/// Events for one turn arrive in send order. `_start` nominally
/// precedes `_chunk`/`_complete` for its stage, but consumers must
/// tolerate violations (see the accumulator folds in [`crate::turn`]).
/// `Complete` is always the last event of a successful stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Stage 1 (parallel drafts) has begun.
    Stage1Start,

    /// An incremental fragment of one model's stage 1 draft.
    Stage1Chunk {
        /// Model producing this fragment
        model: String,
        /// The text fragment
        content: String,
    },

    /// Authoritative final stage 1 result, superseding accumulated chunks.
    Stage1Complete {
        /// Complete per-model drafts in server order
        data: Vec<Stage1Entry>,
    },

    /// Stage 2 (peer rankings) has begun.
    Stage2Start,

    /// Partial metadata for stage 2, merged into any metadata already held.
    Stage2Metadata {
        /// The partial metadata payload
        metadata: StageMetadata,
    },

    /// An incremental fragment of one model's stage 2 ranking.
    Stage2Chunk {
        /// Model producing this fragment
        model: String,
        /// The text fragment
        content: String,
    },

    /// Authoritative final stage 2 result plus full metadata.
    Stage2Complete {
        /// Complete per-model rankings in server order
        data: Vec<Stage2Entry>,
        /// Full metadata, replacing any partial metadata wholesale
        metadata: StageMetadata,
    },

    /// Stage 3 (chairman synthesis) has begun.
    Stage3Start,

    /// An incremental fragment of the chairman's synthesis.
    ///
    /// Carries no model identifier: exactly one chairman model produces
    /// stage 3.
    Stage3Chunk {
        /// The text fragment
        content: String,
    },

    /// Authoritative final stage 3 result.
    Stage3Complete {
        /// The chairman's complete synthesis
        data: Stage3Result,
    },

    /// The conversation title has been generated server-side.
    ///
    /// Carries no payload this client uses; it signals that the
    /// conversation summary list should be refreshed.
    TitleComplete,

    /// End of stream. No further events will arrive.
    Complete,

    /// The stream failed server-side.
    Error {
        /// Human-readable failure description
        message: String,
    },

    /// An event kind this client does not recognize. Ignored.
    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    /// Whether this event terminates the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error { .. })
    }
}

/// One model's draft from stage 1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage1Entry {
    /// Model identifier
    pub model: String,
    /// Draft text (append-only while streaming)
    pub response: String,
}

/// One model's ranking from stage 2.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage2Entry {
    /// Model identifier
    pub model: String,
    /// Ranking/critique text (append-only while streaming)
    pub ranking: String,
    /// Ranked labels extracted from the ranking text.
    ///
    /// Only guaranteed present after stage 2 completes; absent or stale
    /// while chunks are still arriving.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_ranking: Option<Vec<String>>,
}

/// The chairman's synthesized answer from stage 3.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Stage3Result {
    /// Chairman model identifier (empty until known)
    pub model: String,
    /// Synthesis text
    pub response: String,
}

/// Metadata describing how anonymized stage 2 labels map back to models.
///
/// May arrive incrementally via `stage2_metadata` events and is merged
/// field-by-field until `stage2_complete` replaces it wholesale.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StageMetadata {
    /// Anonymized label (e.g. "Response A") to model identifier
    #[serde(default)]
    pub label_to_model: BTreeMap<String, String>,
    /// Cross-model aggregate rankings, present once computed server-side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_rankings: Option<Vec<AggregateRanking>>,
}

impl StageMetadata {
    /// Merge a partial metadata payload into this one.
    ///
    /// Shallow, per-field: label mappings are merged key-by-key with the
    /// later value winning; fields absent from the partial payload are
    /// left untouched.
    pub fn merge_from(&mut self, partial: &StageMetadata) {
        for (label, model) in &partial.label_to_model {
            self.label_to_model
                .insert(label.clone(), model.clone());
        }
        if let Some(ref aggregate) = partial.aggregate_rankings {
            self.aggregate_rankings = Some(aggregate.clone());
        }
    }

    /// Resolve an anonymized label to a model identifier, if known.
    #[must_use]
    pub fn resolve(&self, label: &str) -> Option<&str> {
        self.label_to_model.get(label).map(String::as_str)
    }
}

/// A model's aggregate standing across all stage 2 rankings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateRanking {
    /// Model identifier
    pub model: String,
    /// Mean position across rankings (lower is better)
    pub average_rank: f64,
    /// How many rankings placed this model
    pub rankings_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_chunk_event_deserializes() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"stage1_chunk","model":"gpt","content":"Hi"}"#)
                .unwrap();
        assert_eq!(
            event,
            StreamEvent::Stage1Chunk {
                model: "gpt".to_string(),
                content: "Hi".to_string(),
            }
        );
    }

    #[test]
    fn test_complete_event_deserializes() {
        let event: StreamEvent = serde_json::from_str(
            r#"{"type":"stage1_complete","data":[{"model":"gpt","response":"Hi there"}]}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            StreamEvent::Stage1Complete {
                data: vec![Stage1Entry {
                    model: "gpt".to_string(),
                    response: "Hi there".to_string(),
                }],
            }
        );
    }

    #[test]
    fn test_stage3_chunk_has_no_model() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"stage3_chunk","content":"X"}"#).unwrap();
        assert_eq!(
            event,
            StreamEvent::Stage3Chunk {
                content: "X".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_kind_deserializes_to_unknown() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"stage4_start","payload":42}"#).unwrap();
        assert_eq!(event, StreamEvent::Unknown);
    }

    #[test]
    fn test_title_complete_ignores_extra_fields() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"title_complete","title":"Greetings"}"#).unwrap();
        assert_eq!(event, StreamEvent::TitleComplete);
    }

    #[test]
    fn test_error_event_is_terminal() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"error","message":"boom"}"#).unwrap();
        assert!(event.is_terminal());
        assert!(StreamEvent::Complete.is_terminal());
        assert!(!StreamEvent::Stage1Start.is_terminal());
    }

    #[test]
    fn test_metadata_merge_disjoint_labels() {
        let mut a = StageMetadata::default();
        a.label_to_model
            .insert("Response A".to_string(), "gpt".to_string());

        let mut b = StageMetadata::default();
        b.label_to_model
            .insert("Response B".to_string(), "claude".to_string());

        // Merge in either order yields the same mapping.
        let mut ab = a.clone();
        ab.merge_from(&b);
        let mut ba = b.clone();
        ba.merge_from(&a);
        assert_eq!(ab, ba);
        assert_eq!(ab.label_to_model.len(), 2);
    }

    #[test]
    fn test_metadata_merge_later_wins() {
        let mut first = StageMetadata::default();
        first
            .label_to_model
            .insert("Response A".to_string(), "gpt".to_string());

        let mut second = StageMetadata::default();
        second
            .label_to_model
            .insert("Response A".to_string(), "claude".to_string());

        first.merge_from(&second);
        assert_eq!(first.resolve("Response A"), Some("claude"));
    }

    #[test]
    fn test_metadata_merge_preserves_absent_fields() {
        let mut held = StageMetadata {
            label_to_model: BTreeMap::new(),
            aggregate_rankings: Some(vec![AggregateRanking {
                model: "gpt".to_string(),
                average_rank: 1.5,
                rankings_count: 2,
            }]),
        };

        let mut partial = StageMetadata::default();
        partial
            .label_to_model
            .insert("Response A".to_string(), "gpt".to_string());

        held.merge_from(&partial);
        // The partial payload carried no aggregate; the held one survives.
        assert!(held.aggregate_rankings.is_some());
        assert_eq!(held.resolve("Response A"), Some("gpt"));
    }
}
