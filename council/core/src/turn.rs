//! Turn State and Stage Accumulators
//!
//! One assistant turn is the product of three pipeline stages. Each
//! stage accumulates independently: chunk events grow per-model text
//! keyed by model identity, and the stage's `_complete` event replaces
//! everything accumulated with the server's authoritative result. This
//! guards against any client-side accumulation drift.
//!
//! A stage that has not started is `None`, so an empty turn renders as
//! "nothing yet" rather than three empty lists. Chunks arriving before
//! their `_start` are tolerated by treating the absent stage as an
//! implicit empty start.

use serde::{Deserialize, Serialize};

use crate::events::{Stage1Entry, Stage2Entry, Stage3Result, StageMetadata};
use crate::ranking;

/// Per-stage in-flight flags for one assistant turn.
///
/// Each flag is true from its stage's `_start` event until that stage's
/// `_complete` event or a stream-terminating error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingFlags {
    /// Stage 1 (drafts) is streaming
    pub stage1: bool,
    /// Stage 2 (rankings) is streaming
    pub stage2: bool,
    /// Stage 3 (synthesis) is streaming
    pub stage3: bool,
}

impl LoadingFlags {
    /// Whether any stage is still streaming.
    #[must_use]
    pub fn any(&self) -> bool {
        self.stage1 || self.stage2 || self.stage3
    }
}

/// The state of one assistant turn across all three stages.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantTurn {
    /// Per-model drafts, in first-seen order; `None` until stage 1 starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage1: Option<Vec<Stage1Entry>>,
    /// Per-model rankings, in first-seen order; `None` until stage 2 starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage2: Option<Vec<Stage2Entry>>,
    /// The chairman's synthesis; `None` until stage 3 starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage3: Option<Stage3Result>,
    /// Label-to-model metadata for stage 2
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<StageMetadata>,
    /// Per-stage in-flight flags
    #[serde(default, skip_serializing_if = "is_idle")]
    pub loading: LoadingFlags,
}

fn is_idle(flags: &LoadingFlags) -> bool {
    !flags.any()
}

impl AssistantTurn {
    /// Reset stage 1 to an empty list and mark it streaming.
    pub fn begin_stage1(&mut self) {
        self.stage1 = Some(Vec::new());
        self.loading.stage1 = true;
    }

    /// Fold one stage 1 chunk: append to the entry for `model`, creating
    /// it (and the stage itself, if `_start` never arrived) on first sight.
    pub fn apply_stage1_chunk(&mut self, model: &str, content: &str) {
        let entries = self.stage1.get_or_insert_with(Vec::new);
        match entries.iter_mut().find(|e| e.model == model) {
            Some(entry) => entry.response.push_str(content),
            None => entries.push(Stage1Entry {
                model: model.to_string(),
                response: content.to_string(),
            }),
        }
    }

    /// Replace stage 1 with the server's authoritative result.
    pub fn finish_stage1(&mut self, data: Vec<Stage1Entry>) {
        self.stage1 = Some(data);
        self.loading.stage1 = false;
    }

    /// Reset stage 2 to an empty list and mark it streaming.
    pub fn begin_stage2(&mut self) {
        self.stage2 = Some(Vec::new());
        self.loading.stage2 = true;
    }

    /// Merge a partial metadata payload into the turn's metadata slot.
    pub fn merge_metadata(&mut self, partial: &StageMetadata) {
        self.metadata
            .get_or_insert_with(StageMetadata::default)
            .merge_from(partial);
    }

    /// Fold one stage 2 chunk into the entry for `model`.
    ///
    /// Leaves `parsed_ranking` untouched: it is stale until the stage
    /// completes and consumers must not rely on it mid-stream.
    pub fn apply_stage2_chunk(&mut self, model: &str, content: &str) {
        let entries = self.stage2.get_or_insert_with(Vec::new);
        match entries.iter_mut().find(|e| e.model == model) {
            Some(entry) => entry.ranking.push_str(content),
            None => entries.push(Stage2Entry {
                model: model.to_string(),
                ranking: content.to_string(),
                parsed_ranking: None,
            }),
        }
    }

    /// Replace stage 2 and the metadata slot with the server's
    /// authoritative result.
    ///
    /// Entries the server delivered without a `parsed_ranking` get one
    /// recovered from their ranking text.
    pub fn finish_stage2(&mut self, mut data: Vec<Stage2Entry>, metadata: StageMetadata) {
        for entry in &mut data {
            if entry.parsed_ranking.is_none() {
                entry.parsed_ranking = Some(ranking::parse_final_ranking(&entry.ranking));
            }
        }
        self.stage2 = Some(data);
        self.metadata = Some(metadata);
        self.loading.stage2 = false;
    }

    /// Reset stage 3 to an empty placeholder and mark it streaming.
    pub fn begin_stage3(&mut self) {
        self.stage3 = Some(Stage3Result::default());
        self.loading.stage3 = true;
    }

    /// Fold one stage 3 chunk into the synthesis text.
    pub fn apply_stage3_chunk(&mut self, content: &str) {
        self.stage3
            .get_or_insert_with(Stage3Result::default)
            .response
            .push_str(content);
    }

    /// Replace stage 3 with the server's authoritative result.
    pub fn finish_stage3(&mut self, data: Stage3Result) {
        self.stage3 = Some(data);
        self.loading.stage3 = false;
    }

    /// End every in-flight stage without discarding accumulated content.
    ///
    /// Applied on a stream-terminating error: partial text stays
    /// renderable, nothing keeps spinning.
    pub fn abort(&mut self) {
        self.loading = LoadingFlags::default();
    }

    /// Whether any stage of this turn is still streaming.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.loading.any()
    }
}
