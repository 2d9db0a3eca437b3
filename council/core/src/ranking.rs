//! Ranking Text Analysis
//!
//! Stage 2 models are instructed to end their critique with a
//! `FINAL RANKING:` section listing anonymized labels from best to
//! worst. The backend normally parses that section itself, but the
//! authoritative `stage2_complete` payload is allowed to omit
//! `parsed_ranking`; this module recovers it client-side and computes
//! the cross-model aggregate standing used by surfaces.
//!
//! Labels have the fixed shape `Response X` with a single uppercase
//! letter, so extraction is a plain scan rather than a regex.

use std::collections::BTreeMap;

use crate::events::{AggregateRanking, Stage2Entry, StageMetadata};

/// The marker stage 2 models are instructed to emit before their ranking.
const RANKING_MARKER: &str = "FINAL RANKING:";

/// The prefix every anonymized label carries.
const LABEL_PREFIX: &str = "Response ";

/// Extract the ranked labels from a stage 2 ranking text.
///
/// Prefers the numbered list after the `FINAL RANKING:` marker
/// (e.g. `1. Response C`). Falls back to every label mentioned after
/// the marker in order, and finally to every label mentioned anywhere
/// in the text. Returns an empty vector when no label appears at all.
///
/// Repeated mentions of a label keep only the first occurrence, so a
/// critique that discusses a label before ranking it cannot place it
/// twice.
#[must_use]
pub fn parse_final_ranking(text: &str) -> Vec<String> {
    if let Some(idx) = text.find(RANKING_MARKER) {
        let section = &text[idx + RANKING_MARKER.len()..];

        let numbered = scan_labels(section, true);
        if !numbered.is_empty() {
            return numbered;
        }

        return scan_labels(section, false);
    }

    scan_labels(text, false)
}

/// Collect `Response X` labels from `text` in order of appearance.
///
/// With `numbered_only`, a label counts only when preceded by a list
/// number (digits, a period, optional whitespace).
fn scan_labels(text: &str, numbered_only: bool) -> Vec<String> {
    let mut labels = Vec::new();
    for (start, _) in text.match_indices(LABEL_PREFIX) {
        let rest = &text[start + LABEL_PREFIX.len()..];
        let Some(letter) = rest.chars().next().filter(char::is_ascii_uppercase) else {
            continue;
        };
        if numbered_only && !preceded_by_list_number(&text[..start]) {
            continue;
        }
        let label = format!("{LABEL_PREFIX}{letter}");
        // Critique prose mentions labels repeatedly; keep the first.
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels
}

/// Whether `before` ends in a numbered-list prefix like `"1. "`.
///
/// Any whitespace, including a line break, may separate the number
/// from the label.
fn preceded_by_list_number(before: &str) -> bool {
    let trimmed = before.trim_end_matches([' ', '\t', '\n', '\r']);
    let Some(digits) = trimmed.strip_suffix('.') else {
        return false;
    };
    digits
        .chars()
        .last()
        .is_some_and(|c| c.is_ascii_digit())
}

/// Compute each model's aggregate standing across all stage 2 rankings.
///
/// Uses each entry's `parsed_ranking` when present, re-parsing the raw
/// ranking text otherwise. Labels missing from `label_to_model` are
/// skipped. Results are sorted best-first by mean position, rounded to
/// two decimals.
#[must_use]
pub fn aggregate_rankings(
    entries: &[Stage2Entry],
    metadata: &StageMetadata,
) -> Vec<AggregateRanking> {
    let mut positions: BTreeMap<&str, Vec<usize>> = BTreeMap::new();

    for entry in entries {
        let parsed = match entry.parsed_ranking {
            Some(ref labels) => labels.clone(),
            None => parse_final_ranking(&entry.ranking),
        };
        for (position, label) in parsed.iter().enumerate() {
            if let Some(model) = metadata.resolve(label) {
                positions.entry(model).or_default().push(position + 1);
            }
        }
    }

    let mut aggregate: Vec<AggregateRanking> = positions
        .into_iter()
        .map(|(model, ranks)| {
            #[allow(clippy::cast_precision_loss)]
            let mean = ranks.iter().sum::<usize>() as f64 / ranks.len() as f64;
            AggregateRanking {
                model: model.to_string(),
                average_rank: (mean * 100.0).round() / 100.0,
                rankings_count: u32::try_from(ranks.len()).unwrap_or(u32::MAX),
            }
        })
        .collect();

    aggregate.sort_by(|a, b| {
        a.average_rank
            .partial_cmp(&b.average_rank)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    aggregate
}
