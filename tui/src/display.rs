//! Transcript Formatting
//!
//! Pure functions that turn a transcript value into styled lines for
//! rendering. No state lives here: the controller owns the transcript,
//! and this module is called fresh every frame with whatever value the
//! controller currently holds.
//!
//! The assistant turn renders as three sections matching the pipeline:
//! per-model drafts, peer rankings (with anonymized labels resolved to
//! model names where metadata allows), and the chairman's synthesis.
//! Stages that have not produced content yet show a waiting marker
//! while their loading flag is set.

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

use council_core::{aggregate_rankings, AssistantTurn, Message, StageMetadata, Transcript};

/// Shown for a stage that is streaming but has no content yet
const WAITING: &str = "...";

fn header(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
    ))
}

fn model_label(model: &str) -> Span<'static> {
    Span::styled(
        format!("[{model}] "),
        Style::default().fg(Color::Yellow),
    )
}

fn body_lines(text: &str, out: &mut Vec<Line<'static>>) {
    for line in text.lines() {
        out.push(Line::from(format!("  {line}")));
    }
}

/// Render the whole transcript as styled lines.
pub fn transcript_lines(transcript: &Transcript) -> Vec<Line<'static>> {
    let mut out = Vec::new();
    for message in transcript.messages() {
        match message {
            Message::User { content, .. } => {
                out.push(Line::from(vec![
                    Span::styled(
                        "You: ",
                        Style::default()
                            .fg(Color::Cyan)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::from(content.clone()),
                ]));
                out.push(Line::default());
            }
            Message::Assistant { state, .. } => {
                assistant_lines(state, &mut out);
                out.push(Line::default());
            }
        }
    }
    out
}

fn assistant_lines(turn: &AssistantTurn, out: &mut Vec<Line<'static>>) {
    stage1_lines(turn, out);
    stage2_lines(turn, out);
    stage3_lines(turn, out);
}

fn stage1_lines(turn: &AssistantTurn, out: &mut Vec<Line<'static>>) {
    if turn.stage1.is_none() && !turn.loading.stage1 {
        return;
    }
    out.push(header("Stage 1: Drafts"));
    match &turn.stage1 {
        Some(entries) if !entries.is_empty() => {
            for entry in entries {
                out.push(Line::from(vec![model_label(&entry.model)]));
                body_lines(&entry.response, out);
            }
        }
        _ => out.push(Line::from(format!("  {WAITING}"))),
    }
}

fn stage2_lines(turn: &AssistantTurn, out: &mut Vec<Line<'static>>) {
    if turn.stage2.is_none() && !turn.loading.stage2 {
        return;
    }
    out.push(header("Stage 2: Rankings"));
    let metadata = turn.metadata.clone().unwrap_or_default();
    match &turn.stage2 {
        Some(entries) if !entries.is_empty() => {
            for entry in entries {
                out.push(Line::from(vec![model_label(&entry.model)]));
                match &entry.parsed_ranking {
                    Some(labels) if !labels.is_empty() => {
                        for (position, label) in labels.iter().enumerate() {
                            out.push(Line::from(format!(
                                "  {}. {}",
                                position + 1,
                                resolve_label(&metadata, label)
                            )));
                        }
                    }
                    _ => body_lines(&entry.ranking, out),
                }
            }
            aggregate_lines(entries, &metadata, out);
        }
        _ => out.push(Line::from(format!("  {WAITING}"))),
    }
}

fn aggregate_lines(
    entries: &[council_core::Stage2Entry],
    metadata: &StageMetadata,
    out: &mut Vec<Line<'static>>,
) {
    // Prefer the server's aggregate when it sent one.
    let aggregate = match &metadata.aggregate_rankings {
        Some(aggregate) => aggregate.clone(),
        None => aggregate_rankings(entries, metadata),
    };
    if aggregate.is_empty() {
        return;
    }
    out.push(Line::from(Span::styled(
        "Aggregate".to_string(),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    for (position, entry) in aggregate.iter().enumerate() {
        out.push(Line::from(format!(
            "  {}. {} (avg {:.2}, {} votes)",
            position + 1,
            entry.model,
            entry.average_rank,
            entry.rankings_count
        )));
    }
}

fn stage3_lines(turn: &AssistantTurn, out: &mut Vec<Line<'static>>) {
    if turn.stage3.is_none() && !turn.loading.stage3 {
        return;
    }
    out.push(header("Stage 3: Final Answer"));
    match &turn.stage3 {
        Some(result) if !result.response.is_empty() => body_lines(&result.response, out),
        _ => out.push(Line::from(format!("  {WAITING}"))),
    }
}

/// Resolve an anonymized label to its model name, keeping the label as
/// context; unmapped labels pass through untouched.
fn resolve_label(metadata: &StageMetadata, label: &str) -> String {
    match metadata.resolve(label) {
        Some(model) => format!("{model} ({label})"),
        None => label.to_string(),
    }
}

/// Status line text summarizing the in-flight stage, or `None` when idle.
pub fn streaming_status(transcript: &Transcript) -> Option<&'static str> {
    let Some(Message::Assistant { state, .. }) = transcript.last() else {
        return None;
    };
    if state.loading.stage3 {
        Some("Stage 3: synthesizing final answer")
    } else if state.loading.stage2 {
        Some("Stage 2: collecting rankings")
    } else if state.loading.stage1 {
        Some("Stage 1: gathering drafts")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use council_core::{Stage1Entry, Stage2Entry, Stage3Result, StreamEvent, TurnId};
    use pretty_assertions::assert_eq;

    fn text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn texts(lines: &[Line]) -> Vec<String> {
        lines.iter().map(text).collect()
    }

    fn fold_all(transcript: Transcript, events: &[StreamEvent]) -> Transcript {
        events.iter().fold(transcript, |t, e| t.fold(e).0)
    }

    #[test]
    fn test_empty_transcript_renders_nothing() {
        assert!(transcript_lines(&Transcript::default()).is_empty());
    }

    #[test]
    fn test_user_message_has_prefix() {
        let transcript = Transcript::default().push_turn(TurnId::new(), "hello council");
        let lines = transcript_lines(&transcript);
        assert_eq!(text(&lines[0]), "You: hello council");
    }

    #[test]
    fn test_waiting_marker_while_stage1_streams() {
        let transcript = fold_all(
            Transcript::default().push_turn(TurnId::new(), "q"),
            &[StreamEvent::Stage1Start],
        );
        let lines = transcript_lines(&transcript);
        let rendered = texts(&lines);
        assert!(rendered.contains(&"Stage 1: Drafts".to_string()));
        assert!(rendered.contains(&format!("  {WAITING}")));
    }

    #[test]
    fn test_drafts_render_per_model() {
        let transcript = fold_all(
            Transcript::default().push_turn(TurnId::new(), "q"),
            &[
                StreamEvent::Stage1Start,
                StreamEvent::Stage1Chunk {
                    model: "gpt".to_string(),
                    content: "first line\nsecond line".to_string(),
                },
            ],
        );
        let rendered = texts(&transcript_lines(&transcript));
        assert!(rendered.contains(&"[gpt] ".to_string()));
        assert!(rendered.contains(&"  first line".to_string()));
        assert!(rendered.contains(&"  second line".to_string()));
    }

    #[test]
    fn test_parsed_ranking_resolves_labels() {
        let mut metadata = StageMetadata::default();
        metadata
            .label_to_model
            .insert("Response A".to_string(), "claude".to_string());

        let transcript = fold_all(
            Transcript::default().push_turn(TurnId::new(), "q"),
            &[
                StreamEvent::Stage2Start,
                StreamEvent::Stage2Complete {
                    data: vec![Stage2Entry {
                        model: "gpt".to_string(),
                        ranking: "FINAL RANKING:\n1. Response A".to_string(),
                        parsed_ranking: None,
                    }],
                    metadata,
                },
            ],
        );
        let rendered = texts(&transcript_lines(&transcript));
        assert!(rendered.contains(&"  1. claude (Response A)".to_string()));
    }

    #[test]
    fn test_raw_ranking_shown_when_unparsed() {
        let transcript = fold_all(
            Transcript::default().push_turn(TurnId::new(), "q"),
            &[
                StreamEvent::Stage2Start,
                StreamEvent::Stage2Chunk {
                    model: "gpt".to_string(),
                    content: "I think the second answer is strongest".to_string(),
                },
            ],
        );
        let rendered = texts(&transcript_lines(&transcript));
        assert!(rendered.contains(&"  I think the second answer is strongest".to_string()));
    }

    #[test]
    fn test_final_answer_section() {
        let transcript = fold_all(
            Transcript::default().push_turn(TurnId::new(), "q"),
            &[
                StreamEvent::Stage3Start,
                StreamEvent::Stage3Complete {
                    data: Stage3Result {
                        model: "chairman".to_string(),
                        response: "The council agrees.".to_string(),
                    },
                },
            ],
        );
        let rendered = texts(&transcript_lines(&transcript));
        assert!(rendered.contains(&"Stage 3: Final Answer".to_string()));
        assert!(rendered.contains(&"  The council agrees.".to_string()));
    }

    #[test]
    fn test_finished_stage_skips_waiting_marker() {
        let transcript = fold_all(
            Transcript::default().push_turn(TurnId::new(), "q"),
            &[
                StreamEvent::Stage1Start,
                StreamEvent::Stage1Complete {
                    data: vec![Stage1Entry {
                        model: "gpt".to_string(),
                        response: "done".to_string(),
                    }],
                },
            ],
        );
        let rendered = texts(&transcript_lines(&transcript));
        assert!(!rendered.contains(&format!("  {WAITING}")));
    }

    #[test]
    fn test_streaming_status_tracks_latest_stage() {
        let base = Transcript::default().push_turn(TurnId::new(), "q");
        assert_eq!(streaming_status(&base), None);

        let stage1 = fold_all(base.clone(), &[StreamEvent::Stage1Start]);
        assert_eq!(streaming_status(&stage1), Some("Stage 1: gathering drafts"));

        let stage3 = fold_all(
            stage1,
            &[StreamEvent::Stage1Complete { data: Vec::new() }, StreamEvent::Stage3Start],
        );
        assert_eq!(
            streaming_status(&stage3),
            Some("Stage 3: synthesizing final answer")
        );
    }
}
