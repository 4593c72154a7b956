//! Scoring-and-selection pipeline for compacting AI-coding-agent
//! conversation transcripts under a token budget: parse a rollout log
//! into turns, extract weighted technical entities, score each scorable
//! turn by one of several methods, select a budget-bounded subset under
//! pin and recency constraints, and re-emit the transcript (or a summary
//! of it) with framing bytes preserved.

pub mod config;
pub mod emitter;
pub mod entity;
pub mod error;
pub mod eval_harness;
pub mod parser;
pub mod record;
pub mod scorer;
pub mod selector;
pub mod tokenizer;
pub mod turn;

pub use config::Method;
pub use config::OutputFormat;
pub use config::PipelineConfig;
pub use emitter::emit_rollout;
pub use emitter::emit_summary;
pub use entity::Entity;
pub use entity::EntityIndex;
pub use entity::EntityType;
pub use entity::extract_entities;
pub use error::BudgetTooSmallError;
pub use error::SupercompactError;
pub use error::Warning;
pub use eval_harness::EvalReport;
pub use eval_harness::evaluate;
pub use parser::Parser;
pub use parser::Transcript;
pub use record::CompactedMarker;
pub use record::Record;
pub use record::Role;
pub use scorer::ScoredTurn;
pub use scorer::Scorer;
pub use scorer::ScoringContext;
pub use scorer::scorer_for;
pub use selector::SelectionResult;
pub use selector::select;
pub use tokenizer::HeuristicTokenizer;
pub use tokenizer::Tokenizer;
pub use tokenizer::tokenize_transcript;
pub use turn::Turn;
pub use turn::TurnKind;

use std::collections::BTreeSet;

/// The caller-facing result of one full Parser→Selector pass: which turn
/// indices survived, every non-fatal condition raised along the way, and
/// whether the hard-pinned set alone exceeded the budget. Mirrors the
/// teacher's split between a typed result and stderr-only diagnostics —
/// nothing in here is ever printed by the core itself.
#[derive(Debug, Clone, PartialEq)]
pub struct PassOutcome {
    pub kept: Vec<usize>,
    pub warnings: Vec<Warning>,
    pub over_budget: Option<BudgetTooSmallError>,
}

/// Runs Stage 2 through Stage 5 (Tokenizer → EntityExtractor → Scorer →
/// Selector) over an already-parsed transcript. Stage 1 (`Parser::parse`)
/// and Stage 6 (`emit_rollout`/`emit_summary`) stay with the caller since
/// they own the `Read`/`Write` handles.
///
/// Returns the [`PassOutcome`] alongside the full [`SelectionResult`] (for
/// token accounting the outcome itself doesn't carry) and the per-turn
/// [`ScoredTurn`] breakdown (for `--verbose` rendering and the scores CSV).
pub fn run_pass(
    transcript: &mut Transcript,
    tokenizer: &dyn Tokenizer,
    config: &PipelineConfig,
) -> (PassOutcome, SelectionResult, Vec<ScoredTurn>) {
    let mut warnings = transcript.warnings.clone();
    warnings.extend(tokenize_transcript(transcript, tokenizer));
    let (entities, index) = build_entity_index(&transcript.turns);

    let scorer = scorer_for(config.method);
    let ctx = ScoringContext { turns: &transcript.turns, entities: &entities, index: &index, config };
    let (scores, scorer_warnings) = scorer.score(&ctx);
    warnings.extend(scorer_warnings);

    let selection = select(&transcript.turns, &scores, config.budget, config);
    if let Some(err) = selection.over_budget {
        warnings.push(Warning::BudgetTooSmall(err));
    }

    let outcome = PassOutcome { kept: selection.kept.clone(), warnings, over_budget: selection.over_budget };
    (outcome, selection, scores)
}

/// Runs Stage 3 (EntityExtractor) and Stage 3.5 (global index build) over
/// every turn in a transcript, in the shape every scorer and the eval
/// harness expects: a `Vec<BTreeSet<Entity>>` aligned by position with
/// `transcript.turns`, plus the index built from it.
pub fn build_entity_index(turns: &[Turn]) -> (Vec<BTreeSet<Entity>>, EntityIndex) {
    let entities: Vec<BTreeSet<Entity>> = turns.iter().map(|t| extract_entities(&t.text)).collect();
    let mut index = EntityIndex::default();
    for (turn, set) in turns.iter().zip(&entities) {
        for entity in set {
            index.record(entity.clone(), turn.index);
        }
    }
    (entities, index)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::io::Cursor;

    #[test]
    fn end_to_end_small_transcript_round_trips_within_budget() {
        let input = concat!(
            "{\"type\":\"session_meta\",\"id\":\"s1\",\"version\":1}\n",
            "{\"type\":\"response_item\",\"role\":\"user\",\"kind\":\"message\",\"content\":[{\"type\":\"input_text\",\"text\":\"look at src/lib.rs\"}]}\n",
            "{\"type\":\"response_item\",\"role\":\"assistant\",\"kind\":\"message\",\"content\":[{\"type\":\"output_text\",\"text\":\"src/lib.rs has a TypeError on line 10\"}]}\n",
        );

        let transcript = Parser::new().parse(Cursor::new(input)).expect("parse");
        let mut transcript = transcript;
        tokenize_transcript(&mut transcript, &HeuristicTokenizer::default());
        let (entities, index) = build_entity_index(&transcript.turns);

        let config = PipelineConfig::default();
        let scorer = scorer_for(config.method);
        let ctx = ScoringContext { turns: &transcript.turns, entities: &entities, index: &index, config: &config };
        let (scores, warnings) = scorer.score(&ctx);
        assert!(warnings.is_empty());

        let selection = select(&transcript.turns, &scores, config.budget, &config);
        assert!(selection.over_budget.is_none());
        assert!(selection.kept.contains(&0));

        let marker = CompactedMarker {
            method: Some(config.method.as_str().to_string()),
            budget: Some(config.budget),
            kept_turns: Some(selection.kept.len() as u32),
            dropped_turns: Some((transcript.turns.len() - selection.kept.len()) as u32),
            kept_tokens: Some(selection.kept_tokens),
            elapsed_ms: Some(0),
            extra: Default::default(),
        };
        let mut out = Vec::new();
        emit_rollout(&transcript, &selection.kept, &marker, &mut out).expect("emit");
        let rendered = String::from_utf8(out).expect("utf8");
        assert!(rendered.contains("\"type\":\"compacted\""));
    }
}
