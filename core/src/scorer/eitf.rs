//! EITF: entity-weighted inverse term frequency with BM25-style turn
//! length normalization.

use crate::error::Warning;

use super::ScoredTurn;
use super::Scorer;
use super::ScoringContext;
use super::min_max_normalize;

pub struct EitfScorer;

impl Scorer for EitfScorer {
    fn name(&self) -> &'static str {
        "eitf"
    }

    fn score(&self, ctx: &ScoringContext<'_>) -> (Vec<ScoredTurn>, Vec<Warning>) {
        let scorable = ctx.scorable_indices();
        let raw = raw_scores(ctx, &scorable);
        let mut scored = min_max_normalize(&raw);
        for s in &mut scored {
            s.breakdown = breakdown(ctx, s.turn_index);
        }
        (scored, Vec::new())
    }
}

/// Computes the un-normalized EITF score for every scorable turn:
/// `raw(t) = sum(weight(type(e)) * ln(1 + N / df(e))) / length_norm(t)`.
fn raw_scores(ctx: &ScoringContext<'_>, scorable: &[usize]) -> Vec<(usize, f64)> {
    let n = scorable.len() as f64;
    let avg_tokens = if scorable.is_empty() {
        1.0
    } else {
        let total: u64 = scorable.iter().map(|&i| u64::from(ctx.turns[i].tokens)).sum();
        (total as f64 / scorable.len() as f64).max(1.0)
    };

    scorable
        .iter()
        .map(|&i| (i, raw_score_for_turn(ctx, i, n, avg_tokens)))
        .collect()
}

fn raw_score_for_turn(ctx: &ScoringContext<'_>, turn_index: usize, n: f64, avg_tokens: f64) -> f64 {
    let turn = &ctx.turns[turn_index];
    let length_norm = ctx.config.eitf_k1 * (1.0 - ctx.config.eitf_b + ctx.config.eitf_b * f64::from(turn.tokens) / avg_tokens) + 1.0;
    let sum: f64 = ctx.entities[turn_index]
        .iter()
        .map(|e| e.entity_type.weight() * (1.0 + n / ctx.index.df(e) as f64).ln())
        .sum();
    sum / length_norm
}

fn breakdown(ctx: &ScoringContext<'_>, turn_index: usize) -> Vec<(crate::entity::Entity, f64)> {
    let n = ctx.scorable_indices().len() as f64;
    let mut contributions: Vec<_> = ctx.entities[turn_index]
        .iter()
        .map(|e| {
            let term = e.entity_type.weight() * (1.0 + n / ctx.index.df(e) as f64).ln();
            (e.clone(), term)
        })
        .collect();
    contributions.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    contributions.truncate(3);
    contributions
}
