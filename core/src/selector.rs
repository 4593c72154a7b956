//! Stage 5: pick a budget-bounded subset of turns under pin and recency
//! constraints.

use std::collections::HashMap;

use crate::config::PipelineConfig;
use crate::error::BudgetTooSmallError;
use crate::record::Role;
use crate::scorer::ScoredTurn;
use crate::turn::Turn;
use crate::turn::TurnKind;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionResult {
    /// Kept turn indices, in original transcript order.
    pub kept: Vec<usize>,
    pub kept_tokens: u32,
    pub dropped_scorable: usize,
    /// Set when the hard-pinned set alone exceeds the budget; `kept` then
    /// equals that set exactly and no other turn was considered.
    pub over_budget: Option<BudgetTooSmallError>,
}

/// Turns that must survive regardless of score or budget math: user
/// turns, short system turns, and compaction markers. The most recent
/// scorable system turn gets top priority in the greedy fill below
/// instead of joining this set outright — see `select`'s doc comment for
/// why.
fn is_hard_pinned(turn: &Turn, short_threshold: u32) -> bool {
    turn.role == Role::User
        || (turn.role == Role::System && turn.tokens <= short_threshold)
        || turn.kind == TurnKind::CompactedMarker
}

/// Builds the hard-pin set, checks it against budget, then greedily fills
/// the remainder with the highest recency-adjusted scores that still
/// fit. Pure function of its inputs: no randomness, no hidden state.
///
/// The most recent scorable system turn is always tried first in the
/// greedy fill, ahead of every other candidate regardless of score — but
/// unlike the hard-pinned set, it can still be dropped if it does not
/// fit in what is left of the budget after the hard-pinned set. A
/// transcript with three 200-token user turns, one 600-token scorable
/// turn, and an 1,000-token budget keeps the user turns and drops the
/// system turn once 600 pinned tokens leave only 400 remaining and the
/// system turn's own 600 tokens do not fit.
pub fn select(turns: &[Turn], scores: &[ScoredTurn], budget: u32, config: &PipelineConfig) -> SelectionResult {
    let score_by_index: HashMap<usize, f64> = scores.iter().map(|s| (s.turn_index, s.score)).collect();
    let most_recent_scorable = turns
        .iter()
        .filter(|t| t.is_scorable(config.short_threshold))
        .map(|t| t.index)
        .max();

    let hard_pinned: Vec<usize> = turns
        .iter()
        .filter(|t| is_hard_pinned(t, config.short_threshold))
        .map(|t| t.index)
        .collect();
    let pinned_tokens: u32 = hard_pinned.iter().map(|&i| turns[i].tokens).sum();
    let scorable_count = turns.iter().filter(|t| t.is_scorable(config.short_threshold)).count();

    if pinned_tokens > budget {
        tracing::debug!(pinned_tokens, budget, "pinned set alone exceeds budget");
        return SelectionResult {
            kept: hard_pinned,
            kept_tokens: pinned_tokens,
            dropped_scorable: scorable_count,
            over_budget: Some(BudgetTooSmallError { required_pinned: pinned_tokens, budget }),
        };
    }

    let n = turns.len();
    let mut candidates: Vec<(usize, f64)> = turns
        .iter()
        .filter(|t| t.is_scorable(config.short_threshold))
        .map(|t| {
            let recency = if n > 1 { config.recency_bonus * (t.index as f64 / (n - 1) as f64) } else { 0.0 };
            let base = score_by_index.get(&t.index).copied().unwrap_or(0.0);
            (t.index, base + recency)
        })
        .collect();
    candidates.sort_by(|a, b| match b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal) {
        std::cmp::Ordering::Equal => b.0.cmp(&a.0),
        other => other,
    });
    if let Some(forced) = most_recent_scorable {
        candidates.sort_by_key(|&(i, _)| i != forced);
    }

    let mut remaining = budget - pinned_tokens;
    let mut added: Vec<usize> = Vec::new();
    for (turn_index, _) in candidates {
        let tokens = turns[turn_index].tokens;
        if tokens <= remaining {
            remaining -= tokens;
            added.push(turn_index);
        } else {
            break;
        }
    }

    let mut kept: Vec<usize> = hard_pinned.into_iter().chain(added).collect();
    kept.sort_unstable();
    let kept_tokens: u32 = kept.iter().map(|&i| turns[i].tokens).sum();
    let dropped_scorable = scorable_count - kept.iter().filter(|&&i| turns[i].is_scorable(config.short_threshold)).count();

    tracing::debug!(kept = kept.len(), kept_tokens, dropped_scorable, "selection complete");
    SelectionResult { kept, kept_tokens, dropped_scorable, over_budget: None }
}
