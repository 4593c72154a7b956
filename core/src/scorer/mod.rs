//! Scorer family: pluggable turn-relevance scoring.
//!
//! Every method shares the same contract — consume the parsed transcript
//! plus the global entity index, produce one normalized score in `[0, 1]`
//! per scorable turn — so the Selector never needs to know which method
//! produced its input.

mod dedup;
mod dry_run;
mod eitf;
mod setcover;

use std::collections::BTreeSet;

use crate::config::Method;
use crate::config::PipelineConfig;
use crate::entity::Entity;
use crate::entity::EntityIndex;
use crate::error::Warning;
use crate::turn::Turn;

/// One turn's score, plus the top contributing entities for `--verbose`
/// rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTurn {
    pub turn_index: usize,
    pub score: f64,
    /// Highest-weighted-contribution entities first. Empty for scorers
    /// (Dry-run) that have no per-entity breakdown to offer.
    pub breakdown: Vec<(Entity, f64)>,
}

/// Everything a `Scorer` needs, computed once per pass and shared by
/// every method a caller might run.
pub struct ScoringContext<'a> {
    /// Every turn in the transcript, in original order. Non-scorable
    /// turns are present so entity statistics can see their text too.
    pub turns: &'a [Turn],
    /// Per-turn entity sets, same length and index alignment as `turns`.
    pub entities: &'a [BTreeSet<Entity>],
    pub index: &'a EntityIndex,
    pub config: &'a PipelineConfig,
}

impl ScoringContext<'_> {
    fn scorable_indices(&self) -> Vec<usize> {
        self.turns
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_scorable(self.config.short_threshold))
            .map(|(i, _)| i)
            .collect()
    }
}

pub trait Scorer {
    fn name(&self) -> &'static str;
    fn score(&self, ctx: &ScoringContext<'_>) -> (Vec<ScoredTurn>, Vec<Warning>);
}

pub fn scorer_for(method: Method) -> Box<dyn Scorer> {
    match method {
        Method::Eitf => Box::new(eitf::EitfScorer),
        Method::SetCover => Box::new(setcover::SetCoverScorer),
        Method::Dedup => Box::new(dedup::DedupScorer),
        Method::DryRun => Box::new(dry_run::DryRunScorer),
    }
}

/// Min-max normalizes `raw` into `[0, 1]`. When every value is equal (the
/// degenerate case where the transcript carries no distinguishing
/// signal), turns with a non-zero raw score are treated as maximally
/// relevant and turns with a zero raw score as baseline — there is no
/// information to rank them by, so ties stay ties.
fn min_max_normalize(raw: &[(usize, f64)]) -> Vec<ScoredTurn> {
    let min = raw.iter().map(|&(_, v)| v).fold(f64::INFINITY, f64::min);
    let max = raw.iter().map(|&(_, v)| v).fold(f64::NEG_INFINITY, f64::max);
    raw.iter()
        .map(|&(turn_index, value)| {
            let score = if raw.is_empty() {
                0.0
            } else if (max - min).abs() < f64::EPSILON {
                f64::from(value > 0.0)
            } else {
                (value - min) / (max - min)
            };
            ScoredTurn {
                turn_index,
                score,
                breakdown: Vec::new(),
            }
        })
        .collect()
}
