//! Dry-run: a deterministic pseudo-random score seeded by turn index,
//! used to exercise the Selector and Emitter without depending on any
//! particular scoring formula's behavior.

use crate::error::Warning;

use super::ScoredTurn;
use super::Scorer;
use super::ScoringContext;

pub struct DryRunScorer;

impl Scorer for DryRunScorer {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn score(&self, ctx: &ScoringContext<'_>) -> (Vec<ScoredTurn>, Vec<Warning>) {
        let scored = ctx
            .scorable_indices()
            .into_iter()
            .map(|turn_index| ScoredTurn {
                turn_index,
                score: pseudo_random_unit(turn_index),
                breakdown: Vec::new(),
            })
            .collect();
        (scored, Vec::new())
    }
}

/// `splitmix64`-style mix of the turn index into a value in `[0, 1]`.
/// Deterministic across runs and platforms, with no external RNG
/// dependency.
fn pseudo_random_unit(turn_index: usize) -> f64 {
    let mut x = (turn_index as u64).wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^= x >> 31;
    (x >> 11) as f64 / (1u64 << 53) as f64
}
