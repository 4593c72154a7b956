//! SetCover: EITF plus an additive bonus for turns holding rare, barely
//! duplicated entities, so the Selector is pushed toward covering more of
//! the technical surface rather than piling relevance onto a few turns.

use crate::entity::Entity;
use crate::error::Warning;

use super::ScoredTurn;
use super::Scorer;
use super::ScoringContext;
use super::min_max_normalize;

pub struct SetCoverScorer;

impl Scorer for SetCoverScorer {
    fn name(&self) -> &'static str {
        "setcover"
    }

    fn score(&self, ctx: &ScoringContext<'_>) -> (Vec<ScoredTurn>, Vec<Warning>) {
        let scorable = ctx.scorable_indices();
        let n = scorable.len() as f64;
        let avg_tokens = if scorable.is_empty() {
            1.0
        } else {
            let total: u64 = scorable.iter().map(|&i| u64::from(ctx.turns[i].tokens)).sum();
            (total as f64 / scorable.len() as f64).max(1.0)
        };

        let raw: Vec<(usize, f64)> = scorable
            .iter()
            .map(|&i| {
                let baseline = eitf_raw(ctx, i, n, avg_tokens);
                let bonus = rarity_bonus(ctx, i);
                (i, (baseline + bonus).min(2.0 * baseline.max(f64::EPSILON)))
            })
            .collect();

        let mut scored = min_max_normalize(&raw);
        for s in &mut scored {
            s.breakdown = breakdown(ctx, s.turn_index);
        }
        (scored, Vec::new())
    }
}

fn eitf_raw(ctx: &ScoringContext<'_>, turn_index: usize, n: f64, avg_tokens: f64) -> f64 {
    let turn = &ctx.turns[turn_index];
    let length_norm = ctx.config.eitf_k1 * (1.0 - ctx.config.eitf_b + ctx.config.eitf_b * f64::from(turn.tokens) / avg_tokens) + 1.0;
    let sum: f64 = ctx.entities[turn_index]
        .iter()
        .map(|e| e.entity_type.weight() * (1.0 + n / ctx.index.df(e) as f64).ln())
        .sum();
    sum / length_norm
}

fn rarity_bonus(ctx: &ScoringContext<'_>, turn_index: usize) -> f64 {
    ctx.entities[turn_index]
        .iter()
        .filter(|e| ctx.index.df(e) <= ctx.config.setcover_rare_df_max)
        .map(|e| ctx.config.setcover_bonus * e.entity_type.weight())
        .sum()
}

fn breakdown(ctx: &ScoringContext<'_>, turn_index: usize) -> Vec<(Entity, f64)> {
    let n = ctx.scorable_indices().len() as f64;
    let mut contributions: Vec<_> = ctx.entities[turn_index]
        .iter()
        .map(|e| {
            let mut term = e.entity_type.weight() * (1.0 + n / ctx.index.df(e) as f64).ln();
            if ctx.index.df(e) <= ctx.config.setcover_rare_df_max {
                term += ctx.config.setcover_bonus * e.entity_type.weight();
            }
            (e.clone(), term)
        })
        .collect();
    contributions.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    contributions.truncate(3);
    contributions
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::PipelineConfig;
    use crate::entity::EntityIndex;
    use crate::entity::EntityType;
    use crate::record::Role;
    use crate::turn::Turn;
    use crate::turn::TurnKind;
    use std::collections::BTreeSet;

    fn turn(index: usize, tokens: u32) -> Turn {
        Turn {
            index,
            role: Role::System,
            text: String::new(),
            tokens,
            record_indices: vec![index],
            turn_context_record_index: None,
            kind: TurnKind::Normal,
        }
    }

    #[test]
    fn turn_with_unique_entity_outscores_turn_with_shared_entity() {
        let turns = vec![turn(0, 400), turn(1, 400), turn(2, 400)];
        let shared = Entity { entity_type: EntityType::FilePath, surface: "src/lib.rs".into() };
        let unique = Entity { entity_type: EntityType::FilePath, surface: "src/rare.rs".into() };

        let mut index = EntityIndex::default();
        index.record(shared.clone(), 0);
        index.record(shared.clone(), 1);
        index.record(unique.clone(), 2);

        let entities = vec![
            BTreeSet::from([shared.clone()]),
            BTreeSet::from([shared]),
            BTreeSet::from([unique]),
        ];
        let config = PipelineConfig::default();
        let ctx = ScoringContext { turns: &turns, entities: &entities, index: &index, config: &config };
        let (scored, _) = SetCoverScorer.score(&ctx);
        let s2 = scored.iter().find(|s| s.turn_index == 2).unwrap().score;
        let s0 = scored.iter().find(|s| s.turn_index == 0).unwrap().score;
        assert!(s2 >= s0);
    }

    #[test]
    fn bonus_never_more_than_doubles_baseline() {
        let turns = vec![turn(0, 400)];
        let rare = Entity { entity_type: EntityType::EnvVar, surface: "database_url".into() };
        let mut index = EntityIndex::default();
        index.record(rare.clone(), 0);
        let entities = vec![BTreeSet::from([rare])];
        let mut config = PipelineConfig::default();
        config.setcover_bonus = 100.0; // pathologically large, to exercise the cap
        let ctx = ScoringContext { turns: &turns, entities: &entities, index: &index, config: &config };
        let (scored, _) = SetCoverScorer.score(&ctx);
        // Single scorable turn normalizes to 1.0 regardless of raw magnitude;
        // the cap is exercised inside raw-score computation, not visible
        // post-normalization with only one turn, so assert no panic/NaN.
        assert!(scored[0].score.is_finite());
    }
}
