//! Stage 7: entity-coverage evaluation. Splits a transcript into a prefix
//! and suffix by turn index, compacts the prefix standalone, and measures
//! how much of the suffix's vocabulary the compacted prefix still names.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::config::PipelineConfig;
use crate::entity::Entity;
use crate::entity::EntityIndex;
use crate::entity::EntityType;
use crate::scorer::scorer_for;
use crate::scorer::ScoringContext;
use crate::selector::select;
use crate::turn::Turn;

#[derive(Debug, Clone, PartialEq)]
pub struct EvalReport {
    pub coverage: f64,
    pub per_type: BTreeMap<EntityType, f64>,
    pub unrecoverable: usize,
}

/// Splits `turns` at `ratio` (default 0.70) into a prefix and suffix.
/// `entities` must be aligned 1:1 with `turns` by position.
pub fn evaluate(turns: &[Turn], entities: &[BTreeSet<Entity>], ratio: f64, config: &PipelineConfig) -> EvalReport {
    let split = ((turns.len() as f64) * ratio).round() as usize;
    let split = split.min(turns.len());
    let prefix_turns = &turns[..split];
    let prefix_entities = &entities[..split];
    let suffix_turns = &turns[split..];
    let suffix_entities = &entities[split..];

    let mut prefix_index = EntityIndex::default();
    for (turn, entity_set) in prefix_turns.iter().zip(prefix_entities) {
        for entity in entity_set {
            prefix_index.record(entity.clone(), turn.index);
        }
    }

    let scorer = scorer_for(config.method);
    let ctx = ScoringContext { turns: prefix_turns, entities: prefix_entities, index: &prefix_index, config };
    let (scores, _warnings) = scorer.score(&ctx);
    let selection = select(prefix_turns, &scores, config.budget, config);

    let kept_set: BTreeSet<usize> = selection.kept.iter().copied().collect();
    let e_kept: BTreeSet<Entity> = prefix_turns
        .iter()
        .zip(prefix_entities)
        .filter(|(t, _)| kept_set.contains(&t.index))
        .flat_map(|(_, set)| set.iter().cloned())
        .collect();

    let e_prefix_original: BTreeSet<Entity> = prefix_turns
        .iter()
        .zip(prefix_entities)
        .filter(|(t, _)| t.is_scorable(config.short_threshold))
        .flat_map(|(_, set)| set.iter().cloned())
        .collect();

    let e_future: BTreeSet<Entity> = suffix_turns
        .iter()
        .zip(suffix_entities)
        .filter(|(t, _)| t.is_scorable(config.short_threshold))
        .flat_map(|(_, set)| set.iter().cloned())
        .collect();

    let total_weight: f64 = e_future.iter().map(|e| e.entity_type.weight()).sum();
    let recovered_weight: f64 = e_future.iter().filter(|e| e_kept.contains(e)).map(|e| e.entity_type.weight()).sum();
    let coverage = if total_weight > 0.0 { recovered_weight / total_weight } else { 1.0 };

    let mut per_type = BTreeMap::new();
    for entity_type in [
        EntityType::FilePath,
        EntityType::Error,
        EntityType::Exception,
        EntityType::Url,
        EntityType::Port,
        EntityType::Command,
        EntityType::Package,
        EntityType::HttpStatus,
        EntityType::Function,
        EntityType::ClassName,
        EntityType::EnvVar,
    ] {
        let future_of_type: Vec<&Entity> = e_future.iter().filter(|e| e.entity_type == entity_type).collect();
        if future_of_type.is_empty() {
            continue;
        }
        let total: f64 = future_of_type.iter().map(|e| e.entity_type.weight()).sum();
        let recovered: f64 = future_of_type.iter().filter(|e| e_kept.contains(*e)).map(|e| e.entity_type.weight()).sum();
        per_type.insert(entity_type, recovered / total);
    }

    let unrecoverable = e_prefix_original.difference(&e_kept).count();

    EvalReport { coverage, per_type, unrecoverable }
}
