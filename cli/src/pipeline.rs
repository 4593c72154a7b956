//! Wires the core pipeline stages together for the `compact` binary: read
//! the input file, run Parser → Tokenizer → EntityExtractor → Scorer →
//! Selector → Emitter, and optionally write a scores CSV and verbose
//! trace.

use std::fs::File;
use std::io::BufReader;
use std::io::Write as _;
use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use supercompact_core::CompactedMarker;
use supercompact_core::HeuristicTokenizer;
use supercompact_core::OutputFormat;
use supercompact_core::Parser as TranscriptParser;
use supercompact_core::PipelineConfig;
use supercompact_core::SupercompactError;
use supercompact_core::Warning;
use supercompact_core::emit_rollout;
use supercompact_core::emit_summary;
use supercompact_core::run_pass;
use tracing::debug;
use tracing::info;
use tracing::warn;

pub struct RunRequest<'a> {
    pub input: &'a Path,
    pub output: Option<&'a Path>,
    pub scores_file: Option<&'a Path>,
    pub config: PipelineConfig,
}

pub struct RunReport {
    pub over_budget: bool,
}

pub fn run(req: &RunRequest<'_>) -> Result<RunReport, SupercompactError> {
    let started = Instant::now();
    let file = File::open(req.input).map_err(|err| {
        SupercompactError::Io(supercompact_core::error::IoError {
            path: req.input.to_path_buf(),
            reason: err.to_string(),
        })
    })?;
    let reader = BufReader::new(file);

    let mut transcript = TranscriptParser::new().parse(reader)?;
    info!(records = transcript.records.len(), "parsed rollout log");

    let (outcome, selection, scores) =
        run_pass(&mut transcript, &HeuristicTokenizer::default(), &req.config);
    debug!(kept = outcome.kept.len(), warnings = outcome.warnings.len(), "ran scoring pass");

    let over_budget = selection.over_budget.is_some();
    if let Some(err) = &selection.over_budget {
        warn!(required = err.required_pinned, budget = err.budget, "pinned set exceeds budget");
    }

    for warning in &outcome.warnings {
        render_warning(warning);
    }

    if req.config.verbose {
        render_verbose(&transcript, &scores);
    }

    let marker = CompactedMarker {
        method: Some(req.config.method.as_str().to_string()),
        budget: Some(req.config.budget),
        kept_turns: Some(selection.kept.len() as u32),
        dropped_turns: Some((transcript.turns.len() - selection.kept.len()) as u32),
        kept_tokens: Some(selection.kept_tokens),
        elapsed_ms: Some(started.elapsed().as_millis() as u64),
        extra: Default::default(),
    };

    write_output(req, &transcript, &selection.kept, &scores, &marker)?;

    if let Some(path) = req.scores_file {
        write_scores_csv(path, &transcript, &scores, &selection.kept)?;
    }

    Ok(RunReport { over_budget })
}

fn write_output(
    req: &RunRequest<'_>,
    transcript: &supercompact_core::Transcript,
    kept: &[usize],
    scores: &[supercompact_core::ScoredTurn],
    marker: &CompactedMarker,
) -> Result<(), SupercompactError> {
    let mut buffer = Vec::new();
    match req.config.format {
        OutputFormat::Rollout => emit_rollout(transcript, kept, marker, &mut buffer)?,
        OutputFormat::Summary => {
            let score_by_index: std::collections::HashMap<usize, f64> =
                scores.iter().map(|s| (s.turn_index, s.score)).collect();
            emit_summary(transcript, kept, &score_by_index, &mut buffer)?;
        }
    }

    match req.output {
        Some(path) => {
            std::fs::write(path, &buffer).map_err(|err| {
                SupercompactError::Io(supercompact_core::error::IoError {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                })
            })?;
        }
        None => {
            std::io::stdout().write_all(&buffer).map_err(|err| {
                SupercompactError::Io(supercompact_core::error::IoError {
                    path: "<stdout>".into(),
                    reason: err.to_string(),
                })
            })?;
        }
    }
    Ok(())
}

fn write_scores_csv(
    path: &Path,
    transcript: &supercompact_core::Transcript,
    scores: &[supercompact_core::ScoredTurn],
    kept: &[usize],
) -> Result<(), SupercompactError> {
    let score_by_index: std::collections::HashMap<usize, f64> =
        scores.iter().map(|s| (s.turn_index, s.score)).collect();
    let kept_set: std::collections::HashSet<usize> = kept.iter().copied().collect();

    let mut writer = csv::Writer::from_path(path).map_err(|err| {
        SupercompactError::Io(supercompact_core::error::IoError { path: path.to_path_buf(), reason: err.to_string() })
    })?;
    writer
        .write_record(["turn_index", "role", "tokens", "score", "kept"])
        .map_err(|err| {
            SupercompactError::Io(supercompact_core::error::IoError { path: path.to_path_buf(), reason: err.to_string() })
        })?;
    for turn in &transcript.turns {
        let score = score_by_index.get(&turn.index).copied().unwrap_or(0.0);
        writer
            .write_record([
                turn.index.to_string(),
                turn.role.as_str().to_string(),
                turn.tokens.to_string(),
                format!("{score:.6}"),
                kept_set.contains(&turn.index).to_string(),
            ])
            .map_err(|err| {
                SupercompactError::Io(supercompact_core::error::IoError { path: path.to_path_buf(), reason: err.to_string() })
            })?;
    }
    writer.flush().context("flushing scores CSV").map_err(|err| {
        SupercompactError::Io(supercompact_core::error::IoError { path: path.to_path_buf(), reason: err.to_string() })
    })?;
    Ok(())
}

fn render_warning(warning: &Warning) {
    eprintln!("warning: {warning}");
}

fn render_verbose(transcript: &supercompact_core::Transcript, scores: &[supercompact_core::ScoredTurn]) {
    for scored in scores {
        let turn = &transcript.turns[scored.turn_index];
        let top: Vec<String> = scored
            .breakdown
            .iter()
            .map(|(entity, weight)| format!("{}:{} ({weight:.2})", entity.entity_type.as_str(), entity.surface))
            .collect();
        eprintln!(
            "turn {} | role {} | tokens {} | score {:.3} | top: {}",
            turn.index,
            turn.role.as_str(),
            turn.tokens,
            scored.score,
            top.join(", ")
        );
    }
}
