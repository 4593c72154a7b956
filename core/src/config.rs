//! Explicit configuration threaded through every pipeline stage. There is
//! no global mutable state: every tunable, including the recency bonus
//! and the SetCover exclusivity bonus, lives here with its documented
//! default.

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    Eitf,
    SetCover,
    Dedup,
    DryRun,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Eitf => "eitf",
            Method::SetCover => "setcover",
            Method::Dedup => "dedup",
            Method::DryRun => "dry-run",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    Rollout,
    Summary,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub method: Method,
    pub budget: u32,
    pub format: OutputFormat,
    /// System turns at or below this many tokens are always pinned and
    /// excluded from scoring.
    pub short_threshold: u32,
    /// Suppresses matches shorter than this from contributing to "seen"
    /// state in the Dedup scorer.
    pub min_repeat_len: usize,
    /// BM25-style length-normalization constants for EITF.
    pub eitf_k1: f64,
    pub eitf_b: f64,
    /// Additive bonus per rare entity in SetCover, and the document
    /// frequency at or below which an entity counts as rare.
    pub setcover_bonus: f64,
    pub setcover_rare_df_max: usize,
    /// Additive, not multiplicative, recency weight in the Selector's
    /// adjusted score.
    pub recency_bonus: f64,
    /// Above this many total characters across scorable turns, the Dedup
    /// scorer skips building the suffix automaton and returns zero scores
    /// with a warning instead.
    pub dedup_size_gate_chars: usize,
    pub verbose: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            method: Method::Eitf,
            budget: 80_000,
            format: OutputFormat::Rollout,
            short_threshold: 300,
            min_repeat_len: 64,
            eitf_k1: 1.5,
            eitf_b: 0.75,
            setcover_bonus: 0.20,
            setcover_rare_df_max: 2,
            recency_bonus: 0.15,
            dedup_size_gate_chars: 5_000_000,
            verbose: false,
        }
    }
}
