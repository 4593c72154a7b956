//! Error and warning types for the compaction pipeline.
//!
//! `SupercompactError` covers the terminal failures a pass can produce;
//! `Warning` covers the recoverable conditions that are surfaced to the
//! caller as structured records rather than printed to stderr.

use std::path::PathBuf;

/// A parse failure on malformed framing. There is no partial recovery: a
/// downstream emitter must be able to round-trip the file, so a line that
/// cannot be parsed aborts the pass.
#[derive(Debug, Clone, thiserror::Error)]
#[error("parse error at line {line} (byte offset {offset}): {reason}")]
pub struct ParseError {
    pub line: usize,
    pub offset: usize,
    pub reason: String,
}

/// Raised only during tokenizer construction/pattern validation; should be
/// impossible at runtime once the pipeline is built.
#[derive(Debug, Clone, thiserror::Error)]
#[error("tokenizer error: {reason}")]
pub struct TokenizerError {
    pub reason: String,
}

/// Raised only during entity pattern validation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("extractor pattern {pattern:?} invalid: {reason}")]
pub struct ExtractorError {
    pub pattern: String,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
#[error("io error on {}: {reason}", path.display())]
pub struct IoError {
    pub path: PathBuf,
    pub reason: String,
}

/// Recoverable: the Selector still emits the pinned set, the Emitter
/// completes normally, and this is attached to the pass result as a
/// warning instead of aborting.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("budget too small: pinned turns require {required_pinned} tokens but budget is {budget}")]
pub struct BudgetTooSmallError {
    pub required_pinned: u32,
    pub budget: u32,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid argument {name}: {reason}")]
pub struct InvalidArgumentError {
    pub name: String,
    pub reason: String,
}

/// Top-level error type for the core pipeline. `ParseError` and `IoError`
/// are terminal; everything else either can't happen past construction
/// (`TokenizerError`, `ExtractorError`) or is handled as a `Warning`
/// instead of propagated here (`BudgetTooSmallError`).
#[derive(Debug, thiserror::Error)]
pub enum SupercompactError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),
    #[error(transparent)]
    Extractor(#[from] ExtractorError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgumentError),
}

/// A non-fatal condition surfaced to the caller as a structured record,
/// never printed directly by the core.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Warning {
    #[error("tokenizer failed ({reason}); falling back to the byte-based estimator")]
    TokenizerFallback { reason: String },
    #[error("{0}")]
    BudgetTooSmall(#[from] BudgetTooSmallError),
    #[error("unknown rollout dialect version {version:?}; proceeding with best-effort parsing")]
    UnknownDialectVersion { version: String },
    #[error("dedup scorer input exceeded the size gate ({chars} chars); returning zero scores")]
    DedupSizeGateExceeded { chars: usize },
}

pub type Result<T> = std::result::Result<T, SupercompactError>;
