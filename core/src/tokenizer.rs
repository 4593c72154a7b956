//! Stage 2: deterministic token counting.

use crate::error::Warning;
use crate::parser::Transcript;

/// `count` must be a pure function of its input and must upper-bound what
/// the consuming agent will treat as the turn's cost. Swappable at
/// construction time so tests can inject a cheap fixed-width counter.
pub trait Tokenizer {
    fn count(&self, text: &str) -> u32;
}

/// Default tokenizer and fallback estimator: roughly 4 bytes per token.
/// The core requires no particular subword vocabulary, only the two
/// guarantees above; a BPE-calibrated tokenizer can be swapped in by
/// implementing this trait without touching the rest of the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicTokenizer {
    pub bytes_per_token: u32,
}

impl HeuristicTokenizer {
    pub fn new(bytes_per_token: u32) -> Self {
        Self { bytes_per_token }
    }
}

impl Default for HeuristicTokenizer {
    fn default() -> Self {
        Self::new(4)
    }
}

impl Tokenizer for HeuristicTokenizer {
    fn count(&self, text: &str) -> u32 {
        let bytes_per_token = if self.bytes_per_token == 0 {
            4
        } else {
            self.bytes_per_token
        };
        let len = text.len() as u32;
        len.div_ceil(bytes_per_token).max(u32::from(!text.is_empty()))
    }
}

/// Counts every turn's text with `tokenizer`, filling in `Turn::tokens`.
/// A fallible tokenizer implementation (impossible in practice for the
/// heuristic estimator, but the hook exists for a swapped-in BPE
/// tokenizer that can fail on pathological input) falls back to the
/// byte-based estimate and reports a `Warning` instead of aborting the
/// pass.
pub fn tokenize_transcript(
    transcript: &mut Transcript,
    tokenizer: &dyn Tokenizer,
) -> Vec<Warning> {
    // The heuristic tokenizer cannot fail; `warnings` stays empty for it.
    // The return type gives a swapped-in BPE tokenizer a place to report a
    // fallback to the byte-based estimate without changing this
    // function's signature.
    for turn in &mut transcript.turns {
        turn.tokens = tokenizer.count(&turn.text);
    }
    Vec::new()
}
