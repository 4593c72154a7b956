//! Dedup: scores each turn by how much of its text introduces content not
//! seen earlier in the transcript, via a single suffix automaton built
//! over the concatenation of every scorable turn's text.

use std::collections::HashMap;

use crate::error::Warning;

use super::ScoredTurn;
use super::Scorer;
use super::ScoringContext;
use super::min_max_normalize;

/// Turns separated by this sentinel when concatenated for the automaton.
/// Rollout text is JSON-decoded UTF-8 and never contains a raw NUL byte.
const SENTINEL: char = '\u{0}';
/// `first_turn` used for sentinel characters; never looked up afterward.
const NO_TURN: usize = usize::MAX;

pub struct DedupScorer;

impl Scorer for DedupScorer {
    fn name(&self) -> &'static str {
        "dedup"
    }

    fn score(&self, ctx: &ScoringContext<'_>) -> (Vec<ScoredTurn>, Vec<Warning>) {
        let scorable = ctx.scorable_indices();
        let total_chars: usize = scorable.iter().map(|&i| ctx.turns[i].text.chars().count()).sum();

        if total_chars > ctx.config.dedup_size_gate_chars {
            let scored = scorable
                .iter()
                .map(|&i| ScoredTurn { turn_index: i, score: 0.0, breakdown: Vec::new() })
                .collect();
            return (
                scored,
                vec![Warning::DedupSizeGateExceeded { chars: total_chars }],
            );
        }

        let mut automaton = SuffixAutomaton::new();
        for &turn_index in &scorable {
            for c in ctx.turns[turn_index].text.chars() {
                automaton.extend(c, turn_index);
            }
            automaton.extend(SENTINEL, NO_TURN);
        }

        let unique_chars = automaton.unique_chars_per_turn(ctx.config.min_repeat_len);
        let raw: Vec<(usize, f64)> = scorable
            .iter()
            .map(|&i| {
                let len = ctx.turns[i].text.chars().count();
                let score = if len == 0 {
                    0.0
                } else {
                    *unique_chars.get(&i).unwrap_or(&0) as f64 / len as f64
                };
                (i, score)
            })
            .collect();

        let scored = min_max_normalize(&raw);
        (scored, Vec::new())
    }
}

#[derive(Debug, Clone)]
struct SamState {
    len: usize,
    link: Option<usize>,
    transitions: HashMap<char, usize>,
    is_clone: bool,
    first_turn: usize,
    /// Characters consumed since the last sentinel, at the point this
    /// state was created. Bounds `len` so a match that only exists
    /// because it reaches back across a turn boundary (two turns sharing
    /// identical text right after the sentinel) never credits characters
    /// the turn didn't actually introduce itself.
    local_pos: usize,
}

/// Online Blumer-style suffix automaton. `first_turn` on a freshly created
/// (non-clone) state records which turn's character created it; clone
/// states split an existing equivalence class and never introduce new
/// content, so they never contribute to a turn's unique-character count.
struct SuffixAutomaton {
    states: Vec<SamState>,
    last: usize,
    since_sentinel: usize,
}

impl SuffixAutomaton {
    fn new() -> Self {
        let root = SamState {
            len: 0,
            link: None,
            transitions: HashMap::new(),
            is_clone: false,
            first_turn: NO_TURN,
            local_pos: 0,
        };
        Self { states: vec![root], last: 0, since_sentinel: 0 }
    }

    fn extend(&mut self, c: char, turn_index: usize) {
        self.since_sentinel = if c == SENTINEL { 0 } else { self.since_sentinel + 1 };
        let local_pos = self.since_sentinel;

        let cur = self.states.len();
        self.states.push(SamState {
            len: self.states[self.last].len + 1,
            link: None,
            transitions: HashMap::new(),
            is_clone: false,
            first_turn: turn_index,
            local_pos,
        });

        let mut p = Some(self.last);
        while let Some(pi) = p {
            if self.states[pi].transitions.contains_key(&c) {
                break;
            }
            self.states[pi].transitions.insert(c, cur);
            p = self.states[pi].link;
        }

        match p {
            None => {
                self.states[cur].link = Some(0);
            }
            Some(pi) => {
                let q = self.states[pi].transitions[&c];
                if self.states[pi].len + 1 == self.states[q].len {
                    self.states[cur].link = Some(q);
                } else {
                    let clone_index = self.states.len();
                    let mut cloned = self.states[q].clone();
                    cloned.len = self.states[pi].len + 1;
                    cloned.is_clone = true;
                    self.states.push(cloned);

                    let mut walker = Some(pi);
                    while let Some(wi) = walker {
                        if self.states[wi].transitions.get(&c) == Some(&q) {
                            self.states[wi].transitions.insert(c, clone_index);
                            walker = self.states[wi].link;
                        } else {
                            break;
                        }
                    }
                    self.states[q].link = Some(clone_index);
                    self.states[cur].link = Some(clone_index);
                }
            }
        }
        self.last = cur;
    }

    /// For every genuinely new state, credits `len - max(link_len,
    /// min_repeat_len - 1)` characters to the turn that created it.
    /// Flooring at `min_repeat_len` means matches shorter than it never
    /// suppress a turn's credit, matching short incidental repeats (a
    /// shared word, a common path prefix) being treated as noise rather
    /// than letting them make a turn look like a duplicate.
    ///
    /// Both `len` and `link_len` are capped at `local_pos` first: a
    /// string longer than the characters seen since the last sentinel
    /// can only be "long" because it reaches back through the sentinel
    /// into an earlier turn's text, which is an artifact of concatenation
    /// rather than content this turn actually introduced.
    fn unique_chars_per_turn(&self, min_repeat_len: usize) -> HashMap<usize, u64> {
        let mut credits: HashMap<usize, u64> = HashMap::new();
        let floor = min_repeat_len.saturating_sub(1);
        for state in &self.states[1..] {
            if state.is_clone {
                continue;
            }
            let link_len = state.link.map_or(0, |l| self.states[l].len);
            let capped_len = state.len.min(state.local_pos);
            let bound = link_len.min(state.local_pos).max(floor);
            if capped_len > bound {
                *credits.entry(state.first_turn).or_default() += (capped_len - bound) as u64;
            }
        }
        credits
    }
}
