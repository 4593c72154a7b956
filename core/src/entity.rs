//! Stage 3: entity extraction.
//!
//! One compiled `regex::Regex` per entity type, built once into a
//! `OnceLock` and shared read-only across every scorer run. `regex` is the
//! ecosystem choice here rather than a hand-rolled Aho-Corasick automaton
//! — see DESIGN.md.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    FilePath,
    Error,
    Exception,
    Url,
    Port,
    Command,
    Package,
    HttpStatus,
    Function,
    ClassName,
    EnvVar,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::FilePath => "file_path",
            EntityType::Error => "error",
            EntityType::Exception => "exception",
            EntityType::Url => "url",
            EntityType::Port => "port",
            EntityType::Command => "command",
            EntityType::Package => "package",
            EntityType::HttpStatus => "http_status",
            EntityType::Function => "function",
            EntityType::ClassName => "class_name",
            EntityType::EnvVar => "env_var",
        }
    }

    /// Fixed weight for this type, used by every scorer. Also, by default,
    /// the priority order extraction resolves overlapping matches with:
    /// higher-weight types claim a span of text first, so a token cannot
    /// be double counted as two different entity types.
    pub fn weight(self) -> f64 {
        match self {
            EntityType::FilePath => 1.00,
            EntityType::Error => 1.00,
            EntityType::Exception => 0.90,
            EntityType::Url => 0.80,
            EntityType::Port => 0.80,
            EntityType::Command => 0.70,
            EntityType::Package => 0.70,
            EntityType::HttpStatus => 0.60,
            EntityType::Function => 0.50,
            EntityType::ClassName => 0.40,
            EntityType::EnvVar => 0.40,
        }
    }

    /// Priority order used to resolve overlapping matches during
    /// extraction: earlier entries claim a span of text first, so the
    /// same token is never double-counted under two types. Mostly
    /// descending weight order, except `env_var` is tried before
    /// `class_name` (same 0.40 weight) because its pattern is strictly
    /// more specific — without this, `ClassName`'s bare-PascalCase match
    /// would claim the leading segment of a screaming-snake-case token
    /// before the longer `env_var` pattern gets a chance to match.
    const ORDER: [EntityType; 11] = [
        EntityType::FilePath,
        EntityType::Error,
        EntityType::Exception,
        EntityType::Url,
        EntityType::Port,
        EntityType::Command,
        EntityType::Package,
        EntityType::HttpStatus,
        EntityType::Function,
        EntityType::EnvVar,
        EntityType::ClassName,
    ];
}

/// A `(type, surface)` pair, normalized: trimmed, de-noised, lower-cased
/// for case-insensitive types. File paths retain case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    pub surface: String,
}

struct EntityPatterns {
    patterns: Vec<(EntityType, Regex)>,
}

const KNOWN_ERROR_CODES: &[&str] = &[
    "ENOENT", "EACCES", "ECONNREFUSED", "ETIMEDOUT", "EEXIST", "EPIPE", "EINVAL", "ENOSPC",
    "EADDRINUSE", "ECONNRESET", "EISDIR", "ENOTDIR", "EPERM", "EAGAIN", "EBUSY",
];

const KNOWN_HTTP_STATUSES: &[u16] = &[
    100, 101, 200, 201, 202, 203, 204, 205, 206, 300, 301, 302, 303, 304, 307, 308, 400, 401, 402,
    403, 404, 405, 406, 407, 408, 409, 410, 411, 412, 413, 414, 415, 416, 417, 418, 422, 423, 424,
    425, 426, 428, 429, 431, 500, 501, 502, 503, 504, 505, 507, 508, 510, 511,
];

const COMMAND_VERBS: &[&str] = &[
    "cargo", "npm", "pnpm", "yarn", "pip", "pip3", "git", "make", "docker", "kubectl", "python",
    "python3", "node", "pytest", "go", "curl", "ssh", "rustc", "cmake", "gradle", "mvn",
];

const FUNCTION_KEYWORDS: &[&str] = &[
    "if", "for", "while", "match", "return", "switch", "catch", "function", "fn",
];

// Every pattern below is a fixed literal validated by the unit tests in
// this module; construction cannot fail at runtime. `ExtractorError`
// exists for this same validation performed ahead of time in CI, not for
// a fallible path a caller of `patterns()` needs to handle.
#[allow(clippy::expect_used)]
fn patterns() -> &'static EntityPatterns {
    static PATTERNS: OnceLock<EntityPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let error_alt = KNOWN_ERROR_CODES.join("|");
        let command_alt = COMMAND_VERBS.join("|");
        let mut patterns = Vec::with_capacity(EntityType::ORDER.len());
        for entity_type in EntityType::ORDER {
            let pattern = match entity_type {
                EntityType::FilePath => {
                    r"(?:[\w.\-]*/[\w./\-]+|[\w\-]+\.(?:rs|py|js|ts|tsx|jsx|go|rb|java|c|cc|cpp|h|hpp|toml|yaml|yml|json|md|txt|lock|cfg|ini|sh|proto|sql))"
                        .to_string()
                }
                EntityType::Error => format!(r"\b(?:{error_alt}|E\d{{3,4}})\b"),
                EntityType::Exception => {
                    r"\b[A-Z][A-Za-z0-9]*(?:Error|Exception|Warning)\b".to_string()
                }
                EntityType::Url => r#"\bhttps?://[^\s<>"']+"#.to_string(),
                EntityType::Port => r"(?::\d{2,5}\b|\bport\s+\d{2,5}\b)".to_string(),
                EntityType::Command => format!(r"\b(?:{command_alt})(?:\s+[\w.\-/=:]+){{0,6}}"),
                EntityType::Package => {
                    r#"(?:[a-zA-Z][\w.\-]*@\d[\w.\-]*|[a-zA-Z][\w.\-]+==\d[\w.\-]*|[a-zA-Z][\w\-]+\s*=\s*"\d[\w.\-]*")"#
                        .to_string()
                }
                EntityType::HttpStatus => r"\b[1-5]\d{2}\b".to_string(),
                EntityType::Function => r"\b[A-Za-z_][A-Za-z0-9_]*\s*\(".to_string(),
                EntityType::ClassName => r"\b[A-Z][A-Za-z0-9]{2,}\b".to_string(),
                EntityType::EnvVar => r"\b[A-Z][A-Z0-9]*(?:_[A-Z0-9]+)+\b".to_string(),
            };
            let compiled = Regex::new(&pattern).expect("entity pattern is a fixed, valid regex");
            patterns.push((entity_type, compiled));
        }
        EntityPatterns { patterns }
    })
}

/// Global `Entity -> turn indices` index, built once after extraction and
/// reused by every scorer.
#[derive(Debug, Default, Clone)]
pub struct EntityIndex {
    occurrences: HashMap<Entity, BTreeSet<usize>>,
}

impl EntityIndex {
    pub fn record(&mut self, entity: Entity, turn_index: usize) {
        self.occurrences.entry(entity).or_default().insert(turn_index);
    }

    /// Document frequency: number of distinct turns containing `entity`.
    pub fn df(&self, entity: &Entity) -> usize {
        self.occurrences.get(entity).map_or(0, BTreeSet::len)
    }

    pub fn turns_containing(&self, entity: &Entity) -> Option<&BTreeSet<usize>> {
        self.occurrences.get(entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.occurrences.keys()
    }

    pub fn len(&self) -> usize {
        self.occurrences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }
}

/// Extracts the per-turn entity set for a single turn's text; duplicate
/// occurrences within the turn collapse to one entry. Returns a
/// `BTreeSet` so downstream consumers get deterministic iteration order
/// for free.
pub fn extract_entities(text: &str) -> BTreeSet<Entity> {
    let mut claimed: Vec<(usize, usize)> = Vec::new();
    let mut found = BTreeSet::new();

    for (entity_type, regex) in &patterns().patterns {
        for m in regex.find_iter(text) {
            let (start, end) = (m.start(), m.end());
            if claimed.iter().any(|&(s, e)| start < e && s < end) {
                continue;
            }
            let raw = m.as_str();
            if *entity_type == EntityType::Function && is_control_flow_keyword(raw) {
                continue;
            }
            let Some(surface) = normalize_surface(*entity_type, raw) else {
                continue;
            };
            if *entity_type == EntityType::HttpStatus && !is_known_http_status(&surface) {
                continue;
            }
            claimed.push((start, end));
            found.insert(Entity {
                entity_type: *entity_type,
                surface,
            });
        }
    }
    found
}

fn is_control_flow_keyword(matched: &str) -> bool {
    let ident = matched.trim_end_matches(['(', ' ']).trim();
    FUNCTION_KEYWORDS.contains(&ident)
}

fn is_known_http_status(surface: &str) -> bool {
    surface
        .parse::<u16>()
        .is_ok_and(|code| KNOWN_HTTP_STATUSES.contains(&code))
}

/// Trims, de-noises trailing punctuation, lower-cases case-insensitive
/// types (all but `file_path`), and discards matches shorter than two
/// characters.
fn normalize_surface(entity_type: EntityType, raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let denoised = trimmed.trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']', '"', '\'']);
    if denoised.chars().count() < 2 {
        return None;
    }
    let normalized = match entity_type {
        EntityType::FilePath => denoised.to_string(),
        EntityType::Function => denoised.trim_end_matches('(').trim_end().to_lowercase(),
        _ => denoised.to_lowercase(),
    };
    if normalized.chars().count() < 2 {
        return None;
    }
    Some(normalized)
}
