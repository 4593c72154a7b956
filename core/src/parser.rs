//! Stage 1: read a rollout log record-by-record and group it into turns.

use std::io::BufRead;

use serde_json::Value;

use crate::error::ParseError;
use crate::error::SupercompactError;
use crate::error::Warning;
use crate::record::CURRENT_DIALECT_VERSION;
use crate::record::CompactedMarker;
use crate::record::Record;
use crate::record::RecordKind;
use crate::record::ResponseItemRecord;
use crate::record::Role;
use crate::turn::Turn;
use crate::turn::TurnKind;

/// Owns the parsed records and the turns grouped from them. Records are
/// never mutated after this stage; turns borrow into the record vector by
/// index rather than by reference, so both can be owned by the same value.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    pub records: Vec<Record>,
    pub turns: Vec<Turn>,
    /// Non-fatal conditions raised while parsing, e.g. a `SessionMeta`
    /// declaring a dialect version this core doesn't recognize.
    pub warnings: Vec<Warning>,
}

impl Transcript {
    pub fn turn_text(&self, turn: &Turn) -> &str {
        &turn.text
    }
}

/// Parses a rollout log into a [`Transcript`]. Stateless: construct one per
/// call, or reuse across calls, it carries no state of its own.
#[derive(Debug, Default)]
pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse<R: BufRead>(&self, reader: R) -> Result<Transcript, SupercompactError> {
        let mut builder = TurnBuilder::default();
        let mut records = Vec::new();
        let mut warnings = Vec::new();
        let mut offset = 0usize;

        for (idx, line) in reader.lines().enumerate() {
            let line_number = idx + 1;
            let line = line.map_err(|err| {
                SupercompactError::Parse(ParseError {
                    line: line_number,
                    offset,
                    reason: format!("failed to read line: {err}"),
                })
            })?;
            let line_len = line.len() + 1; // account for the newline we split on
            if line.trim().is_empty() {
                offset += line_len;
                continue;
            }

            let record_index = records.len();
            let kind = parse_line(&line, line_number, offset)?;
            if let RecordKind::SessionMeta(meta) = &kind {
                if meta.version != CURRENT_DIALECT_VERSION {
                    warnings.push(Warning::UnknownDialectVersion { version: meta.version.to_string() });
                }
            }
            builder.observe(record_index, &kind);
            records.push(Record { raw: line, kind });

            offset += line_len;
        }

        let turns = builder.finish();
        tracing::debug!(records = records.len(), turns = turns.len(), "parsed rollout log into turns");
        Ok(Transcript { records, turns, warnings })
    }
}

fn parse_line(line: &str, line_number: usize, offset: usize) -> Result<RecordKind, SupercompactError> {
    let value: Value = serde_json::from_str(line).map_err(|err| {
        SupercompactError::Parse(ParseError {
            line: line_number,
            offset,
            reason: format!("invalid JSON: {err}"),
        })
    })?;

    let type_tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            SupercompactError::Parse(ParseError {
                line: line_number,
                offset,
                reason: "missing or non-string \"type\" discriminator".to_string(),
            })
        })?
        .to_string();

    let kind = match type_tag.as_str() {
        "session_meta" => RecordKind::SessionMeta(deserialize(value, line_number, offset)?),
        "turn_context" => RecordKind::TurnContext(deserialize(value, line_number, offset)?),
        "response_item" => RecordKind::ResponseItem(deserialize(value, line_number, offset)?),
        "compacted" => RecordKind::Compacted(deserialize(value, line_number, offset)?),
        "event_msg" => RecordKind::EventMsg,
        _ => RecordKind::Other { type_tag },
    };
    Ok(kind)
}

fn deserialize<T: serde::de::DeserializeOwned>(
    value: Value,
    line_number: usize,
    offset: usize,
) -> Result<T, SupercompactError> {
    serde_json::from_value(value).map_err(|err| {
        SupercompactError::Parse(ParseError {
            line: line_number,
            offset,
            reason: format!("malformed record body: {err}"),
        })
    })
}

/// Groups records into turns while walking them in order.
#[derive(Debug, Default)]
struct TurnBuilder {
    turns: Vec<Turn>,
    current: Option<Turn>,
    pending_turn_context: Option<usize>,
    /// Unknown-discriminator records seen while no turn is open; attached
    /// to whichever turn opens next, matching `TurnContext`'s forward
    /// attachment.
    pending_other: Vec<usize>,
    next_index: usize,
}

impl TurnBuilder {
    fn observe(&mut self, record_index: usize, kind: &RecordKind) {
        match kind {
            RecordKind::SessionMeta(_) => {
                // Never joins a turn.
            }
            RecordKind::TurnContext(_) => {
                self.finish_current();
                self.pending_turn_context = Some(record_index);
            }
            RecordKind::ResponseItem(item) => self.observe_response_item(record_index, item),
            RecordKind::Compacted(marker) => self.observe_compacted(record_index, marker),
            RecordKind::EventMsg => {
                // Ephemeral, never joins a turn.
            }
            RecordKind::Other { .. } => {
                if let Some(turn) = self.current.as_mut() {
                    turn.record_indices.push(record_index);
                } else {
                    self.pending_other.push(record_index);
                }
            }
        }
    }

    fn observe_response_item(&mut self, record_index: usize, item: &ResponseItemRecord) {
        let role = item.role.turn_role();
        let starts_new_turn = match &self.current {
            Some(turn) => turn.role != role,
            None => true,
        };

        if starts_new_turn {
            self.finish_current();
            let mut record_indices = std::mem::take(&mut self.pending_other);
            let turn_context_record_index = self.pending_turn_context.take();
            if let Some(ctx) = turn_context_record_index {
                record_indices.push(ctx);
            }
            record_indices.push(record_index);
            self.current = Some(Turn {
                index: self.next_index,
                role,
                text: item.item.scoring_text(),
                tokens: 0,
                record_indices,
                turn_context_record_index,
                kind: TurnKind::Normal,
            });
            self.next_index += 1;
        } else if let Some(turn) = self.current.as_mut() {
            turn.record_indices.push(record_index);
            let text = item.item.scoring_text();
            if !text.is_empty() {
                if !turn.text.is_empty() {
                    turn.text.push('\n');
                }
                turn.text.push_str(&text);
            }
        }
    }

    fn observe_compacted(&mut self, record_index: usize, _marker: &CompactedMarker) {
        self.finish_current();
        self.pending_turn_context = None;
        self.pending_other.clear();
        self.turns.push(Turn {
            index: self.next_index,
            role: Role::System,
            text: String::new(),
            tokens: 0,
            record_indices: vec![record_index],
            turn_context_record_index: None,
            kind: TurnKind::CompactedMarker,
        });
        self.next_index += 1;
    }

    fn finish_current(&mut self) {
        if let Some(turn) = self.current.take() {
            self.turns.push(turn);
        }
    }

    fn finish(mut self) -> Vec<Turn> {
        self.finish_current();
        self.turns
    }
}
