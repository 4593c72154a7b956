//! Stage 6: rewrite the transcript with only the kept turns, preserving
//! original framing bytes for every retained record.

use std::collections::HashMap;
use std::collections::HashSet;
use std::io::Write;

use crate::error::IoError;
use crate::error::SupercompactError;
use crate::parser::Transcript;
use crate::record::CompactedMarker;
use crate::record::RecordKind;

/// Writes the Rollout dialect: every record belonging to a kept turn, the
/// first `SessionMeta` (always, even if somehow unattached), and a
/// freshly synthesized `Compacted` marker appended last. Since every
/// record this pass keeps already existed in the input, "after the last
/// pre-existing `Compacted` and before fresh content" reduces to
/// appending after everything: there is no content in this pass's output
/// that postdates the input itself.
pub fn emit_rollout<W: Write>(
    transcript: &Transcript,
    kept: &[usize],
    marker: &CompactedMarker,
    writer: &mut W,
) -> Result<(), SupercompactError> {
    let included = included_record_indices(transcript, kept);

    for (record_index, record) in transcript.records.iter().enumerate() {
        if included.contains(&record_index) {
            writeln!(writer, "{}", record.raw).map_err(|err| {
                SupercompactError::Io(IoError { path: "<output>".into(), reason: err.to_string() })
            })?;
        }
    }

    let marker_line = serde_json::to_string(&MarkerRecord { type_tag: "compacted", marker })
        .map_err(|err| SupercompactError::Io(IoError { path: "<output>".into(), reason: err.to_string() }))?;
    writeln!(writer, "{marker_line}")
        .map_err(|err| SupercompactError::Io(IoError { path: "<output>".into(), reason: err.to_string() }))?;
    Ok(())
}

#[derive(serde::Serialize)]
struct MarkerRecord<'a> {
    #[serde(rename = "type")]
    type_tag: &'a str,
    #[serde(flatten)]
    marker: &'a CompactedMarker,
}

fn included_record_indices(transcript: &Transcript, kept: &[usize]) -> HashSet<usize> {
    let mut included = HashSet::new();
    if let Some((idx, _)) = transcript
        .records
        .iter()
        .enumerate()
        .find(|(_, r)| matches!(r.kind, RecordKind::SessionMeta(_)))
    {
        included.insert(idx);
    }
    for &turn_index in kept {
        for &record_index in &transcript.turns[turn_index].record_indices {
            included.insert(record_index);
        }
    }
    included
}

/// Writes the Summary dialect: one `[turn N | score s | tokens t]` header
/// per kept turn followed by its verbatim text.
pub fn emit_summary<W: Write>(
    transcript: &Transcript,
    kept: &[usize],
    scores: &HashMap<usize, f64>,
    writer: &mut W,
) -> Result<(), SupercompactError> {
    for &turn_index in kept {
        let turn = &transcript.turns[turn_index];
        let score = scores.get(&turn_index).copied().unwrap_or(0.0);
        writeln!(writer, "[turn {} | score {:.3} | tokens {}]", turn.index, score, turn.tokens)
            .map_err(|err| SupercompactError::Io(IoError { path: "<output>".into(), reason: err.to_string() }))?;
        writeln!(writer, "{}", turn.text)
            .map_err(|err| SupercompactError::Io(IoError { path: "<output>".into(), reason: err.to_string() }))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::parser::Parser;

    fn marker() -> CompactedMarker {
        CompactedMarker {
            method: Some("eitf".to_string()),
            budget: Some(1000),
            kept_turns: Some(1),
            dropped_turns: Some(0),
            kept_tokens: Some(50),
            elapsed_ms: Some(3),
            extra: Default::default(),
        }
    }

    #[test]
    fn rollout_is_idempotent() {
        let input = "{\"type\":\"session_meta\",\"id\":\"s\",\"version\":1}\n{\"type\":\"response_item\",\"role\":\"user\",\"kind\":\"message\",\"content\":[{\"type\":\"input_text\",\"text\":\"hi\"}]}\n";
        let transcript = Parser::new().parse(input.as_bytes()).expect("parse");
        let kept: Vec<usize> = (0..transcript.turns.len()).collect();
        let m = marker();

        let mut out1 = Vec::new();
        emit_rollout(&transcript, &kept, &m, &mut out1).expect("emit 1");
        let mut out2 = Vec::new();
        emit_rollout(&transcript, &kept, &m, &mut out2).expect("emit 2");
        assert_eq!(out1, out2);
    }

    #[test]
    fn dropped_turn_records_are_excluded() {
        let input = vec![
            "{\"type\":\"session_meta\",\"id\":\"s\",\"version\":1}".to_string(),
            "{\"type\":\"response_item\",\"role\":\"user\",\"kind\":\"message\",\"content\":[{\"type\":\"input_text\",\"text\":\"keep\"}]}".to_string(),
            "{\"type\":\"response_item\",\"role\":\"assistant\",\"kind\":\"message\",\"content\":[{\"type\":\"output_text\",\"text\":\"drop\"}]}".to_string(),
        ]
        .join("\n");
        let transcript = Parser::new().parse(input.as_bytes()).expect("parse");
        let kept = vec![0]; // keep only the user turn
        let m = marker();
        let mut out = Vec::new();
        emit_rollout(&transcript, &kept, &m, &mut out).expect("emit");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("keep"));
        assert!(!text.contains("drop"));
    }

    #[test]
    fn summary_renders_header_and_text() {
        let input = "{\"type\":\"response_item\",\"role\":\"user\",\"kind\":\"message\",\"content\":[{\"type\":\"input_text\",\"text\":\"hello\"}]}\n";
        let transcript = Parser::new().parse(input.as_bytes()).expect("parse");
        let mut scores = HashMap::new();
        scores.insert(0, 0.75);
        let mut out = Vec::new();
        emit_summary(&transcript, &[0], &scores, &mut out).expect("emit");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("[turn 0 | score 0.750 | tokens"));
        assert!(text.contains("hello"));
    }
}
