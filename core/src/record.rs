//! Record-level data model: one value per line of the rollout log.
//!
//! Each [`Record`] keeps the original serialized line verbatim as an opaque
//! byte span alongside a parsed structural view, so the emitter can
//! re-serialize a kept record without re-encoding it.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// Dialect version this core understands. A `SessionMeta` record declaring
/// a different version produces a warning, not a parse failure.
pub const CURRENT_DIALECT_VERSION: u32 = 1;

/// One line of the rollout log: its raw text plus a structural view.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Original line, without the trailing newline. Re-emitted byte for
    /// byte for every record the emitter keeps, except the freshly
    /// synthesized `Compacted` marker.
    pub raw: String,
    pub kind: RecordKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordKind {
    SessionMeta(SessionMeta),
    TurnContext(TurnContextRecord),
    ResponseItem(ResponseItemRecord),
    Compacted(CompactedMarker),
    /// Ephemeral UI record; never appears in output.
    EventMsg,
    /// Unknown discriminator, retained and emitted unchanged.
    Other { type_tag: String },
}

impl RecordKind {
    pub fn type_tag(&self) -> &str {
        match self {
            RecordKind::SessionMeta(_) => "session_meta",
            RecordKind::TurnContext(_) => "turn_context",
            RecordKind::ResponseItem(_) => "response_item",
            RecordKind::Compacted(_) => "compacted",
            RecordKind::EventMsg => "event_msg",
            RecordKind::Other { type_tag } => type_tag,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: String,
    pub version: u32,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TurnContextRecord {
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

/// The end-user-vs-everyone-else split used as `role` at the
/// `Turn` level (`user` | `system`). The wire format keeps the finer
/// `user` / `assistant` / `tool` distinction so the parser can tell a
/// function call apart from its output, but grouping only cares about
/// this coarser split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireRole {
    User,
    Assistant,
    Tool,
}

impl WireRole {
    pub fn turn_role(self) -> Role {
        match self {
            WireRole::User => Role::User,
            WireRole::Assistant | WireRole::Tool => Role::System,
        }
    }
}

/// A `Turn`'s speaker role: `user` or `system`, where `system` covers
/// assistant text and tool I/O alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseItemRecord {
    pub role: WireRole,
    #[serde(flatten)]
    pub item: ResponseItem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseItem {
    Message { content: Vec<ContentItem> },
    FunctionCall {
        name: String,
        arguments: String,
        call_id: String,
    },
    FunctionCallOutput { call_id: String, output: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    InputText { text: String },
    OutputText { text: String },
    Reasoning { text: String },
}

/// Structural view of a `Compacted` marker: method name, budget, kept and
/// dropped turn/token counts, and elapsed time. All fields are optional so
/// markers written by a prior pass (or a different implementation) still
/// parse; the emitter always fills every field on the marker it writes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompactedMarker {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kept_turns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropped_turns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kept_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ResponseItem {
    /// Plain text contributed to a turn's scoring text. Function call
    /// arguments/outputs are included verbatim so entity extraction can see
    /// file paths and commands embedded in tool calls.
    pub fn scoring_text(&self) -> String {
        match self {
            ResponseItem::Message { content } => content
                .iter()
                .map(|c| match c {
                    ContentItem::InputText { text }
                    | ContentItem::OutputText { text }
                    | ContentItem::Reasoning { text } => text.as_str(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
            ResponseItem::FunctionCall {
                name, arguments, ..
            } => format!("{name} {arguments}"),
            ResponseItem::FunctionCallOutput { output, .. } => output.clone(),
        }
    }
}
