use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::tool_registry::ToolClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub id: EntryId,
    pub created_at_ms: i64,
    #[serde(flatten)]
    pub body: EntryBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryBody {
    User(UserEntry),
    Assistant(AssistantEntry),
    ToolCall(ToolCallEntry),
    Reasoning(ReasoningEntry),
    AskUser(AskUserEntry),
    SessionEvent(SessionEventEntry),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntry {
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantEntry {
    pub content: String,
    pub streaming: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallEntry {
    pub tool_type: ToolClass,
    pub title: String,
    pub correlation_id: String,
    pub payload: ToolPayload,
    pub completed: bool,
    pub success: Option<bool>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPayload {
    pub tool_name: String,
    pub arguments: Value,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub partial_output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subagent: Option<SubagentBadge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentBadge {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
}

impl SubagentBadge {
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningEntry {
    pub reasoning_id: String,
    pub content: String,
    pub streaming: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AskUserEntry {
    pub request_id: String,
    pub question: String,
    pub choices: Option<Vec<String>>,
    pub allow_freeform: bool,
    pub answered: bool,
    pub answer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEventEntry {
    pub event_kind: String,
    pub payload: Value,
}

impl EntryBody {
    pub fn label(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Assistant(_) => "assistant",
            Self::ToolCall(_) => "tool_call",
            Self::Reasoning(_) => "reasoning",
            Self::AskUser(_) => "ask_user",
            Self::SessionEvent(_) => "session_event",
        }
    }

    pub fn is_streaming(&self) -> bool {
        match self {
            Self::Assistant(entry) => entry.streaming,
            Self::Reasoning(entry) => entry.streaming,
            _ => false,
        }
    }
}

/// Append-mostly ordered entry list with an id → position index.
///
/// Entries are never removed or reordered; ids are handed out sequentially
/// starting at 1 so two transcripts built from the same events match exactly.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    #[serde(skip)]
    positions: HashMap<EntryId, usize>,
    #[serde(skip)]
    next_id: u64,
}

impl PartialEq for Transcript {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, created_at_ms: i64, body: EntryBody) -> EntryId {
        self.next_id += 1;
        let id = EntryId(self.next_id);
        self.positions.insert(id, self.entries.len());
        self.entries.push(TranscriptEntry {
            id,
            created_at_ms,
            body,
        });
        id
    }

    pub fn get(&self, id: EntryId) -> Option<&TranscriptEntry> {
        self.positions.get(&id).map(|&position| &self.entries[position])
    }

    pub fn get_mut(&mut self, id: EntryId) -> Option<&mut TranscriptEntry> {
        let position = *self.positions.get(&id)?;
        self.entries.get_mut(position)
    }

    pub fn tool_call_mut(&mut self, id: EntryId) -> Option<&mut ToolCallEntry> {
        match &mut self.get_mut(id)?.body {
            EntryBody::ToolCall(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
        self.next_id = 0;
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn user(content: &str) -> EntryBody {
        EntryBody::User(UserEntry {
            content: content.to_string(),
            attachments: Vec::new(),
        })
    }

    #[test]
    fn ids_are_sequential_and_indexed() {
        let mut transcript = Transcript::new();
        let first = transcript.append(10, user("a"));
        let second = transcript.append(20, user("b"));
        assert_eq!((first, second), (EntryId(1), EntryId(2)));
        assert_eq!(transcript.get(second).map(|entry| entry.created_at_ms), Some(20));
        assert!(transcript.get(EntryId(3)).is_none());
    }

    #[test]
    fn clear_restarts_ids() {
        let mut transcript = Transcript::new();
        transcript.append(0, user("a"));
        transcript.clear();
        assert!(transcript.is_empty());
        assert_eq!(transcript.append(0, user("b")), EntryId(1));
    }

    #[test]
    fn serializes_flat_tagged_entries() {
        let mut transcript = Transcript::new();
        transcript.append(5, user("hi"));
        assert_eq!(
            transcript.to_json(),
            json!({
                "entries": [
                    { "id": 1, "createdAtMs": 5, "type": "user", "content": "hi" }
                ]
            })
        );
    }
}
