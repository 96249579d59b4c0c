//! Inbound lifecycle events emitted by the agent runtime.
//!
//! The wire shape is a JSON object with a kebab-case `kind` discriminant and
//! camelCase fields. Every field is optional on the wire; missing fields fall
//! back to their defaults so a partially-populated event still reduces.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::policy_engine::PermissionRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AgentEvent {
    UserMessage(UserMessage),
    AssistantDelta(AssistantDelta),
    AssistantFinal(AssistantFinal),
    IntentReport(IntentReport),
    UsageReport(UsageReport),
    ToolStart(ToolStart),
    ToolPartialOutput(ToolPartialOutput),
    ToolProgress(ToolProgress),
    ToolComplete(ToolComplete),
    SubagentStarted(SubagentStarted),
    SubagentCompleted(SubagentCompleted),
    SubagentFailed(SubagentFailed),
    ReasoningDelta(ReasoningDelta),
    ReasoningFinal(ReasoningFinal),
    AskUserRequest(AskUserRequest),
    AskUserAnswered(AskUserAnswered),
    PermissionRequested(PermissionRequested),
    PermissionCompleted(PermissionCompleted),
    SessionStarted(SessionStarted),
    SessionIdle(SessionIdle),
    SessionError(SessionMessage),
    SessionInfo(SessionMessage),
    SessionWarning(SessionMessage),
    SessionShutdown(SessionShutdown),
    ModelChanged(ModelChanged),
    ContextTruncated(ContextTruncated),
    CompactionStarted(CompactionStarted),
    CompactionCompleted(CompactionCompleted),
    TurnStarted(TurnMarker),
    TurnEnded(TurnMarker),
    SkillInvoked(SkillInvoked),
    HookStarted(HookMarker),
    HookEnded(HookMarker),
    /// A kind this build does not know, or a known kind whose payload failed
    /// to decode. Never produced by deserialization directly.
    #[serde(skip)]
    Unrecognized(UnrecognizedEvent),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserMessage {
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Attachment {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssistantDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub delta: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssistantFinal {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IntentReport {
    pub intent: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UsageReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolStart {
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolPartialOutput {
    pub tool_call_id: String,
    pub output: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolProgress {
    pub tool_call_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolComplete {
    pub tool_call_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubagentStarted {
    pub tool_call_id: String,
    pub agent_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubagentCompleted {
    pub tool_call_id: String,
    pub agent_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubagentFailed {
    pub tool_call_id: String,
    pub agent_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReasoningDelta {
    pub reasoning_id: String,
    pub delta: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReasoningFinal {
    pub reasoning_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AskUserRequest {
    pub request_id: String,
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    pub allow_freeform: bool,
}

impl Default for AskUserRequest {
    fn default() -> Self {
        Self {
            request_id: String::new(),
            question: String::new(),
            choices: None,
            allow_freeform: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AskUserAnswered {
    pub request_id: String,
    pub answer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PermissionRequested {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub request: PermissionRequest,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PermissionCompleted {
    pub request_id: String,
    pub decision: PermissionDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_path_prefix: Option<String>,
}

/// Answer to a permission prompt, sent back to the runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionDecision {
    Allow,
    #[default]
    Deny,
    Always,
}

impl PermissionDecision {
    pub fn label(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Always => "always",
        }
    }

    pub fn grants(self) -> bool {
        !matches!(self, Self::Deny)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionStarted {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionIdle {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionMessage {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionShutdown {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelChanged {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_model: Option<String>,
    pub new_model: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContextTruncated {
    pub tokens_removed: u64,
    pub messages_removed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionStarted {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompactionCompleted {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_before: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TurnMarker {
    pub turn_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SkillInvoked {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HookMarker {
    pub hook_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnrecognizedEvent {
    pub kind: String,
    pub reason: UnrecognizedReason,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnrecognizedReason {
    UnknownKind,
    MissingKind,
    Malformed(String),
}

pub const KNOWN_KINDS: &[&str] = &[
    "user-message",
    "assistant-delta",
    "assistant-final",
    "intent-report",
    "usage-report",
    "tool-start",
    "tool-partial-output",
    "tool-progress",
    "tool-complete",
    "subagent-started",
    "subagent-completed",
    "subagent-failed",
    "reasoning-delta",
    "reasoning-final",
    "ask-user-request",
    "ask-user-answered",
    "permission-requested",
    "permission-completed",
    "session-started",
    "session-idle",
    "session-error",
    "session-info",
    "session-warning",
    "session-shutdown",
    "model-changed",
    "context-truncated",
    "compaction-started",
    "compaction-completed",
    "turn-started",
    "turn-ended",
    "skill-invoked",
    "hook-started",
    "hook-ended",
];

impl AgentEvent {
    /// Decode one raw event. Never fails: anything that does not decode into a
    /// known variant becomes [`AgentEvent::Unrecognized`].
    pub fn from_raw(raw: Value) -> Self {
        let Some(kind) = raw.get("kind").and_then(Value::as_str).map(str::to_string) else {
            return Self::Unrecognized(UnrecognizedEvent {
                kind: String::new(),
                reason: UnrecognizedReason::MissingKind,
                raw,
            });
        };
        if !KNOWN_KINDS.contains(&kind.as_str()) {
            return Self::Unrecognized(UnrecognizedEvent {
                kind,
                reason: UnrecognizedReason::UnknownKind,
                raw,
            });
        }
        match serde_json::from_value::<AgentEvent>(without_nulls(&raw)) {
            Ok(event) => event,
            Err(err) => Self::Unrecognized(UnrecognizedEvent {
                kind,
                reason: UnrecognizedReason::Malformed(err.to_string()),
                raw,
            }),
        }
    }

    /// Encode back to the wire shape. Unrecognized events round-trip verbatim.
    pub fn to_raw(&self) -> Value {
        match self {
            Self::Unrecognized(unrecognized) => unrecognized.raw.clone(),
            other => serde_json::to_value(other).unwrap_or(Value::Null),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::UserMessage(_) => "user-message",
            Self::AssistantDelta(_) => "assistant-delta",
            Self::AssistantFinal(_) => "assistant-final",
            Self::IntentReport(_) => "intent-report",
            Self::UsageReport(_) => "usage-report",
            Self::ToolStart(_) => "tool-start",
            Self::ToolPartialOutput(_) => "tool-partial-output",
            Self::ToolProgress(_) => "tool-progress",
            Self::ToolComplete(_) => "tool-complete",
            Self::SubagentStarted(_) => "subagent-started",
            Self::SubagentCompleted(_) => "subagent-completed",
            Self::SubagentFailed(_) => "subagent-failed",
            Self::ReasoningDelta(_) => "reasoning-delta",
            Self::ReasoningFinal(_) => "reasoning-final",
            Self::AskUserRequest(_) => "ask-user-request",
            Self::AskUserAnswered(_) => "ask-user-answered",
            Self::PermissionRequested(_) => "permission-requested",
            Self::PermissionCompleted(_) => "permission-completed",
            Self::SessionStarted(_) => "session-started",
            Self::SessionIdle(_) => "session-idle",
            Self::SessionError(_) => "session-error",
            Self::SessionInfo(_) => "session-info",
            Self::SessionWarning(_) => "session-warning",
            Self::SessionShutdown(_) => "session-shutdown",
            Self::ModelChanged(_) => "model-changed",
            Self::ContextTruncated(_) => "context-truncated",
            Self::CompactionStarted(_) => "compaction-started",
            Self::CompactionCompleted(_) => "compaction-completed",
            Self::TurnStarted(_) => "turn-started",
            Self::TurnEnded(_) => "turn-ended",
            Self::SkillInvoked(_) => "skill-invoked",
            Self::HookStarted(_) => "hook-started",
            Self::HookEnded(_) => "hook-ended",
            Self::Unrecognized(unrecognized) => unrecognized.kind.as_str(),
        }
    }
}

/// Copy of `raw` with `null` fields removed, so they take the same defaults as
/// absent ones. Applies to the event object and the nested permission
/// request; tool arguments are opaque and kept as sent.
fn without_nulls(raw: &Value) -> Value {
    let mut decoded = raw.clone();
    if let Value::Object(fields) = &mut decoded {
        fields.retain(|_, value| !value.is_null());
        if let Some(Value::Object(request)) = fields.get_mut("request") {
            request.retain(|_, value| !value.is_null());
        }
    }
    decoded
}

/// An event paired with the wall-clock time it reached the host.
///
/// Replay reads `ts_ms` back from the log so entry timestamps are stable.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub ts_ms: i64,
    pub event: AgentEvent,
}

impl TimedEvent {
    pub fn new(ts_ms: i64, event: AgentEvent) -> Self {
        Self { ts_ms, event }
    }

    pub fn now(event: AgentEvent) -> Self {
        Self {
            ts_ms: chrono::Utc::now().timestamp_millis(),
            event,
        }
    }
}
