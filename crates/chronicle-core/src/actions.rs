use serde::Serialize;

use crate::events::AgentEvent;
use crate::events::Attachment;
use crate::events::PermissionDecision;
use crate::events::TimedEvent;
use crate::policy_engine::PermissionRule;
use crate::state::PendingPermission;
use crate::state::SessionInfo;
use crate::state::UsageSnapshot;
use crate::transcript::EntryId;

#[derive(Debug, Clone)]
pub enum SessionAction {
    /// An event from the agent runtime (live) or from a recorded log (replay).
    Agent(TimedEvent),
    /// Something the user or host did.
    Host(HostAction),
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostAction {
    SendMessage {
        prompt: String,
        attachments: Vec<Attachment>,
    },
    ResolvePermission {
        request_id: String,
        decision: PermissionDecision,
        rule_path_prefix: Option<String>,
    },
    AnswerUser {
        request_id: String,
        answer: String,
    },
    Abort,
    /// Idle-equivalent close of every open stream, issued after an abort.
    CloseStreams,
    /// Evaluate pending permission prompts again after the rules changed and
    /// answer the ones that are now allowed.
    RecheckPermissions,
    NewSession(SessionInfo),
}

/// Outbound commands for the agent runtime.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AgentCommand {
    SendMessage {
        prompt: String,
        attachments: Vec<Attachment>,
    },
    Abort,
    RespondPermission {
        request_id: String,
        decision: PermissionDecision,
    },
    RespondUserInput {
        request_id: String,
        answer: String,
    },
}

/// State changes a rendering surface may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum UiSignal {
    EntryAppended(EntryId),
    EntryUpdated(EntryId),
    TranscriptReset,
    IntentChanged(Option<String>),
    ActivityChanged { waiting: bool, generating: bool },
    TurnTimerReset { started_at_ms: i64 },
    Preview(String),
    PermissionPrompt(Option<PendingPermission>),
    ModelChanged(String),
    UsageUpdated(UsageSnapshot),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    Agent(AgentCommand),
    /// Append this event to the session log and feed it back through the
    /// reducer, so decisions made on this side survive replay.
    Record(AgentEvent),
    PersistRule(PermissionRule),
    Signal(UiSignal),
}

impl SessionEffect {
    pub fn is_signal(&self) -> bool {
        matches!(self, Self::Signal(_))
    }
}
