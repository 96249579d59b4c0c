use std::collections::HashMap;
use std::collections::VecDeque;

use serde::Serialize;

use crate::accumulator::PreviewBuffer;
use crate::accumulator::StreamAccumulator;
use crate::config::Config;
use crate::correlator::ToolCallCorrelator;
use crate::policy_engine::PermissionRequest;
use crate::policy_engine::PolicyDecision;
use crate::tool_registry::ConfigError;
use crate::tool_registry::ToolRegistry;
use crate::transcript::EntryId;
use crate::transcript::Transcript;

/// Scope that owns a transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: Option<String>,
    pub working_root: String,
    pub model: Option<String>,
}

impl SessionInfo {
    pub fn new(working_root: impl Into<String>) -> Self {
        Self {
            session_id: None,
            working_root: working_root.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityState {
    /// A turn is in flight and nothing has come back yet.
    pub waiting: bool,
    /// A turn is in flight.
    pub generating: bool,
    pub turn_started_at_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub model: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cost: f64,
    pub reports: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPermission {
    pub request_id: String,
    pub tool_call_id: Option<String>,
    pub request: PermissionRequest,
    pub decision: PolicyDecision,
    pub requested_at_ms: i64,
}

/// Permission prompts awaiting the user. Only `active` is shown; the rest
/// wait their turn in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionQueue {
    pub active: Option<PendingPermission>,
    pub queued: VecDeque<PendingPermission>,
}

impl PermissionQueue {
    /// Returns true when the pushed request became the active prompt.
    pub fn push(&mut self, pending: PendingPermission) -> bool {
        if self.active.is_none() {
            self.active = Some(pending);
            true
        } else {
            self.queued.push_back(pending);
            false
        }
    }

    pub fn is_active(&self, request_id: &str) -> bool {
        self.active
            .as_ref()
            .is_some_and(|pending| pending.request_id == request_id)
    }

    /// Drop `request_id` wherever it sits. Returns true when it was the active
    /// prompt, in which case the next queued request is promoted.
    pub fn remove(&mut self, request_id: &str) -> bool {
        if self.is_active(request_id) {
            self.active = self.queued.pop_front();
            return true;
        }
        self.queued.retain(|pending| pending.request_id != request_id);
        false
    }

    pub fn clear(&mut self) -> bool {
        let had_any = self.active.is_some() || !self.queued.is_empty();
        self.active = None;
        self.queued.clear();
        had_any
    }

    pub fn len(&self) -> usize {
        usize::from(self.active.is_some()) + self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Counters for events the reducer could not apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReducerDiagnostics {
    /// Patch events whose correlation id was never registered.
    pub unknown_correlation: u64,
    /// Patch events for tool calls hidden from the transcript.
    pub hidden_patches: u64,
    pub unknown_kinds: u64,
    pub malformed_events: u64,
    /// Answers or permission decisions that matched nothing pending.
    pub ignored_host_actions: u64,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub session: SessionInfo,
    pub transcript: Transcript,
    pub correlator: ToolCallCorrelator,
    pub streams: StreamAccumulator,
    /// Runtime message id of the current assistant stream, when it sent one.
    pub current_message_id: Option<String>,
    pub intent: Option<String>,
    pub activity: ActivityState,
    pub preview: PreviewBuffer,
    pub usage: UsageSnapshot,
    pub permissions: PermissionQueue,
    pub pending_questions: HashMap<String, EntryId>,
    pub diagnostics: ReducerDiagnostics,
    pub tools: ToolRegistry,
}

impl SessionState {
    pub fn new(session: SessionInfo) -> Self {
        Self::with_registry(session, ToolRegistry::default(), PreviewBuffer::default())
    }

    pub fn from_config(session: SessionInfo, config: &Config) -> Result<Self, ConfigError> {
        let tools = ToolRegistry::new(&config.tools, &config.transcript)?;
        let mut session = session;
        if session.model.is_none() {
            session.model = config.model.default_model.clone();
        }
        Ok(Self::with_registry(
            session,
            tools,
            PreviewBuffer::new(config.transcript.preview_chars),
        ))
    }

    fn with_registry(session: SessionInfo, tools: ToolRegistry, preview: PreviewBuffer) -> Self {
        Self {
            session,
            transcript: Transcript::new(),
            correlator: ToolCallCorrelator::default(),
            streams: StreamAccumulator::default(),
            current_message_id: None,
            intent: None,
            activity: ActivityState::default(),
            preview,
            usage: UsageSnapshot::default(),
            permissions: PermissionQueue::default(),
            pending_questions: HashMap::new(),
            diagnostics: ReducerDiagnostics::default(),
            tools,
        }
    }

    /// Drop everything tied to the current transcript, keeping configuration.
    pub fn reset(&mut self, session: SessionInfo) {
        let tools = self.tools.clone();
        let mut preview = self.preview.clone();
        preview.clear();
        *self = Self::with_registry(session, tools, preview);
    }
}
