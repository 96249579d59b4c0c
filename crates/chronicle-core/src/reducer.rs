use serde_json::Value;

use super::accumulator::StreamKey;
use super::actions::AgentCommand;
use super::actions::HostAction;
use super::actions::SessionAction;
use super::actions::SessionEffect;
use super::actions::UiSignal;
use super::correlator::Lookup;
use super::events::AgentEvent;
use super::events::AskUserAnswered;
use super::events::AskUserRequest;
use super::events::AssistantDelta;
use super::events::Attachment;
use super::events::PermissionCompleted;
use super::events::PermissionDecision;
use super::events::PermissionRequested;
use super::events::ReasoningDelta;
use super::events::ReasoningFinal;
use super::events::SessionStarted;
use super::events::SubagentStarted;
use super::events::TimedEvent;
use super::events::ToolStart;
use super::events::UnrecognizedEvent;
use super::events::UnrecognizedReason;
use super::events::UsageReport;
use super::events::UserMessage;
use super::paths::normalize_path;
use super::paths::resolve_path;
use super::policy_engine::PermissionKind;
use super::policy_engine::PermissionPolicy;
use super::policy_engine::PermissionRequest;
use super::policy_engine::PermissionRule;
use super::state::PendingPermission;
use super::state::SessionState;
use super::tool_registry::ToolClass;
use super::transcript::AskUserEntry;
use super::transcript::AssistantEntry;
use super::transcript::EntryBody;
use super::transcript::EntryId;
use super::transcript::ReasoningEntry;
use super::transcript::SessionEventEntry;
use super::transcript::SubagentBadge;
use super::transcript::ToolCallEntry;
use super::transcript::ToolPayload;
use super::transcript::UserEntry;

/// Whether permission requests are decided as they arrive.
///
/// Replay reconstructs a transcript from a recorded log: requests are shown
/// but never evaluated, and nothing but UI signals leaves the reducer.
#[derive(Debug, Clone, Copy)]
pub enum Gate<'a> {
    Live(&'a PermissionPolicy),
    Replay,
}

impl Gate<'_> {
    pub fn is_replay(&self) -> bool {
        matches!(self, Self::Replay)
    }
}

pub fn reduce(
    state: &mut SessionState,
    action: SessionAction,
    gate: Gate<'_>,
) -> Vec<SessionEffect> {
    let mut effects = match action {
        SessionAction::Agent(timed) => reduce_agent(state, timed, gate),
        SessionAction::Host(host) => reduce_host(state, host, gate),
    };
    if gate.is_replay() {
        effects.retain(SessionEffect::is_signal);
    }
    effects
}

fn reduce_agent(state: &mut SessionState, timed: TimedEvent, gate: Gate<'_>) -> Vec<SessionEffect> {
    let TimedEvent { ts_ms, event } = timed;
    let mut effects = Vec::new();
    match event {
        AgentEvent::UserMessage(message) => user_message(state, ts_ms, message, &mut effects),
        AgentEvent::AssistantDelta(delta) => assistant_delta(state, ts_ms, delta, &mut effects),
        AgentEvent::AssistantFinal(_) => {
            if let Some(entry) = state
                .streams
                .close(&mut state.transcript, &StreamKey::Assistant)
            {
                effects.push(signal(UiSignal::EntryUpdated(entry)));
            }
        }
        AgentEvent::IntentReport(report) => set_intent(state, &report.intent, &mut effects),
        AgentEvent::UsageReport(report) => usage_report(state, report, &mut effects),
        AgentEvent::ToolStart(start) => tool_start(state, ts_ms, start, &mut effects),
        AgentEvent::ToolPartialOutput(output) => {
            patch_tool_call(state, &output.tool_call_id, &mut effects, |call| {
                call.payload.partial_output.push_str(&output.output);
            });
        }
        AgentEvent::ToolProgress(progress) => {
            patch_tool_call(state, &progress.tool_call_id, &mut effects, |call| {
                call.payload.progress_message = Some(progress.message.clone());
            });
        }
        AgentEvent::ToolComplete(complete) => {
            patch_tool_call(state, &complete.tool_call_id, &mut effects, |call| {
                call.completed = true;
                call.success = Some(complete.success);
                call.payload.result = complete.result.clone();
                call.error = complete.error.clone();
            });
            state.correlator.forget(&complete.tool_call_id);
        }
        AgentEvent::SubagentStarted(started) => {
            subagent_started(state, ts_ms, started, &mut effects)
        }
        AgentEvent::SubagentCompleted(completed) => {
            patch_tool_call(state, &completed.tool_call_id, &mut effects, |call| {
                call.completed = true;
                call.success = Some(true);
            });
        }
        AgentEvent::SubagentFailed(failed) => {
            patch_tool_call(state, &failed.tool_call_id, &mut effects, |call| {
                call.completed = true;
                call.success = Some(false);
                call.error = Some(failed.error.clone());
            });
        }
        AgentEvent::ReasoningDelta(delta) => reasoning_delta(state, ts_ms, delta, &mut effects),
        AgentEvent::ReasoningFinal(last) => reasoning_final(state, ts_ms, last, &mut effects),
        AgentEvent::AskUserRequest(request) => ask_user(state, ts_ms, request, &mut effects),
        AgentEvent::AskUserAnswered(answered) => {
            ask_user_answered(state, answered, &mut effects)
        }
        AgentEvent::PermissionRequested(requested) => {
            permission_requested(state, ts_ms, requested, gate, &mut effects)
        }
        AgentEvent::PermissionCompleted(completed) => {
            permission_completed(state, ts_ms, completed, &mut effects)
        }
        AgentEvent::SessionStarted(ref started) => {
            session_started(state, started, &mut effects);
            append_session_event(state, ts_ms, &event, &mut effects);
        }
        AgentEvent::SessionIdle(_) => settle_turn(state, &mut effects),
        AgentEvent::ModelChanged(ref changed) => {
            let model = changed.new_model.trim().to_string();
            if !model.is_empty() && state.session.model.as_deref() != Some(model.as_str()) {
                state.session.model = Some(model.clone());
                effects.push(signal(UiSignal::ModelChanged(model)));
            }
            append_session_event(state, ts_ms, &event, &mut effects);
        }
        AgentEvent::Unrecognized(unrecognized) => unrecognized_event(state, &unrecognized),
        AgentEvent::SessionError(_)
        | AgentEvent::SessionInfo(_)
        | AgentEvent::SessionWarning(_)
        | AgentEvent::SessionShutdown(_)
        | AgentEvent::ContextTruncated(_)
        | AgentEvent::CompactionStarted(_)
        | AgentEvent::CompactionCompleted(_)
        | AgentEvent::TurnStarted(_)
        | AgentEvent::TurnEnded(_)
        | AgentEvent::SkillInvoked(_)
        | AgentEvent::HookStarted(_)
        | AgentEvent::HookEnded(_) => append_session_event(state, ts_ms, &event, &mut effects),
    }
    effects
}

fn reduce_host(state: &mut SessionState, action: HostAction, gate: Gate<'_>) -> Vec<SessionEffect> {
    let mut effects = Vec::new();
    match action {
        HostAction::SendMessage {
            prompt,
            attachments,
        } => send_message(prompt, attachments, &mut effects),
        HostAction::ResolvePermission {
            request_id,
            decision,
            rule_path_prefix,
        } => resolve_permission(state, request_id, decision, rule_path_prefix, &mut effects),
        HostAction::AnswerUser { request_id, answer } => {
            let open = state
                .pending_questions
                .contains_key(&request_id);
            if !open {
                state.diagnostics.ignored_host_actions += 1;
                tracing::debug!(%request_id, "answer for unknown or already answered question");
                return effects;
            }
            effects.push(SessionEffect::Agent(AgentCommand::RespondUserInput {
                request_id: request_id.clone(),
                answer: answer.clone(),
            }));
            effects.push(SessionEffect::Record(AgentEvent::AskUserAnswered(
                AskUserAnswered { request_id, answer },
            )));
        }
        HostAction::Abort => {
            effects.push(SessionEffect::Agent(AgentCommand::Abort));
            if state.permissions.clear() {
                effects.push(signal(UiSignal::PermissionPrompt(None)));
            }
            set_activity(state, false, false, &mut effects);
        }
        HostAction::CloseStreams => settle_turn(state, &mut effects),
        HostAction::RecheckPermissions => {
            if let Gate::Live(policy) = gate {
                recheck_permissions(state, policy, &mut effects);
            }
        }
        HostAction::NewSession(session) => {
            tracing::info!(session_id = ?session.session_id, "starting new transcript");
            state.reset(session);
            effects.push(signal(UiSignal::TranscriptReset));
        }
    }
    effects
}

fn signal(signal: UiSignal) -> SessionEffect {
    SessionEffect::Signal(signal)
}

fn set_activity(
    state: &mut SessionState,
    waiting: bool,
    generating: bool,
    effects: &mut Vec<SessionEffect>,
) {
    let activity = &mut state.activity;
    if activity.waiting == waiting && activity.generating == generating {
        return;
    }
    activity.waiting = waiting;
    activity.generating = generating;
    effects.push(signal(UiSignal::ActivityChanged {
        waiting,
        generating,
    }));
}

/// First sign of output for the turn: stop showing the waiting indicator.
fn mark_responding(state: &mut SessionState, effects: &mut Vec<SessionEffect>) {
    if state.activity.waiting {
        let generating = state.activity.generating;
        set_activity(state, false, generating, effects);
    }
}

fn set_intent(state: &mut SessionState, intent: &str, effects: &mut Vec<SessionEffect>) {
    let intent = intent.trim();
    let next = (!intent.is_empty()).then(|| intent.to_string());
    if state.intent != next {
        state.intent = next.clone();
        effects.push(signal(UiSignal::IntentChanged(next)));
    }
}

fn detach_assistant(state: &mut SessionState) {
    state.streams.detach(&StreamKey::Assistant);
    state.current_message_id = None;
}

fn user_message(
    state: &mut SessionState,
    ts_ms: i64,
    message: UserMessage,
    effects: &mut Vec<SessionEffect>,
) {
    detach_assistant(state);
    let entry = state.transcript.append(
        ts_ms,
        EntryBody::User(UserEntry {
            content: message.content,
            attachments: message
                .attachments
                .into_iter()
                .map(|attachment| attachment.path)
                .collect(),
        }),
    );
    effects.push(signal(UiSignal::EntryAppended(entry)));
    state.preview.clear();
    state.activity.turn_started_at_ms = Some(ts_ms);
    effects.push(signal(UiSignal::TurnTimerReset {
        started_at_ms: ts_ms,
    }));
    set_activity(state, true, true, effects);
}

fn assistant_delta(
    state: &mut SessionState,
    ts_ms: i64,
    delta: AssistantDelta,
    effects: &mut Vec<SessionEffect>,
) {
    if delta.delta.is_empty() {
        return;
    }
    mark_responding(state, effects);

    // A delta tagged with a different message id starts a new message even
    // when the previous one was never finalized.
    let switched = matches!(
        (&state.current_message_id, &delta.message_id),
        (Some(current), Some(next)) if current != next
    );
    if switched {
        if let Some(entry) = state
            .streams
            .finalize(&mut state.transcript, &StreamKey::Assistant)
        {
            effects.push(signal(UiSignal::EntryUpdated(entry)));
        }
        state.current_message_id = None;
    }

    match state.streams.entry_for(&StreamKey::Assistant) {
        Some(entry) => {
            state
                .streams
                .append(&mut state.transcript, &StreamKey::Assistant, &delta.delta);
            effects.push(signal(UiSignal::EntryUpdated(entry)));
        }
        None => {
            let entry = state.transcript.append(
                ts_ms,
                EntryBody::Assistant(AssistantEntry {
                    content: delta.delta.clone(),
                    streaming: true,
                }),
            );
            state.streams.open(StreamKey::Assistant, entry);
            state.current_message_id = delta.message_id;
            effects.push(signal(UiSignal::EntryAppended(entry)));
        }
    }

    state.preview.push(&delta.delta);
    effects.push(signal(UiSignal::Preview(state.preview.text())));
}

fn usage_report(state: &mut SessionState, report: UsageReport, effects: &mut Vec<SessionEffect>) {
    let usage = &mut state.usage;
    if report.model.is_some() {
        usage.model = report.model;
    }
    usage.input_tokens = usage.input_tokens.saturating_add(report.input_tokens);
    usage.output_tokens = usage.output_tokens.saturating_add(report.output_tokens);
    usage.cache_read_tokens = usage.cache_read_tokens.saturating_add(report.cache_read_tokens);
    usage.cost += report.cost.unwrap_or(0.0);
    usage.reports += 1;
    effects.push(signal(UiSignal::UsageUpdated(usage.clone())));
}

fn tool_start(
    state: &mut SessionState,
    ts_ms: i64,
    start: ToolStart,
    effects: &mut Vec<SessionEffect>,
) {
    detach_assistant(state);
    mark_responding(state, effects);

    if state.tools.is_intent_tool(&start.tool_name) {
        if let Some(intent) = start.arguments.get("intent").and_then(Value::as_str) {
            set_intent(state, intent, effects);
        }
    }
    if state.tools.is_hidden(&start.tool_name) {
        if !start.tool_call_id.is_empty() {
            if let Some(previous) = state.correlator.register_hidden(&start.tool_call_id) {
                supersede(state, &start.tool_call_id, previous, effects);
            }
        }
        return;
    }

    let tool_type = state.tools.classify(&start.tool_name);
    let title = state.tools.title(tool_type, &start.tool_name, &start.arguments);
    let entry = state.transcript.append(
        ts_ms,
        EntryBody::ToolCall(ToolCallEntry {
            tool_type,
            title,
            correlation_id: start.tool_call_id.clone(),
            payload: ToolPayload {
                tool_name: start.tool_name,
                arguments: start.arguments,
                ..ToolPayload::default()
            },
            completed: false,
            success: None,
            error: None,
        }),
    );
    effects.push(signal(UiSignal::EntryAppended(entry)));

    if start.tool_call_id.is_empty() {
        tracing::debug!(entry = entry.0, "tool call without a correlation id");
        return;
    }
    if let Some(previous) = state.correlator.register(&start.tool_call_id, entry) {
        supersede(state, &start.tool_call_id, previous, effects);
    }
}

/// Close a call whose id was taken over by a newer start, so each id keeps
/// at most one open entry.
fn supersede(
    state: &mut SessionState,
    call_id: &str,
    previous: EntryId,
    effects: &mut Vec<SessionEffect>,
) {
    tracing::warn!(call_id, previous = previous.0, "tool call id reused before completion");
    let Some(call) = state.transcript.tool_call_mut(previous) else {
        return;
    };
    if call.completed {
        return;
    }
    call.completed = true;
    call.success = Some(false);
    call.error = Some("superseded".to_string());
    effects.push(signal(UiSignal::EntryUpdated(previous)));
}

/// Apply `patch` to the tool call correlated with `call_id`. Patches for
/// hidden or unknown ids are dropped and counted.
fn patch_tool_call(
    state: &mut SessionState,
    call_id: &str,
    effects: &mut Vec<SessionEffect>,
    patch: impl FnOnce(&mut ToolCallEntry),
) {
    match state.correlator.lookup(call_id) {
        Lookup::Found(entry) => match state.transcript.tool_call_mut(entry) {
            Some(call) => {
                patch(call);
                effects.push(signal(UiSignal::EntryUpdated(entry)));
            }
            None => {
                state.diagnostics.unknown_correlation += 1;
                tracing::warn!(call_id, entry = entry.0, "correlated entry is not a tool call");
            }
        },
        Lookup::Hidden => state.diagnostics.hidden_patches += 1,
        Lookup::Unknown => {
            state.diagnostics.unknown_correlation += 1;
            tracing::warn!(call_id, "dropping patch for unknown tool call");
        }
    }
}

fn subagent_started(
    state: &mut SessionState,
    ts_ms: i64,
    started: SubagentStarted,
    effects: &mut Vec<SessionEffect>,
) {
    let badge = SubagentBadge {
        name: started.agent_name.clone(),
        display_name: started.agent_display_name,
        description: started.agent_description,
    };
    if let Lookup::Found(entry) = state.correlator.lookup(&started.tool_call_id) {
        if let Some(call) = state.transcript.tool_call_mut(entry) {
            call.payload.subagent = Some(badge);
            effects.push(signal(UiSignal::EntryUpdated(entry)));
            return;
        }
    }

    detach_assistant(state);
    let title = match &badge.description {
        Some(description) if !description.trim().is_empty() => {
            format!("{}: {}", badge.label(), description.trim())
        }
        _ => badge.label().to_string(),
    };
    let entry = state.transcript.append(
        ts_ms,
        EntryBody::ToolCall(ToolCallEntry {
            tool_type: ToolClass::Generic,
            title,
            correlation_id: started.tool_call_id.clone(),
            payload: ToolPayload {
                tool_name: started.agent_name,
                arguments: Value::Null,
                subagent: Some(badge),
                ..ToolPayload::default()
            },
            completed: false,
            success: None,
            error: None,
        }),
    );
    if !started.tool_call_id.is_empty() {
        state.correlator.register(&started.tool_call_id, entry);
    }
    effects.push(signal(UiSignal::EntryAppended(entry)));
}

fn reasoning_delta(
    state: &mut SessionState,
    ts_ms: i64,
    delta: ReasoningDelta,
    effects: &mut Vec<SessionEffect>,
) {
    if delta.delta.is_empty() {
        return;
    }
    mark_responding(state, effects);
    let key = StreamKey::Reasoning(delta.reasoning_id.clone());
    match state.streams.entry_for(&key) {
        Some(entry) => {
            state
                .streams
                .append(&mut state.transcript, &key, &delta.delta);
            effects.push(signal(UiSignal::EntryUpdated(entry)));
        }
        None => {
            let entry = state.transcript.append(
                ts_ms,
                EntryBody::Reasoning(ReasoningEntry {
                    reasoning_id: delta.reasoning_id,
                    content: delta.delta,
                    streaming: true,
                }),
            );
            state.streams.open(key, entry);
            effects.push(signal(UiSignal::EntryAppended(entry)));
        }
    }
}

fn reasoning_final(
    state: &mut SessionState,
    ts_ms: i64,
    last: ReasoningFinal,
    effects: &mut Vec<SessionEffect>,
) {
    let key = StreamKey::Reasoning(last.reasoning_id.clone());
    if let Some(entry) = state.streams.finalize(&mut state.transcript, &key) {
        if let Some(content) = last.content.filter(|content| !content.is_empty()) {
            if let Some(EntryBody::Reasoning(reasoning)) = state
                .transcript
                .get_mut(entry)
                .map(|entry| &mut entry.body)
            {
                if reasoning.content.is_empty() {
                    reasoning.content = content;
                }
            }
        }
        effects.push(signal(UiSignal::EntryUpdated(entry)));
        return;
    }

    // Non-streaming reasoning arrives as a single final event.
    let Some(content) = last.content.filter(|content| !content.is_empty()) else {
        return;
    };
    let entry = state.transcript.append(
        ts_ms,
        EntryBody::Reasoning(ReasoningEntry {
            reasoning_id: last.reasoning_id,
            content,
            streaming: false,
        }),
    );
    effects.push(signal(UiSignal::EntryAppended(entry)));
}

fn ask_user(
    state: &mut SessionState,
    ts_ms: i64,
    request: AskUserRequest,
    effects: &mut Vec<SessionEffect>,
) {
    detach_assistant(state);
    mark_responding(state, effects);
    let entry = state.transcript.append(
        ts_ms,
        EntryBody::AskUser(AskUserEntry {
            request_id: request.request_id.clone(),
            question: request.question,
            choices: request.choices,
            allow_freeform: request.allow_freeform,
            answered: false,
            answer: None,
        }),
    );
    if !request.request_id.is_empty() {
        state.pending_questions.insert(request.request_id, entry);
    }
    effects.push(signal(UiSignal::EntryAppended(entry)));
}

fn ask_user_answered(
    state: &mut SessionState,
    answered: AskUserAnswered,
    effects: &mut Vec<SessionEffect>,
) {
    let Some(entry) = state.pending_questions.remove(&answered.request_id) else {
        state.diagnostics.unknown_correlation += 1;
        tracing::debug!(request_id = %answered.request_id, "answer for unknown question");
        return;
    };
    if let Some(EntryBody::AskUser(ask)) = state
        .transcript
        .get_mut(entry)
        .map(|entry| &mut entry.body)
    {
        ask.answered = true;
        ask.answer = Some(answered.answer);
        effects.push(signal(UiSignal::EntryUpdated(entry)));
    }
}

fn permission_requested(
    state: &mut SessionState,
    ts_ms: i64,
    requested: PermissionRequested,
    gate: Gate<'_>,
    effects: &mut Vec<SessionEffect>,
) {
    append_session_event(
        state,
        ts_ms,
        &AgentEvent::PermissionRequested(requested.clone()),
        effects,
    );
    let Gate::Live(policy) = gate else {
        return;
    };

    let decision = policy.evaluate(&requested.request, &state.session.working_root);
    if decision.is_allowed() {
        tracing::debug!(
            request_id = %requested.request_id,
            reason = ?decision.reason,
            "permission allowed by policy"
        );
        effects.push(SessionEffect::Agent(AgentCommand::RespondPermission {
            request_id: requested.request_id.clone(),
            decision: PermissionDecision::Allow,
        }));
        effects.push(SessionEffect::Record(AgentEvent::PermissionCompleted(
            PermissionCompleted {
                request_id: requested.request_id,
                decision: PermissionDecision::Allow,
                rule_path_prefix: None,
            },
        )));
        return;
    }

    let pending = PendingPermission {
        request_id: requested.request_id,
        tool_call_id: requested.tool_call_id,
        request: requested.request,
        decision,
        requested_at_ms: ts_ms,
    };
    if state.permissions.push(pending.clone()) {
        effects.push(signal(UiSignal::PermissionPrompt(Some(pending))));
    }
}

fn permission_completed(
    state: &mut SessionState,
    ts_ms: i64,
    completed: PermissionCompleted,
    effects: &mut Vec<SessionEffect>,
) {
    if state.permissions.remove(&completed.request_id) {
        effects.push(signal(UiSignal::PermissionPrompt(
            state.permissions.active.clone(),
        )));
    }
    append_session_event(
        state,
        ts_ms,
        &AgentEvent::PermissionCompleted(completed),
        effects,
    );
}

fn resolve_permission(
    state: &mut SessionState,
    request_id: String,
    decision: PermissionDecision,
    rule_path_prefix: Option<String>,
    effects: &mut Vec<SessionEffect>,
) {
    let Some(active) = state
        .permissions
        .active
        .clone()
        .filter(|active| active.request_id == request_id)
    else {
        state.diagnostics.ignored_host_actions += 1;
        tracing::debug!(%request_id, "decision for a prompt that is not active");
        return;
    };

    state.permissions.remove(&request_id);
    effects.push(signal(UiSignal::PermissionPrompt(
        state.permissions.active.clone(),
    )));
    effects.push(SessionEffect::Agent(AgentCommand::RespondPermission {
        request_id: request_id.clone(),
        decision,
    }));

    let mut recorded_prefix = None;
    if decision == PermissionDecision::Always {
        let prefix = rule_path_prefix
            .map(|prefix| normalize_path(&prefix))
            .filter(|prefix| !prefix.is_empty())
            .unwrap_or_else(|| default_rule_prefix(&active.request, &state.session.working_root));
        if prefix.is_empty() || active.request.kind == PermissionKind::Unknown {
            tracing::warn!(%request_id, "always-allow without a usable rule; allowing once");
        } else {
            effects.push(SessionEffect::PersistRule(PermissionRule::new(
                active.request.kind,
                &prefix,
            )));
            recorded_prefix = Some(prefix);
        }
    }

    effects.push(SessionEffect::Record(AgentEvent::PermissionCompleted(
        PermissionCompleted {
            request_id,
            decision,
            rule_path_prefix: recorded_prefix,
        },
    )));
}

/// Answer every pending prompt the policy now allows. The recorded
/// completions take the requests out of the queue.
fn recheck_permissions(
    state: &SessionState,
    policy: &PermissionPolicy,
    effects: &mut Vec<SessionEffect>,
) {
    let root = &state.session.working_root;
    let allowed: Vec<String> = state
        .permissions
        .active
        .iter()
        .chain(state.permissions.queued.iter())
        .filter(|pending| policy.evaluate(&pending.request, root).is_allowed())
        .map(|pending| pending.request_id.clone())
        .collect();
    for request_id in allowed {
        tracing::debug!(%request_id, "pending permission now allowed by policy");
        effects.push(SessionEffect::Agent(AgentCommand::RespondPermission {
            request_id: request_id.clone(),
            decision: PermissionDecision::Allow,
        }));
        effects.push(SessionEffect::Record(AgentEvent::PermissionCompleted(
            PermissionCompleted {
                request_id,
                decision: PermissionDecision::Allow,
                rule_path_prefix: None,
            },
        )));
    }
}

/// Shell rules cover the working root; file rules cover the directory that
/// holds the requested path.
fn default_rule_prefix(request: &PermissionRequest, working_root: &str) -> String {
    if request.kind == PermissionKind::Shell {
        return normalize_path(working_root);
    }
    let Some(target) = request.target_path() else {
        return normalize_path(working_root);
    };
    let resolved = resolve_path(target, working_root);
    std::path::Path::new(&resolved)
        .parent()
        .map(|parent| normalize_path(&parent.to_string_lossy()))
        .filter(|parent| !parent.is_empty() && parent != ".")
        .unwrap_or(resolved)
}

fn send_message(prompt: String, attachments: Vec<Attachment>, effects: &mut Vec<SessionEffect>) {
    if prompt.trim().is_empty() && attachments.is_empty() {
        return;
    }
    effects.push(SessionEffect::Record(AgentEvent::UserMessage(UserMessage {
        content: prompt.clone(),
        attachments: attachments.clone(),
    })));
    effects.push(SessionEffect::Agent(AgentCommand::SendMessage {
        prompt,
        attachments,
    }));
}

fn session_started(
    state: &mut SessionState,
    started: &SessionStarted,
    effects: &mut Vec<SessionEffect>,
) {
    if !started.session_id.is_empty() {
        state.session.session_id = Some(started.session_id.clone());
    }
    if let Some(root) = started.working_root.as_deref().filter(|root| !root.is_empty()) {
        state.session.working_root = root.to_string();
    }
    if let Some(model) = started.model.as_deref().filter(|model| !model.is_empty()) {
        if state.session.model.as_deref() != Some(model) {
            state.session.model = Some(model.to_string());
            effects.push(signal(UiSignal::ModelChanged(model.to_string())));
        }
    }
}

/// End of turn: close every stream, clear the intent and the preview.
fn settle_turn(state: &mut SessionState, effects: &mut Vec<SessionEffect>) {
    for entry in state.streams.finalize_all(&mut state.transcript) {
        effects.push(signal(UiSignal::EntryUpdated(entry)));
    }
    state.current_message_id = None;
    set_intent(state, "", effects);
    state.preview.clear();
    state.activity.turn_started_at_ms = None;
    set_activity(state, false, false, effects);
}

fn append_session_event(
    state: &mut SessionState,
    ts_ms: i64,
    event: &AgentEvent,
    effects: &mut Vec<SessionEffect>,
) {
    let mut payload = event.to_raw();
    if let Value::Object(fields) = &mut payload {
        fields.remove("kind");
    }
    let entry = state.transcript.append(
        ts_ms,
        EntryBody::SessionEvent(SessionEventEntry {
            event_kind: event.kind().to_string(),
            payload,
        }),
    );
    effects.push(signal(UiSignal::EntryAppended(entry)));
}

fn unrecognized_event(state: &mut SessionState, unrecognized: &UnrecognizedEvent) {
    match &unrecognized.reason {
        UnrecognizedReason::UnknownKind | UnrecognizedReason::MissingKind => {
            state.diagnostics.unknown_kinds += 1;
            tracing::debug!(kind = %unrecognized.kind, "ignoring unrecognized event kind");
        }
        UnrecognizedReason::Malformed(error) => {
            state.diagnostics.malformed_events += 1;
            tracing::warn!(kind = %unrecognized.kind, %error, "ignoring malformed event");
        }
    }
}

#[cfg(test)]
mod tests;
