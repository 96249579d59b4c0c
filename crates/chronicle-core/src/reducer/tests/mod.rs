use serde_json::Value;

pub(super) use super::reduce;
pub(super) use super::Gate;
pub(super) use crate::actions::AgentCommand;
pub(super) use crate::actions::HostAction;
pub(super) use crate::actions::SessionAction;
pub(super) use crate::actions::SessionEffect;
pub(super) use crate::actions::UiSignal;
pub(super) use crate::events::AgentEvent;
pub(super) use crate::events::PermissionDecision;
pub(super) use crate::events::TimedEvent;
pub(super) use crate::policy_engine::PermissionKind;
pub(super) use crate::policy_engine::PermissionPolicy;
pub(super) use crate::policy_engine::PermissionRule;
pub(super) use crate::rules::MemoryRuleStore;
pub(super) use crate::state::SessionInfo;
pub(super) use crate::state::SessionState;
pub(super) use crate::tool_registry::ToolClass;
pub(super) use crate::transcript::EntryBody;
pub(super) use crate::transcript::EntryId;
pub(super) use crate::transcript::ToolCallEntry;

mod host_actions;
mod streaming;
mod tool_calls;

const ROOT: &str = "/repo";

fn state() -> SessionState {
    SessionState::new(SessionInfo::new(ROOT))
}

fn policy() -> PermissionPolicy {
    PermissionPolicy::open(Box::new(MemoryRuleStore::default())).expect("memory store")
}

/// Feed one raw wire event without a policy, as replay does.
fn apply(state: &mut SessionState, raw: Value) -> Vec<SessionEffect> {
    let ts_ms = state.transcript.len() as i64;
    reduce(
        state,
        SessionAction::Agent(TimedEvent::new(ts_ms, AgentEvent::from_raw(raw))),
        Gate::Replay,
    )
}

fn apply_live(state: &mut SessionState, policy: &PermissionPolicy, raw: Value) -> Vec<SessionEffect> {
    let ts_ms = state.transcript.len() as i64;
    reduce(
        state,
        SessionAction::Agent(TimedEvent::new(ts_ms, AgentEvent::from_raw(raw))),
        Gate::Live(policy),
    )
}

fn host(state: &mut SessionState, policy: &PermissionPolicy, action: HostAction) -> Vec<SessionEffect> {
    reduce(state, SessionAction::Host(action), Gate::Live(policy))
}

/// Reduce the events a host would log after executing `effects`.
fn record(state: &mut SessionState, policy: &PermissionPolicy, effects: &[SessionEffect]) {
    for effect in effects {
        if let SessionEffect::Record(event) = effect {
            let raw = event.to_raw();
            apply_live(state, policy, raw);
        }
    }
}

fn bodies(state: &SessionState) -> Vec<&EntryBody> {
    state.transcript.iter().map(|entry| &entry.body).collect()
}

fn tool_call(state: &SessionState, index: usize) -> &ToolCallEntry {
    match &state.transcript.entries()[index].body {
        EntryBody::ToolCall(call) => call,
        other => panic!("expected tool call at {index}, got {}", other.label()),
    }
}

fn assistant_text(state: &SessionState, index: usize) -> (&str, bool) {
    match &state.transcript.entries()[index].body {
        EntryBody::Assistant(assistant) => (assistant.content.as_str(), assistant.streaming),
        other => panic!("expected assistant at {index}, got {}", other.label()),
    }
}

fn signals(effects: &[SessionEffect]) -> Vec<&UiSignal> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            SessionEffect::Signal(signal) => Some(signal),
            _ => None,
        })
        .collect()
}

fn agent_commands(effects: &[SessionEffect]) -> Vec<&AgentCommand> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            SessionEffect::Agent(command) => Some(command),
            _ => None,
        })
        .collect()
}
