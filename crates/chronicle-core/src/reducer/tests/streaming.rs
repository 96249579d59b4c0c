use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;

#[test]
fn deltas_accumulate_into_one_assistant_entry() {
    let mut state = state();
    apply(&mut state, json!({ "kind": "assistant-delta", "delta": "Hel" }));
    apply(&mut state, json!({ "kind": "assistant-delta", "delta": "lo" }));

    assert_eq!(state.transcript.len(), 1);
    assert_eq!(assistant_text(&state, 0), ("Hello", true));

    apply(&mut state, json!({ "kind": "assistant-final" }));
    assert_eq!(assistant_text(&state, 0), ("Hello", false));
}

#[test]
fn final_does_not_release_the_current_message() {
    let mut state = state();
    apply(&mut state, json!({ "kind": "assistant-delta", "delta": "one" }));
    apply(&mut state, json!({ "kind": "assistant-final" }));
    apply(&mut state, json!({ "kind": "assistant-delta", "delta": " two" }));

    assert_eq!(state.transcript.len(), 1);
    assert_eq!(assistant_text(&state, 0), ("one two", true));
}

#[test]
fn tool_start_splits_assistant_text() {
    let mut state = state();
    apply(&mut state, json!({ "kind": "assistant-delta", "delta": "before" }));
    apply(
        &mut state,
        json!({ "kind": "tool-start", "toolCallId": "1", "toolName": "bash", "arguments": { "command": "ls" } }),
    );
    apply(&mut state, json!({ "kind": "assistant-delta", "delta": "after" }));

    let labels: Vec<_> = bodies(&state).iter().map(|body| body.label()).collect();
    assert_eq!(labels, vec!["assistant", "tool_call", "assistant"]);
    assert_eq!(assistant_text(&state, 0), ("before", true));
    assert_eq!(assistant_text(&state, 2), ("after", true));

    apply(&mut state, json!({ "kind": "session-idle" }));
    assert!(state.transcript.iter().all(|entry| !entry.body.is_streaming()));
}

#[test]
fn hidden_tool_start_still_splits_assistant_text() {
    let mut state = state();
    apply(&mut state, json!({ "kind": "assistant-delta", "delta": "a" }));
    apply(
        &mut state,
        json!({ "kind": "tool-start", "toolCallId": "i", "toolName": "report_intent", "arguments": {} }),
    );
    apply(&mut state, json!({ "kind": "assistant-delta", "delta": "b" }));
    assert_eq!(state.transcript.len(), 2);
}

#[test]
fn new_message_id_starts_a_new_entry() {
    let mut state = state();
    apply(
        &mut state,
        json!({ "kind": "assistant-delta", "messageId": "m1", "delta": "first" }),
    );
    apply(
        &mut state,
        json!({ "kind": "assistant-delta", "messageId": "m2", "delta": "second" }),
    );

    assert_eq!(assistant_text(&state, 0), ("first", false));
    assert_eq!(assistant_text(&state, 1), ("second", true));
}

#[test]
fn empty_delta_creates_nothing() {
    let mut state = state();
    let effects = apply(&mut state, json!({ "kind": "assistant-delta", "delta": "" }));
    assert!(state.transcript.is_empty());
    assert!(effects.is_empty());
}

#[test]
fn preview_holds_the_tail_and_clears_on_idle() {
    let mut state = state();
    let long = "x".repeat(200);
    apply(&mut state, json!({ "kind": "assistant-delta", "delta": long }));
    let effects = apply(&mut state, json!({ "kind": "assistant-delta", "delta": "END" }));

    let preview = signals(&effects)
        .into_iter()
        .find_map(|signal| match signal {
            UiSignal::Preview(text) => Some(text.clone()),
            _ => None,
        })
        .expect("preview signal");
    assert_eq!(preview.chars().count(), 120);
    assert!(preview.ends_with("xxEND"));

    apply(&mut state, json!({ "kind": "session-idle" }));
    assert!(state.preview.is_empty());
}

#[test]
fn reasoning_streams_are_keyed_by_id() {
    let mut state = state();
    apply(&mut state, json!({ "kind": "reasoning-delta", "reasoningId": "r1", "delta": "think" }));
    apply(&mut state, json!({ "kind": "reasoning-delta", "reasoningId": "r1", "delta": "ing" }));
    apply(&mut state, json!({ "kind": "reasoning-final", "reasoningId": "r1" }));

    assert_eq!(state.transcript.len(), 1);
    match &state.transcript.entries()[0].body {
        EntryBody::Reasoning(reasoning) => {
            assert_eq!(reasoning.reasoning_id, "r1");
            assert_eq!(reasoning.content, "thinking");
            assert!(!reasoning.streaming);
        }
        other => panic!("expected reasoning, got {}", other.label()),
    }
}

#[test]
fn reasoning_final_without_stream_appends_closed_entry_when_it_has_content() {
    let mut state = state();
    apply(&mut state, json!({ "kind": "reasoning-final", "reasoningId": "r9" }));
    assert!(state.transcript.is_empty());

    apply(
        &mut state,
        json!({ "kind": "reasoning-final", "reasoningId": "r9", "content": "whole thought" }),
    );
    assert_eq!(state.transcript.len(), 1);
    assert!(!state.transcript.entries()[0].body.is_streaming());
}

#[test]
fn abort_leaves_streams_open_until_closed() {
    let mut state = state();
    let policy = policy();
    apply(&mut state, json!({ "kind": "assistant-delta", "delta": "partial" }));
    apply(&mut state, json!({ "kind": "reasoning-delta", "reasoningId": "r", "delta": "hm" }));

    let effects = host(&mut state, &policy, HostAction::Abort);
    assert_eq!(agent_commands(&effects), vec![&AgentCommand::Abort]);
    assert!(state.transcript.iter().all(|entry| entry.body.is_streaming()));

    host(&mut state, &policy, HostAction::CloseStreams);
    assert!(state.transcript.iter().all(|entry| !entry.body.is_streaming()));
}
