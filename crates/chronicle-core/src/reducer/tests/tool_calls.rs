use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;

#[test]
fn start_then_complete_yields_one_completed_entry() {
    let mut state = state();
    apply(
        &mut state,
        json!({ "kind": "tool-start", "toolCallId": "7", "toolName": "bash", "arguments": { "command": "cargo test" } }),
    );
    apply(
        &mut state,
        json!({ "kind": "tool-complete", "toolCallId": "7", "success": true, "result": "ok" }),
    );

    assert_eq!(state.transcript.len(), 1);
    let call = tool_call(&state, 0);
    assert_eq!(call.tool_type, ToolClass::Shell);
    assert_eq!(call.title, "cargo test");
    assert!(call.completed);
    assert_eq!(call.success, Some(true));
    assert_eq!(call.payload.result.as_deref(), Some("ok"));
    assert_eq!(state.correlator.open_count(), 0);
}

#[test]
fn stray_complete_is_a_counted_no_op() {
    let mut state = state();
    apply(&mut state, json!({ "kind": "user-message", "content": "hi" }));
    let effects = apply(
        &mut state,
        json!({ "kind": "tool-complete", "toolCallId": "99", "success": true }),
    );

    assert_eq!(state.transcript.len(), 1);
    assert!(effects.is_empty());
    assert_eq!(state.diagnostics.unknown_correlation, 1);
}

#[test]
fn partial_output_and_progress_patch_in_place() {
    let mut state = state();
    apply(
        &mut state,
        json!({ "kind": "tool-start", "toolCallId": "a", "toolName": "bash", "arguments": { "command": "make" } }),
    );
    apply(&mut state, json!({ "kind": "tool-partial-output", "toolCallId": "a", "output": "cc -c x.c\n" }));
    apply(&mut state, json!({ "kind": "tool-partial-output", "toolCallId": "a", "output": "cc -o x\n" }));
    apply(&mut state, json!({ "kind": "tool-progress", "toolCallId": "a", "message": "linking" }));
    apply(
        &mut state,
        json!({ "kind": "tool-complete", "toolCallId": "a", "success": false, "error": "exit 2" }),
    );

    let call = tool_call(&state, 0);
    assert_eq!(call.payload.partial_output, "cc -c x.c\ncc -o x\n");
    assert_eq!(call.payload.progress_message.as_deref(), Some("linking"));
    assert_eq!(call.success, Some(false));
    assert_eq!(call.error.as_deref(), Some("exit 2"));
}

#[test]
fn tools_are_classified_and_titled() {
    let mut state = state();
    apply(
        &mut state,
        json!({ "kind": "tool-start", "toolCallId": "1", "toolName": "edit", "arguments": { "path": "/repo/src/lib.rs", "old_str": "a" } }),
    );
    apply(
        &mut state,
        json!({ "kind": "tool-start", "toolCallId": "2", "toolName": "view", "arguments": { "filePath": "/repo/README.md" } }),
    );
    apply(
        &mut state,
        json!({ "kind": "tool-start", "toolCallId": "3", "toolName": "web_fetch", "arguments": { "url": "https://example.com" } }),
    );
    apply(
        &mut state,
        json!({ "kind": "tool-start", "toolCallId": "4", "toolName": "think" }),
    );

    let summary: Vec<_> = (0..4)
        .map(|index| {
            let call = tool_call(&state, index);
            (call.tool_type, call.title.as_str())
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            (ToolClass::FileEdit, "/repo/src/lib.rs"),
            (ToolClass::FileRead, "/repo/README.md"),
            (ToolClass::Generic, "https://example.com"),
            (ToolClass::Generic, "think"),
        ]
    );
}

#[test]
fn intent_tool_is_hidden_and_updates_intent() {
    let mut state = state();
    let effects = apply(
        &mut state,
        json!({ "kind": "tool-start", "toolCallId": "i1", "toolName": "report_intent", "arguments": { "intent": "Exploring codebase" } }),
    );
    assert!(state.transcript.is_empty());
    assert_eq!(state.intent.as_deref(), Some("Exploring codebase"));
    assert!(signals(&effects).contains(&&UiSignal::IntentChanged(Some(
        "Exploring codebase".to_string()
    ))));

    apply(&mut state, json!({ "kind": "tool-complete", "toolCallId": "i1", "success": true }));
    assert!(state.transcript.is_empty());
    assert_eq!(state.diagnostics.hidden_patches, 1);
    assert_eq!(state.diagnostics.unknown_correlation, 0);
}

#[test]
fn reused_call_id_closes_the_superseded_entry() {
    let mut state = state();
    let start = json!({ "kind": "tool-start", "toolCallId": "dup", "toolName": "bash", "arguments": { "command": "a" } });
    apply(&mut state, start.clone());
    let effects = apply(&mut state, start);
    assert!(signals(&effects).contains(&&UiSignal::EntryUpdated(EntryId(1))));
    apply(&mut state, json!({ "kind": "tool-complete", "toolCallId": "dup", "success": true }));

    let superseded = tool_call(&state, 0);
    assert!(superseded.completed);
    assert_eq!(superseded.success, Some(false));
    assert_eq!(superseded.error.as_deref(), Some("superseded"));
    assert_eq!(tool_call(&state, 1).success, Some(true));
}

#[test]
fn hidden_start_closes_the_visible_call_it_replaces() {
    let mut state = state();
    apply(
        &mut state,
        json!({ "kind": "tool-start", "toolCallId": "x", "toolName": "bash", "arguments": { "command": "ls" } }),
    );
    apply(
        &mut state,
        json!({ "kind": "tool-start", "toolCallId": "x", "toolName": "report_intent", "arguments": { "intent": "Looking" } }),
    );
    apply(&mut state, json!({ "kind": "tool-complete", "toolCallId": "x", "success": true }));

    assert_eq!(state.transcript.len(), 1);
    let call = tool_call(&state, 0);
    assert!(call.completed);
    assert_eq!(call.success, Some(false));
    assert_eq!(state.diagnostics.hidden_patches, 1);
}

#[test]
fn subagent_attaches_to_its_task_tool_call() {
    let mut state = state();
    apply(
        &mut state,
        json!({ "kind": "tool-start", "toolCallId": "t1", "toolName": "task", "arguments": { "description": "Survey tests" } }),
    );
    apply(
        &mut state,
        json!({ "kind": "subagent-started", "toolCallId": "t1", "agentName": "explore", "agentDisplayName": "Explorer" }),
    );
    apply(&mut state, json!({ "kind": "subagent-completed", "toolCallId": "t1", "agentName": "explore" }));
    apply(&mut state, json!({ "kind": "tool-complete", "toolCallId": "t1", "success": true, "result": "done" }));

    assert_eq!(state.transcript.len(), 1);
    let call = tool_call(&state, 0);
    assert_eq!(call.title, "Survey tests");
    assert_eq!(
        call.payload.subagent.as_ref().map(|badge| badge.label()),
        Some("Explorer")
    );
    assert_eq!(call.payload.result.as_deref(), Some("done"));
    assert_eq!(state.diagnostics.unknown_correlation, 0);
}

#[test]
fn standalone_subagent_gets_its_own_generic_entry() {
    let mut state = state();
    apply(
        &mut state,
        json!({ "kind": "subagent-started", "toolCallId": "s1", "agentName": "reviewer", "agentDescription": "Reviews diffs" }),
    );
    apply(
        &mut state,
        json!({ "kind": "subagent-failed", "toolCallId": "s1", "agentName": "reviewer", "error": "timeout" }),
    );

    let call = tool_call(&state, 0);
    assert_eq!(call.tool_type, ToolClass::Generic);
    assert_eq!(call.title, "reviewer: Reviews diffs");
    assert!(call.completed);
    assert_eq!(call.success, Some(false));
    assert_eq!(call.error.as_deref(), Some("timeout"));
}

#[test]
fn null_success_still_closes_the_call() {
    let mut state = state();
    apply(
        &mut state,
        json!({ "kind": "tool-start", "toolCallId": "8", "toolName": "bash", "arguments": { "command": "ls" } }),
    );
    apply(
        &mut state,
        json!({ "kind": "tool-complete", "toolCallId": "8", "success": null, "error": null }),
    );

    let call = tool_call(&state, 0);
    assert!(call.completed);
    assert_eq!(call.success, Some(false));
    assert_eq!(state.correlator.open_count(), 0);
    assert_eq!(state.diagnostics.malformed_events, 0);
}
