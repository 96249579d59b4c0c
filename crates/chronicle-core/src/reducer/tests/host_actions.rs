use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::events::Attachment;
use crate::events::UserMessage;

#[test]
fn send_message_records_before_sending() {
    let mut state = state();
    let policy = policy();
    let attachments = vec![Attachment {
        path: "/repo/a.rs".to_string(),
        display_name: None,
    }];
    let effects = host(
        &mut state,
        &policy,
        HostAction::SendMessage {
            prompt: "explain".to_string(),
            attachments: attachments.clone(),
        },
    );

    assert_eq!(
        effects,
        vec![
            SessionEffect::Record(AgentEvent::UserMessage(UserMessage {
                content: "explain".to_string(),
                attachments: attachments.clone(),
            })),
            SessionEffect::Agent(AgentCommand::SendMessage {
                prompt: "explain".to_string(),
                attachments,
            }),
        ]
    );
    assert!(state.transcript.is_empty());
}

#[test]
fn blank_prompt_is_not_sent() {
    let mut state = state();
    let policy = policy();
    let effects = host(
        &mut state,
        &policy,
        HostAction::SendMessage {
            prompt: "   ".to_string(),
            attachments: Vec::new(),
        },
    );
    assert!(effects.is_empty());
}

#[test]
fn abort_drops_pending_prompts() {
    let mut state = state();
    let policy = policy();
    apply(&mut state, json!({ "kind": "user-message", "content": "go" }));
    apply_live(
        &mut state,
        &policy,
        json!({ "kind": "permission-requested", "requestId": "w", "request": { "kind": "write", "path": "/etc/x" } }),
    );
    apply_live(
        &mut state,
        &policy,
        json!({ "kind": "permission-requested", "requestId": "v", "request": { "kind": "write", "path": "/etc/y" } }),
    );

    let effects = host(&mut state, &policy, HostAction::Abort);
    assert!(state.permissions.is_empty());
    assert_eq!(
        signals(&effects),
        vec![
            &UiSignal::PermissionPrompt(None),
            &UiSignal::ActivityChanged {
                waiting: false,
                generating: false,
            },
        ]
    );
}

#[test]
fn new_session_clears_the_transcript() {
    let mut state = state();
    let policy = policy();
    apply(&mut state, json!({ "kind": "user-message", "content": "hi" }));
    apply(&mut state, json!({ "kind": "tool-start", "toolCallId": "1", "toolName": "bash" }));

    let effects = host(
        &mut state,
        &policy,
        HostAction::NewSession(SessionInfo::new("/other").with_session_id("fresh")),
    );
    assert_eq!(signals(&effects), vec![&UiSignal::TranscriptReset]);
    assert!(state.transcript.is_empty());
    assert_eq!(state.correlator.open_count(), 0);
    assert_eq!(state.session.working_root, "/other");

    apply(&mut state, json!({ "kind": "user-message", "content": "again" }));
    assert_eq!(state.transcript.entries()[0].id, EntryId(1));
}
