//! A scripted two-turn session driven through the real host, for trying the
//! transcript and permission flow without an agent runtime.

use anyhow::Context;
use serde_json::json;
use serde_json::Value;
use tokio::sync::mpsc;

use chronicle_core::AgentEvent;
use chronicle_core::Config;
use chronicle_core::PermissionDecision;
use chronicle_core::PermissionPolicy;
use chronicle_core::SessionArchive;
use chronicle_core::SessionInfo;
use chronicle_core::SessionState;
use chronicle_core::UiSignal;
use chronicle_exec::HostCommand;
use chronicle_exec::ScriptedRuntime;
use chronicle_exec::SessionHost;

use crate::render;

const PROMPTS: [&str; 2] = ["Run the test suite", "Summarize what changed"];

pub struct DemoOptions {
    pub working_root: String,
    /// Answer given to every permission prompt.
    pub decision: PermissionDecision,
}

pub async fn run(
    config: &Config,
    policy: PermissionPolicy,
    archive: SessionArchive,
    options: DemoOptions,
) -> anyhow::Result<()> {
    let session = SessionInfo::new(options.working_root.clone());
    let state = SessionState::from_config(session, config).context("invalid tool patterns")?;
    let (runtime, events) = ScriptedRuntime::new(64);
    let runtime = script(&options.working_root)
        .into_iter()
        .fold(runtime, ScriptedRuntime::with_turn);
    let (host, mut signals) = SessionHost::new(state, policy, runtime);
    let (commands, command_rx) = mpsc::channel(16);
    let running = tokio::spawn(host.with_archive(archive).run(events, command_rx));

    commands
        .send(HostCommand::NewSession {
            working_root: options.working_root.clone(),
            model: config.model.default_model.clone(),
        })
        .await
        .context("session host stopped early")?;

    let mut prompts = PROMPTS.iter();
    if let Some(prompt) = prompts.next() {
        println!("> {prompt}");
        commands.send(message(prompt)).await?;
    }

    while let Some(signal) = signals.recv().await {
        if let Some(line) = render::signal_line(&signal) {
            println!("{line}");
        }
        match signal {
            UiSignal::PermissionPrompt(Some(pending)) => {
                println!("  answering {}", options.decision.label());
                commands
                    .send(HostCommand::ResolvePermission {
                        request_id: pending.request_id,
                        decision: options.decision,
                        rule_path_prefix: None,
                    })
                    .await?;
            }
            UiSignal::ActivityChanged {
                generating: false, ..
            } => match prompts.next() {
                Some(prompt) => {
                    println!("> {prompt}");
                    commands.send(message(prompt)).await?;
                }
                None => break,
            },
            _ => {}
        }
    }

    // The runtime closes its event stream after the last scripted turn.
    let host = running.await.context("session host panicked")??;
    println!();
    for line in render::transcript_lines(&host.state().transcript) {
        println!("{line}");
    }
    if let Some(log) = host.log() {
        println!();
        println!("recorded {} events to {}", log.len(), log.path().display());
    }
    Ok(())
}

fn message(prompt: &str) -> HostCommand {
    HostCommand::SendMessage {
        prompt: prompt.to_string(),
        attachments: Vec::new(),
    }
}

fn script(root: &str) -> Vec<Vec<AgentEvent>> {
    let manifest = format!("{}/Cargo.toml", root.trim_end_matches('/'));
    let first = [
        json!({ "kind": "turn-started", "turnId": "turn-1" }),
        json!({ "kind": "tool-start", "toolCallId": "call-intent", "toolName": "report_intent",
                "arguments": { "intent": "Running tests" } }),
        json!({ "kind": "reasoning-delta", "reasoningId": "r1", "delta": "Check the manifest, " }),
        json!({ "kind": "reasoning-delta", "reasoningId": "r1", "delta": "then run cargo test." }),
        json!({ "kind": "reasoning-final", "reasoningId": "r1" }),
        json!({ "kind": "tool-start", "toolCallId": "call-1", "toolName": "view",
                "arguments": { "path": manifest } }),
        json!({ "kind": "permission-requested", "requestId": "perm-1", "toolCallId": "call-1",
                "request": { "kind": "read", "path": manifest } }),
        json!({ "kind": "tool-complete", "toolCallId": "call-1", "success": true,
                "result": "[package]\nname = \"demo\"" }),
        json!({ "kind": "assistant-delta", "messageId": "msg-1", "delta": "The manifest looks fine. " }),
        json!({ "kind": "tool-start", "toolCallId": "call-2", "toolName": "bash",
                "arguments": { "command": "cargo test", "description": "Run the test suite" } }),
        json!({ "kind": "permission-requested", "requestId": "perm-2", "toolCallId": "call-2",
                "request": { "kind": "shell", "command": "cargo test" } }),
        json!({ "kind": "tool-partial-output", "toolCallId": "call-2", "output": "running 12 tests\n" }),
        json!({ "kind": "tool-complete", "toolCallId": "call-2", "success": true,
                "result": "test result: ok. 12 passed" }),
        json!({ "kind": "assistant-delta", "messageId": "msg-1", "delta": "All 12 tests pass." }),
        json!({ "kind": "assistant-final", "messageId": "msg-1" }),
        json!({ "kind": "usage-report", "model": "demo-model", "inputTokens": 1200, "outputTokens": 85 }),
        json!({ "kind": "turn-ended", "turnId": "turn-1" }),
        json!({ "kind": "session-idle" }),
    ];
    let second = [
        json!({ "kind": "assistant-delta", "messageId": "msg-2", "delta": "No files changed; " }),
        json!({ "kind": "assistant-delta", "messageId": "msg-2", "delta": "only tests were run." }),
        json!({ "kind": "assistant-final", "messageId": "msg-2" }),
        json!({ "kind": "session-idle" }),
    ];
    vec![events(first), events(second)]
}

fn events(raw: impl IntoIterator<Item = Value>) -> Vec<AgentEvent> {
    raw.into_iter().map(AgentEvent::from_raw).collect()
}

#[cfg(test)]
mod tests {
    use chronicle_core::events::UnrecognizedEvent;

    use super::*;

    #[test]
    fn every_scripted_event_is_recognized() {
        for turn in script("/work/demo") {
            for event in turn {
                assert!(
                    !matches!(event, AgentEvent::Unrecognized(UnrecognizedEvent { .. })),
                    "unrecognized scripted event: {event:?}"
                );
            }
        }
    }
}
