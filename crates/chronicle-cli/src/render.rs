//! Plain-text rendering of transcripts and live signals for the terminal.

use serde_json::Value;

use chronicle_core::policy_engine::PolicyDecision;
use chronicle_core::EntryBody;
use chronicle_core::PendingPermission;
use chronicle_core::Transcript;
use chronicle_core::TranscriptEntry;
use chronicle_core::UiSignal;

const SUMMARY_CHARS: usize = 100;

pub fn transcript_lines(transcript: &Transcript) -> Vec<String> {
    transcript.iter().map(entry_line).collect()
}

pub fn entry_line(entry: &TranscriptEntry) -> String {
    let id = entry.id.0;
    match &entry.body {
        EntryBody::User(user) => {
            let mut line = format!("#{id} > {}", user.content);
            if !user.attachments.is_empty() {
                line.push_str(&format!(" [{}]", user.attachments.join(", ")));
            }
            line
        }
        EntryBody::Assistant(reply) => {
            let marker = if reply.streaming { " [streaming]" } else { "" };
            format!("#{id} {}{marker}", reply.content)
        }
        EntryBody::ToolCall(call) => {
            let status = match (call.completed, call.success) {
                (false, _) => "running",
                (true, Some(false)) => "failed",
                (true, _) => "done",
            };
            let mut line = format!(
                "#{id} [{status}] {} ({})",
                call.title,
                call.tool_type.as_str()
            );
            if let Some(badge) = &call.payload.subagent {
                line.push_str(&format!(" <{}>", badge.label()));
            }
            if let Some(error) = &call.error {
                line.push_str(&format!(": {error}"));
            }
            line
        }
        EntryBody::Reasoning(reasoning) => {
            format!("#{id} (thinking) {}", clip(&reasoning.content))
        }
        EntryBody::AskUser(question) => {
            let answer = match &question.answer {
                Some(answer) => format!(" = {answer}"),
                None => " (unanswered)".to_string(),
            };
            format!("#{id} ? {}{answer}", question.question)
        }
        EntryBody::SessionEvent(event) => {
            format!("#{id} -- {} {}", event.event_kind, payload_summary(&event.payload))
        }
    }
}

/// One line for the signals a terminal cares about; `None` for the rest.
pub fn signal_line(signal: &UiSignal) -> Option<String> {
    match signal {
        UiSignal::IntentChanged(Some(intent)) => Some(format!("intent: {intent}")),
        UiSignal::PermissionPrompt(Some(pending)) => Some(prompt_line(pending)),
        UiSignal::ModelChanged(model) => Some(format!("model: {model}")),
        UiSignal::UsageUpdated(usage) => Some(format!(
            "usage: {} in / {} out tokens",
            usage.input_tokens, usage.output_tokens
        )),
        UiSignal::TranscriptReset => Some("new transcript".to_string()),
        _ => None,
    }
}

pub fn prompt_line(pending: &PendingPermission) -> String {
    format!(
        "permission {}: {} ({})",
        pending.request_id,
        pending.request.summary(),
        pending.decision.message
    )
}

pub fn decision_line(decision: &PolicyDecision) -> String {
    format!("{}: {}", decision.decision.label(), decision.message)
}

fn payload_summary(payload: &Value) -> String {
    if let Some(message) = payload.get("message").and_then(Value::as_str) {
        return clip(message);
    }
    match payload {
        Value::Object(fields) if fields.is_empty() => String::new(),
        other => clip(&other.to_string()),
    }
}

fn clip(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() <= SUMMARY_CHARS {
        return line.to_string();
    }
    let mut clipped: String = line.chars().take(SUMMARY_CHARS).collect();
    clipped.push_str("...");
    clipped
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use chronicle_core::transcript::AssistantEntry;
    use chronicle_core::transcript::SessionEventEntry;
    use chronicle_core::transcript::UserEntry;

    use super::*;

    #[test]
    fn renders_one_line_per_entry() {
        let mut transcript = Transcript::new();
        transcript.append(
            0,
            EntryBody::User(UserEntry {
                content: "fix it".to_string(),
                attachments: vec!["src/lib.rs".to_string()],
            }),
        );
        transcript.append(
            1,
            EntryBody::Assistant(AssistantEntry {
                content: "On it".to_string(),
                streaming: true,
            }),
        );
        transcript.append(
            2,
            EntryBody::SessionEvent(SessionEventEntry {
                event_kind: "session-error".to_string(),
                payload: json!({ "message": "rate limited\nretrying", "errorType": "runtime" }),
            }),
        );

        assert_eq!(
            transcript_lines(&transcript),
            vec![
                "#1 > fix it [src/lib.rs]".to_string(),
                "#2 On it [streaming]".to_string(),
                "#3 -- session-error rate limited".to_string(),
            ]
        );
    }

    #[test]
    fn long_payloads_are_clipped() {
        let long = "x".repeat(150);
        let summary = payload_summary(&json!({ "message": long }));
        assert_eq!(summary.chars().count(), SUMMARY_CHARS + 3);
        assert!(summary.ends_with("..."));
        assert_eq!(payload_summary(&json!({})), "");
    }
}
