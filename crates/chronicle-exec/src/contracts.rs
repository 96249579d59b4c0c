use async_trait::async_trait;
use thiserror::Error;

use chronicle_core::events::Attachment;
use chronicle_core::PermissionDecision;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("agent runtime is not connected")]
    Disconnected,

    #[error("agent runtime rejected {command}: {message}")]
    Rejected {
        command: &'static str,
        message: String,
    },
}

/// Outbound side of an agent runtime. Events flow the other way, through the
/// channel handed to [`SessionHost::run`](crate::host::SessionHost::run).
#[async_trait]
pub trait AgentRuntime: Send {
    fn name(&self) -> &'static str;

    async fn send_message(
        &mut self,
        prompt: &str,
        attachments: &[Attachment],
    ) -> Result<(), RuntimeError>;

    async fn abort(&mut self) -> Result<(), RuntimeError>;

    async fn respond_permission(
        &mut self,
        request_id: &str,
        decision: PermissionDecision,
    ) -> Result<(), RuntimeError>;

    async fn respond_user_input(&mut self, request_id: &str, answer: &str)
        -> Result<(), RuntimeError>;
}

/// Requests from the UI side of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    SendMessage {
        prompt: String,
        attachments: Vec<Attachment>,
    },
    Abort,
    ResolvePermission {
        request_id: String,
        decision: PermissionDecision,
        rule_path_prefix: Option<String>,
    },
    AnswerUser {
        request_id: String,
        answer: String,
    },
    /// Close streams left open by an abort.
    CloseStreams,
    SetAutoApprove(bool),
    NewSession {
        working_root: String,
        model: Option<String>,
    },
    Shutdown,
}
