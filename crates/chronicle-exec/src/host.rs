//! Serializes runtime events and UI commands into the reducer and carries out
//! the effects it returns.

use std::collections::VecDeque;

use thiserror::Error;
use tokio::sync::mpsc;

use chronicle_core::events::SessionMessage;
use chronicle_core::events::SessionStarted;
use chronicle_core::reduce;
use chronicle_core::AgentCommand;
use chronicle_core::AgentEvent;
use chronicle_core::EventLogError;
use chronicle_core::EventLogHeader;
use chronicle_core::Gate;
use chronicle_core::HostAction;
use chronicle_core::PermissionPolicy;
use chronicle_core::PermissionRule;
use chronicle_core::SessionAction;
use chronicle_core::SessionArchive;
use chronicle_core::SessionEffect;
use chronicle_core::SessionEventLog;
use chronicle_core::SessionInfo;
use chronicle_core::SessionState;
use chronicle_core::TimedEvent;
use chronicle_core::UiSignal;

use crate::contracts::AgentRuntime;
use crate::contracts::HostCommand;
use crate::contracts::RuntimeError;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("session log failure: {0}")]
    Log(#[from] EventLogError),
}

/// Owns one session: its reducer state, the permission policy, the runtime
/// and, optionally, the log every reduced event is appended to.
pub struct SessionHost<R> {
    state: SessionState,
    policy: PermissionPolicy,
    runtime: R,
    log: Option<SessionEventLog>,
    archive: Option<SessionArchive>,
    signals: mpsc::UnboundedSender<UiSignal>,
}

impl<R: AgentRuntime> SessionHost<R> {
    pub fn new(
        state: SessionState,
        policy: PermissionPolicy,
        runtime: R,
    ) -> (Self, mpsc::UnboundedReceiver<UiSignal>) {
        let (signals, signal_rx) = mpsc::unbounded_channel();
        let host = Self {
            state,
            policy,
            runtime,
            log: None,
            archive: None,
            signals,
        };
        (host, signal_rx)
    }

    pub fn with_log(mut self, log: SessionEventLog) -> Self {
        self.log = Some(log);
        self
    }

    /// New sessions started through [`HostCommand::NewSession`] get a fresh
    /// log in this archive.
    pub fn with_archive(mut self, archive: SessionArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn policy(&self) -> &PermissionPolicy {
        &self.policy
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn log(&self) -> Option<&SessionEventLog> {
        self.log.as_ref()
    }

    /// Process events and commands one at a time until the event stream
    /// closes or a [`HostCommand::Shutdown`] arrives. Returns the host so the
    /// caller can inspect the final state.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<AgentEvent>,
        mut commands: mpsc::Receiver<HostCommand>,
    ) -> Result<Self, HostError> {
        tracing::info!(
            runtime = self.runtime.name(),
            session_id = ?self.state.session.session_id,
            "session host started"
        );
        let mut commands_open = true;
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.dispatch(SessionAction::Agent(TimedEvent::now(event))).await,
                    None => {
                        tracing::debug!("agent event stream closed");
                        break;
                    }
                },
                command = commands.recv(), if commands_open => match command {
                    Some(HostCommand::Shutdown) => break,
                    Some(command) => self.handle_command(command).await?,
                    None => commands_open = false,
                },
            }
        }
        tracing::info!(
            session_id = ?self.state.session.session_id,
            entries = self.state.transcript.len(),
            "session host stopped"
        );
        Ok(self)
    }

    async fn handle_command(&mut self, command: HostCommand) -> Result<(), HostError> {
        let action = match command {
            HostCommand::SendMessage {
                prompt,
                attachments,
            } => HostAction::SendMessage {
                prompt,
                attachments,
            },
            HostCommand::Abort => HostAction::Abort,
            HostCommand::ResolvePermission {
                request_id,
                decision,
                rule_path_prefix,
            } => HostAction::ResolvePermission {
                request_id,
                decision,
                rule_path_prefix,
            },
            HostCommand::AnswerUser { request_id, answer } => {
                HostAction::AnswerUser { request_id, answer }
            }
            HostCommand::CloseStreams => HostAction::CloseStreams,
            HostCommand::SetAutoApprove(enabled) => {
                tracing::info!(enabled, "auto-approve changed");
                self.policy.set_auto_approve(enabled);
                return Ok(());
            }
            HostCommand::NewSession {
                working_root,
                model,
            } => return self.start_session(working_root, model).await,
            HostCommand::Shutdown => return Ok(()),
        };
        self.dispatch(SessionAction::Host(action)).await;
        Ok(())
    }

    async fn start_session(
        &mut self,
        working_root: String,
        model: Option<String>,
    ) -> Result<(), HostError> {
        let header = match &self.archive {
            Some(archive) => {
                let log = archive.create(&working_root, model.clone())?;
                let header = log.header().clone();
                self.log = Some(log);
                header
            }
            None => {
                self.log = None;
                EventLogHeader::new(uuid::Uuid::new_v4().to_string(), working_root.clone())
                    .with_model(model.clone())
            }
        };
        tracing::info!(session_id = %header.session_id, %working_root, "new session");

        let session = SessionInfo::new(working_root.clone())
            .with_model(model.clone())
            .with_session_id(header.session_id.clone());
        self.dispatch(SessionAction::Host(HostAction::NewSession(session)))
            .await;
        let started = AgentEvent::SessionStarted(SessionStarted {
            session_id: header.session_id,
            working_root: Some(working_root),
            model,
        });
        self.dispatch(SessionAction::Agent(TimedEvent::now(started)))
            .await;
        Ok(())
    }

    /// Reduce `action` and carry out its effects. Recorded events and
    /// failures reported as events go through the same path, after the
    /// effects already queued.
    async fn dispatch(&mut self, action: SessionAction) {
        let mut pending = VecDeque::from([action]);
        while let Some(action) = pending.pop_front() {
            if let SessionAction::Agent(timed) = &action {
                self.append_to_log(timed);
            }
            let effects = reduce(&mut self.state, action, Gate::Live(&self.policy));
            for effect in effects {
                match effect {
                    SessionEffect::Signal(signal) => {
                        // A closed receiver only means nobody is rendering.
                        let _ = self.signals.send(signal);
                    }
                    SessionEffect::Agent(command) => {
                        if let Err(err) = self.send_to_runtime(command).await {
                            tracing::warn!(%err, "agent runtime command failed");
                            pending.push_back(report("runtime", err.to_string(), true));
                        }
                    }
                    SessionEffect::PersistRule(rule) => {
                        pending.push_back(self.persist_rule(&rule));
                    }
                    SessionEffect::Record(event) => {
                        pending.push_back(SessionAction::Agent(TimedEvent::now(event)));
                    }
                }
            }
        }
    }

    fn append_to_log(&mut self, timed: &TimedEvent) {
        let Some(log) = self.log.as_mut() else {
            return;
        };
        if let Err(err) = log.append(timed) {
            tracing::warn!(path = %log.path().display(), %err, "failed to record session event");
        }
    }

    /// Save `rule` and return the follow-up: a recheck of the pending
    /// prompts on success, a warning event on failure.
    fn persist_rule(&mut self, rule: &PermissionRule) -> SessionAction {
        match self.policy.add_rule(rule.kind, &rule.path_prefix) {
            Ok(added) => {
                tracing::info!(kind = rule.kind.label(), prefix = %rule.path_prefix, added, "always-allow rule saved");
                SessionAction::Host(HostAction::RecheckPermissions)
            }
            Err(err) => {
                tracing::warn!(%err, "failed to save always-allow rule");
                report(
                    "rules",
                    format!("could not save always-allow rule: {err}"),
                    false,
                )
            }
        }
    }

    async fn send_to_runtime(&mut self, command: AgentCommand) -> Result<(), RuntimeError> {
        tracing::debug!(runtime = self.runtime.name(), ?command, "agent command");
        match command {
            AgentCommand::SendMessage {
                prompt,
                attachments,
            } => self.runtime.send_message(&prompt, &attachments).await,
            AgentCommand::Abort => self.runtime.abort().await,
            AgentCommand::RespondPermission {
                request_id,
                decision,
            } => self.runtime.respond_permission(&request_id, decision).await,
            AgentCommand::RespondUserInput { request_id, answer } => {
                self.runtime.respond_user_input(&request_id, &answer).await
            }
        }
    }
}

fn report(error_type: &str, message: String, is_error: bool) -> SessionAction {
    let message = SessionMessage {
        message,
        error_type: Some(error_type.to_string()),
    };
    let event = if is_error {
        AgentEvent::SessionError(message)
    } else {
        AgentEvent::SessionWarning(message)
    };
    SessionAction::Agent(TimedEvent::now(event))
}
