use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use chronicle_core::events::AskUserRequest;
use chronicle_core::events::Attachment;
use chronicle_core::events::PermissionRequested;
use chronicle_core::events::SessionIdle;
use chronicle_core::events::ToolComplete;
use chronicle_core::AgentCommand;
use chronicle_core::AgentEvent;
use chronicle_core::PermissionDecision;

use crate::contracts::AgentRuntime;
use crate::contracts::RuntimeError;

/// Events one `send_message` plays back.
pub type Turn = Vec<AgentEvent>;

#[derive(Default)]
struct Waiters {
    permissions: HashMap<String, oneshot::Sender<PermissionDecision>>,
    questions: HashMap<String, oneshot::Sender<String>>,
}

/// Shared record of every command a [`ScriptedRuntime`] received.
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    commands: Arc<Mutex<Vec<AgentCommand>>>,
}

impl CommandLog {
    fn push(&self, command: AgentCommand) {
        lock(&self.commands).push(command);
    }

    pub fn snapshot(&self) -> Vec<AgentCommand> {
        lock(&self.commands).clone()
    }
}

/// An in-process runtime that answers each message with a prepared turn.
///
/// Playback pauses at `permission-requested` and `ask-user-request` events
/// until the host responds. A denied permission turns the rest of that tool
/// call into a failed completion. Once the last turn is handed out the
/// runtime lets go of its event sender, so the event stream closes when that
/// turn finishes playing.
pub struct ScriptedRuntime {
    events: Option<mpsc::Sender<AgentEvent>>,
    turns: VecDeque<Turn>,
    waiters: Arc<Mutex<Waiters>>,
    log: CommandLog,
    playing: Option<JoinHandle<()>>,
}

impl ScriptedRuntime {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AgentEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let runtime = Self {
            events: Some(tx),
            turns: VecDeque::new(),
            waiters: Arc::new(Mutex::new(Waiters::default())),
            log: CommandLog::default(),
            playing: None,
        };
        (runtime, rx)
    }

    pub fn with_turn(mut self, turn: Turn) -> Self {
        self.turns.push_back(turn);
        self
    }

    pub fn command_log(&self) -> CommandLog {
        self.log.clone()
    }

    pub fn remaining_turns(&self) -> usize {
        self.turns.len()
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn send_message(
        &mut self,
        prompt: &str,
        attachments: &[Attachment],
    ) -> Result<(), RuntimeError> {
        self.log.push(AgentCommand::SendMessage {
            prompt: prompt.to_string(),
            attachments: attachments.to_vec(),
        });
        let Some(turn) = self.turns.pop_front() else {
            return Err(RuntimeError::Rejected {
                command: "send_message",
                message: "no scripted turns left".to_string(),
            });
        };
        let tx = if self.turns.is_empty() {
            self.events.take()
        } else {
            self.events.clone()
        };
        let Some(tx) = tx else {
            return Err(RuntimeError::Disconnected);
        };
        tracing::debug!(events = turn.len(), "playing scripted turn");
        self.playing = Some(tokio::spawn(play(turn, tx, Arc::clone(&self.waiters))));
        Ok(())
    }

    async fn abort(&mut self) -> Result<(), RuntimeError> {
        self.log.push(AgentCommand::Abort);
        if let Some(playing) = self.playing.take() {
            playing.abort();
        }
        {
            let mut waiters = lock(&self.waiters);
            waiters.permissions.clear();
            waiters.questions.clear();
        }
        if let Some(tx) = self.events.clone() {
            tokio::spawn(async move {
                let _ = tx.send(AgentEvent::SessionIdle(SessionIdle {})).await;
            });
        }
        Ok(())
    }

    async fn respond_permission(
        &mut self,
        request_id: &str,
        decision: PermissionDecision,
    ) -> Result<(), RuntimeError> {
        self.log.push(AgentCommand::RespondPermission {
            request_id: request_id.to_string(),
            decision,
        });
        let waiter = lock(&self.waiters).permissions.remove(request_id);
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(decision);
            }
            None => tracing::debug!(request_id, "no scripted request waiting for this decision"),
        }
        Ok(())
    }

    async fn respond_user_input(
        &mut self,
        request_id: &str,
        answer: &str,
    ) -> Result<(), RuntimeError> {
        self.log.push(AgentCommand::RespondUserInput {
            request_id: request_id.to_string(),
            answer: answer.to_string(),
        });
        let waiter = lock(&self.waiters).questions.remove(request_id);
        if let Some(waiter) = waiter {
            let _ = waiter.send(answer.to_string());
        }
        Ok(())
    }
}

async fn play(turn: Turn, tx: mpsc::Sender<AgentEvent>, waiters: Arc<Mutex<Waiters>>) {
    let mut denied: HashSet<String> = HashSet::new();
    for event in turn {
        let event = match event {
            AgentEvent::PermissionRequested(requested) => {
                let decision = await_permission(&tx, &waiters, requested.clone()).await;
                match decision {
                    Some(decision) if decision.grants() => continue,
                    Some(_) => {
                        if let Some(id) = requested.tool_call_id {
                            denied.insert(id);
                        }
                        continue;
                    }
                    None => return,
                }
            }
            AgentEvent::AskUserRequest(request) => {
                if !await_answer(&tx, &waiters, request).await {
                    return;
                }
                continue;
            }
            AgentEvent::ToolComplete(complete) if denied.contains(&complete.tool_call_id) => {
                AgentEvent::ToolComplete(ToolComplete {
                    tool_call_id: complete.tool_call_id,
                    success: false,
                    result: None,
                    error: Some("permission denied".to_string()),
                })
            }
            AgentEvent::ToolPartialOutput(output) if denied.contains(&output.tool_call_id) => {
                continue
            }
            AgentEvent::ToolProgress(progress) if denied.contains(&progress.tool_call_id) => {
                continue
            }
            other => other,
        };
        if tx.send(event).await.is_err() {
            return;
        }
    }
}

/// Emit the request and wait for the host's decision. `None` when the host
/// went away or the request was dropped by an abort.
async fn await_permission(
    tx: &mpsc::Sender<AgentEvent>,
    waiters: &Mutex<Waiters>,
    requested: PermissionRequested,
) -> Option<PermissionDecision> {
    let (decision_tx, decision_rx) = oneshot::channel();
    lock(waiters)
        .permissions
        .insert(requested.request_id.clone(), decision_tx);
    tx.send(AgentEvent::PermissionRequested(requested)).await.ok()?;
    decision_rx.await.ok()
}

async fn await_answer(
    tx: &mpsc::Sender<AgentEvent>,
    waiters: &Mutex<Waiters>,
    request: AskUserRequest,
) -> bool {
    let (answer_tx, answer_rx) = oneshot::channel();
    lock(waiters)
        .questions
        .insert(request.request_id.clone(), answer_tx);
    if tx.send(AgentEvent::AskUserRequest(request)).await.is_err() {
        return false;
    }
    answer_rx.await.is_ok()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
