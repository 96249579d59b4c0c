//! Rebuild a transcript from a recorded event log.

use serde::Serialize;

use crate::actions::SessionAction;
use crate::persistence::EventLogError;
use crate::persistence::EventLogHeader;
use crate::persistence::EventRecord;
use crate::persistence::SessionEventLog;
use crate::reducer::reduce;
use crate::reducer::Gate;
use crate::state::ReducerDiagnostics;
use crate::state::SessionInfo;
use crate::state::SessionState;
use crate::transcript::Transcript;

/// What was active when the log was captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayMetadata {
    pub session_id: Option<String>,
    pub working_root: String,
    pub model: Option<String>,
}

impl From<&EventLogHeader> for ReplayMetadata {
    fn from(header: &EventLogHeader) -> Self {
        Self {
            session_id: Some(header.session_id.clone()),
            working_root: header.working_root.clone(),
            model: header.model.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutcome {
    pub session: SessionInfo,
    pub transcript: Transcript,
    pub diagnostics: ReducerDiagnostics,
}

/// Drive `records` through the reducer in `seq` order without a policy.
/// Nothing is evaluated or sent; the same records always give the same
/// transcript.
pub fn replay(records: &[EventRecord], metadata: &ReplayMetadata) -> ReplayOutcome {
    let mut session = SessionInfo::new(metadata.working_root.clone()).with_model(metadata.model.clone());
    session.session_id = metadata.session_id.clone();
    let mut state = SessionState::new(session);
    replay_into(&mut state, records);
    ReplayOutcome {
        session: state.session,
        transcript: state.transcript,
        diagnostics: state.diagnostics,
    }
}

/// Replay into a caller-built state, e.g. one configured with custom tool
/// patterns. Streams left open by the log stay open.
pub fn replay_into(state: &mut SessionState, records: &[EventRecord]) {
    let mut ordered: Vec<&EventRecord> = records.iter().collect();
    ordered.sort_by_key(|record| record.seq);
    for record in ordered {
        reduce(state, SessionAction::Agent(record.to_timed()), Gate::Replay);
    }
}

pub fn replay_log(log: &SessionEventLog) -> Result<ReplayOutcome, EventLogError> {
    let records = log.load()?;
    Ok(replay(&records, &ReplayMetadata::from(log.header())))
}
