//! Per-session JSONL event logs.
//!
//! A log starts with one `session` header line and continues with one `event`
//! line per runtime event, in arrival order. Logs are the only input replay
//! needs.

use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::events::AgentEvent;
use crate::events::TimedEvent;

pub const EVENT_LOG_VERSION: u32 = 1;
pub const DEFAULT_MAX_EVENTS: usize = 5_000;
const LOG_EXTENSION: &str = "jsonl";

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while reading line {line} in {path}: {source}")]
    IoLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("missing session header line in {path}")]
    MissingHeader { path: PathBuf },

    #[error("first line of {path} is not a session header: {reason}")]
    InvalidHeader { path: PathBuf, reason: String },

    #[error("{path} has unsupported event log version {found}; expected 1")]
    UnsupportedVersion { path: PathBuf, found: u32 },

    #[error("session log already exists at {path}")]
    AlreadyExists { path: PathBuf },

    #[error("invalid session id '{id}'")]
    InvalidSessionId { id: String },

    #[error("failed to serialize log line for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl EventLogError {
    fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    fn serialize(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Serialize {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogHeader {
    pub version: u32,
    pub session_id: String,
    pub working_root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub created_at_ms: i64,
}

impl EventLogHeader {
    pub fn new(session_id: impl Into<String>, working_root: impl Into<String>) -> Self {
        Self {
            version: EVENT_LOG_VERSION,
            session_id: session_id.into(),
            working_root: working_root.into(),
            model: None,
            created_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

/// One logged event. `event` keeps the raw wire object so kinds this build
/// does not understand survive a rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub seq: u64,
    pub ts_ms: i64,
    pub event: Value,
}

impl EventRecord {
    pub fn to_timed(&self) -> TimedEvent {
        TimedEvent::new(self.ts_ms, AgentEvent::from_raw(self.event.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LogLine {
    Session(EventLogHeader),
    Event(EventRecord),
}

/// An open, append-only session log with bounded retention.
///
/// Once the record count passes `max_events` plus a 10% slack, the file is
/// rewritten with the header and the newest `max_events` records. Sequence
/// numbers keep increasing across rewrites and reopens.
#[derive(Debug)]
pub struct SessionEventLog {
    path: PathBuf,
    header: EventLogHeader,
    next_seq: u64,
    len: usize,
    max_events: usize,
}

impl SessionEventLog {
    /// Start a new log at `path`; fails if one already exists there.
    pub fn create(
        path: impl AsRef<Path>,
        header: EventLogHeader,
        max_events: usize,
    ) -> Result<Self, EventLogError> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(EventLogError::AlreadyExists { path });
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| EventLogError::io("creating log directory", parent, source))?;
        }
        let line = serde_json::to_string(&LogLine::Session(header.clone()))
            .map_err(|source| EventLogError::serialize(&path, source))?;
        append_line(&path, &line)
            .map_err(|source| EventLogError::io("writing session header", &path, source))?;
        tracing::debug!(path = %path.display(), session_id = %header.session_id, "created session log");
        Ok(Self {
            path,
            header,
            next_seq: 1,
            len: 0,
            max_events,
        })
    }

    pub fn open(path: impl AsRef<Path>, max_events: usize) -> Result<Self, EventLogError> {
        let path = path.as_ref().to_path_buf();
        let (header, records) = read_log(&path)?;
        let next_seq = records
            .iter()
            .map(|record| record.seq)
            .max()
            .map_or(1, |seq| seq.saturating_add(1));
        Ok(Self {
            path,
            header,
            next_seq,
            len: records.len(),
            max_events,
        })
    }

    pub fn append(&mut self, event: &TimedEvent) -> Result<u64, EventLogError> {
        let seq = self.next_seq;
        let record = EventRecord {
            seq,
            ts_ms: event.ts_ms,
            event: event.event.to_raw(),
        };
        let line = serde_json::to_string(&LogLine::Event(record))
            .map_err(|source| EventLogError::serialize(&self.path, source))?;
        append_line(&self.path, &line)
            .map_err(|source| EventLogError::io("appending event", &self.path, source))?;
        self.next_seq = seq.saturating_add(1);
        self.len += 1;

        if self.max_events > 0 && self.len > self.max_events + compaction_slack(self.max_events) {
            self.compact()?;
        }
        Ok(seq)
    }

    pub fn load(&self) -> Result<Vec<EventRecord>, EventLogError> {
        read_log(&self.path).map(|(_, records)| records)
    }

    /// Drop the oldest records beyond `max_events`. Returns how many went.
    pub fn compact(&mut self) -> Result<usize, EventLogError> {
        let records = self.load()?;
        if self.max_events == 0 || records.len() <= self.max_events {
            self.len = records.len();
            return Ok(0);
        }
        let dropped = records.len() - self.max_events;
        let mut contents = serde_json::to_string(&LogLine::Session(self.header.clone()))
            .map_err(|source| EventLogError::serialize(&self.path, source))?;
        contents.push('\n');
        for record in records.into_iter().skip(dropped) {
            let line = serde_json::to_string(&LogLine::Event(record))
                .map_err(|source| EventLogError::serialize(&self.path, source))?;
            contents.push_str(&line);
            contents.push('\n');
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        std::fs::write(&tmp, contents)
            .map_err(|source| EventLogError::io("writing compacted log", &tmp, source))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|source| EventLogError::io("replacing compacted log", &self.path, source))?;
        self.len = self.max_events;
        tracing::debug!(path = %self.path.display(), dropped, "compacted session log");
        Ok(dropped)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &EventLogHeader {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }
}

fn compaction_slack(max_events: usize) -> usize {
    (max_events / 10).max(1)
}

/// Read a whole log. Lines that fail to parse are skipped with a warning; only
/// a missing or bad header is fatal.
pub fn read_log(path: &Path) -> Result<(EventLogHeader, Vec<EventRecord>), EventLogError> {
    let file = File::open(path).map_err(|source| EventLogError::io("opening session log", path, source))?;
    let reader = BufReader::new(file);

    let mut header = None;
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line.map_err(|source| EventLogError::IoLine {
            path: path.to_path_buf(),
            line: line_number,
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }

        if header.is_none() {
            header = Some(parse_header(path, &line)?);
            continue;
        }
        match serde_json::from_str::<LogLine>(&line) {
            Ok(LogLine::Event(record)) => records.push(record),
            Ok(LogLine::Session(_)) => {
                tracing::warn!(path = %path.display(), line = line_number, "ignoring extra session header");
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), line = line_number, %err, "skipping unreadable log line");
            }
        }
    }

    let header = header.ok_or_else(|| EventLogError::MissingHeader {
        path: path.to_path_buf(),
    })?;
    Ok((header, records))
}

/// Read only the header line of a log.
pub fn read_header(path: &Path) -> Result<EventLogHeader, EventLogError> {
    let file = File::open(path).map_err(|source| EventLogError::io("opening session log", path, source))?;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| EventLogError::IoLine {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        if !line.trim().is_empty() {
            return parse_header(path, &line);
        }
    }
    Err(EventLogError::MissingHeader {
        path: path.to_path_buf(),
    })
}

fn parse_header(path: &Path, line: &str) -> Result<EventLogHeader, EventLogError> {
    let header = match serde_json::from_str::<LogLine>(line) {
        Ok(LogLine::Session(header)) => header,
        Ok(LogLine::Event(_)) => {
            return Err(EventLogError::InvalidHeader {
                path: path.to_path_buf(),
                reason: "found an event record".to_string(),
            })
        }
        Err(err) => {
            return Err(EventLogError::InvalidHeader {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })
        }
    };
    if header.version != EVENT_LOG_VERSION {
        return Err(EventLogError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: header.version,
        });
    }
    Ok(header)
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut opts = OpenOptions::new();
    opts.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts.open(path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub path: PathBuf,
    pub header: EventLogHeader,
}

/// A directory of session logs named `<sessionId>.jsonl`.
#[derive(Debug, Clone)]
pub struct SessionArchive {
    root: PathBuf,
    max_events: usize,
}

impl SessionArchive {
    pub fn new(root: impl Into<PathBuf>, max_events: usize) -> Self {
        Self {
            root: root.into(),
            max_events,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a log for a fresh session with a random id.
    pub fn create(
        &self,
        working_root: &str,
        model: Option<String>,
    ) -> Result<SessionEventLog, EventLogError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        self.create_with_id(EventLogHeader::new(session_id, working_root).with_model(model))
    }

    pub fn create_with_id(&self, header: EventLogHeader) -> Result<SessionEventLog, EventLogError> {
        let path = self.path_for(&header.session_id)?;
        SessionEventLog::create(path, header, self.max_events)
    }

    pub fn open(&self, session_id: &str) -> Result<SessionEventLog, EventLogError> {
        SessionEventLog::open(self.path_for(session_id)?, self.max_events)
    }

    /// Every readable log, newest first. Files with a bad header are skipped.
    pub fn list(&self) -> Result<Vec<SessionSummary>, EventLogError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let dir = std::fs::read_dir(&self.root)
            .map_err(|source| EventLogError::io("listing sessions", &self.root, source))?;
        let mut sessions = Vec::new();
        for entry in dir {
            let entry =
                entry.map_err(|source| EventLogError::io("listing sessions", &self.root, source))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            match read_header(&path) {
                Ok(header) => sessions.push(SessionSummary { path, header }),
                Err(err) => tracing::warn!(path = %path.display(), %err, "skipping unreadable session log"),
            }
        }
        sessions.sort_by(|a, b| {
            b.header
                .created_at_ms
                .cmp(&a.header.created_at_ms)
                .then_with(|| a.header.session_id.cmp(&b.header.session_id))
        });
        Ok(sessions)
    }

    /// Returns false when no log existed for `session_id`.
    pub fn remove(&self, session_id: &str) -> Result<bool, EventLogError> {
        let path = self.path_for(session_id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(EventLogError::io("removing session log", path, source)),
        }
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf, EventLogError> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !session_id.starts_with('.');
        if !valid {
            return Err(EventLogError::InvalidSessionId {
                id: session_id.to_string(),
            });
        }
        Ok(self.root.join(format!("{session_id}.{LOG_EXTENSION}")))
    }
}
