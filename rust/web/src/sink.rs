//! Write-only persistence boundary of the hub.
//!
//! The hub never talks to a [`Sink`] directly: it submits [`SinkRecord`]s to a
//! [`SinkHandle`], whose single worker applies them in submission order on the
//! blocking pool. The queue is bounded: when it is full, or a write fails, the
//! record is logged and dropped, so storage problems never reach players.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("failed to encode event payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
    #[error("store task failed: {0}")]
    Task(String),
}

impl crate::errors::IntoErrorResponse for SinkError {
    fn status_code(&self) -> warp::http::StatusCode {
        warp::http::StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_code(&self) -> &'static str {
        "store_unavailable"
    }

    fn error_message(&self) -> String {
        self.to_string()
    }
}

/// A session as first persisted, when both sides are known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub player1: String,
    pub player2: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub session_id: String,
    pub player1: String,
    pub player2: String,
    /// Winning identity or the draw sentinel.
    pub winner: String,
    pub moves: u32,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTopic {
    GameStart,
    Move,
    GameEnd,
}

impl EventTopic {
    pub fn as_str(self) -> &'static str {
        match self {
            EventTopic::GameStart => "game_start",
            EventTopic::Move => "move",
            EventTopic::GameEnd => "game_end",
        }
    }
}

/// Raw domain event kept for offline analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub topic: EventTopic,
    pub session_id: String,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

pub trait Sink: Send + Sync {
    fn record_session_created(&self, record: &SessionRecord) -> Result<(), SinkError>;

    /// Mark a previously created session terminal.
    fn record_session_finished(
        &self,
        session_id: &str,
        winner: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), SinkError>;

    fn record_result(&self, record: &ResultRecord) -> Result<(), SinkError>;

    fn record_event(&self, event: &EventRecord) -> Result<(), SinkError>;
}

/// Read side of a store, consumed by the statistics endpoints.
pub trait ResultStore: Send + Sync {
    fn results(&self) -> Result<Vec<ResultRecord>, SinkError>;

    /// At most `limit` results, newest first; later inserts win ties.
    fn recent(&self, limit: usize) -> Result<Vec<ResultRecord>, SinkError> {
        let mut results = self.results()?;
        results.reverse();
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        results.truncate(limit);
        Ok(results)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkRecord {
    SessionCreated(SessionRecord),
    SessionFinished {
        session_id: String,
        winner: String,
        updated_at: DateTime<Utc>,
    },
    Result(ResultRecord),
    Event(EventRecord),
}

impl SinkRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            SinkRecord::SessionCreated(_) => "session_created",
            SinkRecord::SessionFinished { .. } => "session_finished",
            SinkRecord::Result(_) => "result",
            SinkRecord::Event(_) => "event",
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            SinkRecord::SessionCreated(record) => &record.session_id,
            SinkRecord::SessionFinished { session_id, .. } => session_id,
            SinkRecord::Result(record) => &record.session_id,
            SinkRecord::Event(event) => &event.session_id,
        }
    }

    fn apply(&self, sink: &dyn Sink) -> Result<(), SinkError> {
        match self {
            SinkRecord::SessionCreated(record) => sink.record_session_created(record),
            SinkRecord::SessionFinished {
                session_id,
                winner,
                updated_at,
            } => sink.record_session_finished(session_id, winner, *updated_at),
            SinkRecord::Result(record) => sink.record_result(record),
            SinkRecord::Event(event) => sink.record_event(event),
        }
    }
}

enum Command {
    Write(SinkRecord),
    Flush(oneshot::Sender<()>),
}

/// Cloneable submission side of the sink worker.
#[derive(Debug, Clone)]
pub struct SinkHandle {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Write(record) => f.debug_tuple("Write").field(&record.kind()).finish(),
            Command::Flush(_) => f.write_str("Flush"),
        }
    }
}

impl SinkHandle {
    /// Start the worker with room for `capacity` pending records. Must be
    /// called from within a tokio runtime.
    pub fn spawn(sink: Arc<dyn Sink>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Command>(capacity.max(1));

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    Command::Write(record) => {
                        let sink = Arc::clone(&sink);
                        let kind = record.kind();
                        let session_id = record.session_id().to_string();
                        let outcome =
                            tokio::task::spawn_blocking(move || record.apply(sink.as_ref())).await;
                        match outcome {
                            Ok(Ok(())) => {
                                tracing::trace!(
                                    kind,
                                    session_id = %session_id,
                                    "sink write applied"
                                );
                            }
                            Ok(Err(err)) => {
                                tracing::warn!(
                                    kind,
                                    session_id = %session_id,
                                    error = %err,
                                    "sink write failed"
                                );
                            }
                            Err(err) => {
                                tracing::warn!(
                                    kind,
                                    session_id = %session_id,
                                    error = %err,
                                    "sink worker task failed"
                                );
                            }
                        }
                    }
                    Command::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            tracing::debug!("sink worker stopped");
        });

        Self { tx }
    }

    /// Queue a record without blocking. Returns `false` when it was dropped.
    pub fn submit(&self, record: SinkRecord) -> bool {
        match self.tx.try_send(Command::Write(record)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(command)) => {
                tracing::warn!(command = ?command, "sink queue full, record dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(command)) => {
                tracing::warn!(command = ?command, "sink worker gone, record dropped");
                false
            }
        }
    }

    /// Wait until every record accepted before this call has been applied.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl Sink for NoopSink {
    fn record_session_created(&self, _record: &SessionRecord) -> Result<(), SinkError> {
        Ok(())
    }

    fn record_session_finished(
        &self,
        _session_id: &str,
        _winner: &str,
        _updated_at: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        Ok(())
    }

    fn record_result(&self, _record: &ResultRecord) -> Result<(), SinkError> {
        Ok(())
    }

    fn record_event(&self, _event: &EventRecord) -> Result<(), SinkError> {
        Ok(())
    }
}

impl ResultStore for NoopSink {
    fn results(&self) -> Result<Vec<ResultRecord>, SinkError> {
        Ok(Vec::new())
    }
}

/// Stored form of a session, including its terminal update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub record: SessionRecord,
    pub finished: bool,
    pub winner: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    sessions: Vec<StoredSession>,
    results: Vec<ResultRecord>,
    events: Vec<EventRecord>,
}

/// In-process store that keeps every record it is given.
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sessions(&self) -> Vec<StoredSession> {
        self.state
            .lock()
            .map(|state| state.sessions.clone())
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.state
            .lock()
            .map(|state| state.events.clone())
            .unwrap_or_default()
    }

    pub fn events_for(&self, session_id: &str) -> Vec<EventRecord> {
        self.events()
            .into_iter()
            .filter(|event| event.session_id == session_id)
            .collect()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> Result<T, SinkError> {
        let mut state = self.state.lock().map_err(|_| SinkError::Poisoned)?;
        Ok(f(&mut state))
    }
}

impl Sink for MemorySink {
    fn record_session_created(&self, record: &SessionRecord) -> Result<(), SinkError> {
        self.with_state(|state| {
            state.sessions.push(StoredSession {
                record: record.clone(),
                finished: false,
                winner: None,
                updated_at: record.started_at,
            })
        })
    }

    fn record_session_finished(
        &self,
        session_id: &str,
        winner: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        self.with_state(|state| {
            for stored in state
                .sessions
                .iter_mut()
                .filter(|stored| stored.record.session_id == session_id)
            {
                stored.finished = true;
                stored.winner = Some(winner.to_string());
                stored.updated_at = updated_at;
            }
        })
    }

    fn record_result(&self, record: &ResultRecord) -> Result<(), SinkError> {
        self.with_state(|state| state.results.push(record.clone()))
    }

    fn record_event(&self, event: &EventRecord) -> Result<(), SinkError> {
        self.with_state(|state| state.events.push(event.clone()))
    }
}

impl ResultStore for MemorySink {
    fn results(&self) -> Result<Vec<ResultRecord>, SinkError> {
        self.with_state(|state| state.results.clone())
    }
}
