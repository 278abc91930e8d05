//! SQLite-backed [`Sink`] and [`ResultStore`].

use crate::sink::{EventRecord, ResultRecord, ResultStore, SessionRecord, Sink, SinkError};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS games (
    game_id TEXT NOT NULL PRIMARY KEY,
    player1 TEXT NOT NULL,
    player2 TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished INTEGER NOT NULL DEFAULT 0,
    winner TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS game_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id TEXT NOT NULL,
    player1 TEXT NOT NULL,
    player2 TEXT NOT NULL,
    winner TEXT NOT NULL,
    moves INTEGER NOT NULL,
    duration_ms INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS game_results_created_at ON game_results (created_at);
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic TEXT NOT NULL,
    game_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);
";

/// Single-connection store; writes are serialized by the sink worker anyway.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and ensure the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    SinkError::Corrupt(format!(
                        "cannot create directory {}: {err}",
                        parent.display()
                    ))
                })?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, SinkError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, SinkError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, SinkError>,
    ) -> Result<T, SinkError> {
        let conn = self.conn.lock().map_err(|_| SinkError::Poisoned)?;
        f(&conn)
    }

    /// Terminal flag and winner of a stored session, if it exists.
    pub fn session_status(
        &self,
        session_id: &str,
    ) -> Result<Option<(bool, Option<String>)>, SinkError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT finished, winner FROM games WHERE game_id = ?1")?;
            let mut rows = stmt.query(params![session_id])?;
            match rows.next()? {
                Some(row) => {
                    let finished: i64 = row.get(0)?;
                    let winner: Option<String> = row.get(1)?;
                    Ok(Some((finished != 0, winner)))
                }
                None => Ok(None),
            }
        })
    }

    pub fn event_count(&self, session_id: &str) -> Result<usize, SinkError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM events WHERE game_id = ?1",
                params![session_id],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
    }
}

/// Fixed-width UTC text, so `ORDER BY created_at` sorts chronologically.
fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, SinkError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| SinkError::Corrupt(format!("timestamp `{raw}`: {err}")))
}

impl Sink for SqliteStore {
    fn record_session_created(&self, record: &SessionRecord) -> Result<(), SinkError> {
        let now = timestamp(Utc::now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO games (game_id, player1, player2, started_at, finished, winner, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 0, NULL, ?5, ?5)",
                params![
                    &record.session_id,
                    &record.player1,
                    &record.player2,
                    timestamp(record.started_at),
                    now
                ],
            )?;
            Ok(())
        })
    }

    fn record_session_finished(
        &self,
        session_id: &str,
        winner: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE games SET finished = 1, winner = ?2, updated_at = ?3 WHERE game_id = ?1",
                params![session_id, winner, timestamp(updated_at)],
            )?;
            if changed == 0 {
                tracing::debug!(session_id, "finish recorded for unknown session");
            }
            Ok(())
        })
    }

    fn record_result(&self, record: &ResultRecord) -> Result<(), SinkError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO game_results (game_id, player1, player2, winner, moves, duration_ms, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    &record.session_id,
                    &record.player1,
                    &record.player2,
                    &record.winner,
                    i64::from(record.moves),
                    record.duration_ms,
                    timestamp(record.created_at)
                ],
            )?;
            Ok(())
        })
    }

    fn record_event(&self, event: &EventRecord) -> Result<(), SinkError> {
        let payload = serde_json::to_string(&event.payload)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO events (topic, game_id, payload, recorded_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    event.topic.as_str(),
                    &event.session_id,
                    payload,
                    timestamp(event.recorded_at)
                ],
            )?;
            Ok(())
        })
    }
}

const RESULT_COLUMNS: &str =
    "game_id, player1, player2, winner, moves, duration_ms, created_at";

type RawResult = (String, String, String, String, i64, i64, String);

fn raw_result(row: &Row<'_>) -> rusqlite::Result<RawResult> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn into_result(raw: RawResult) -> Result<ResultRecord, SinkError> {
    let (session_id, player1, player2, winner, moves, duration_ms, created_at) = raw;
    Ok(ResultRecord {
        session_id,
        player1,
        player2,
        winner,
        moves: u32::try_from(moves)
            .map_err(|_| SinkError::Corrupt(format!("move count {moves}")))?,
        duration_ms,
        created_at: parse_timestamp(&created_at)?,
    })
}

impl ResultStore for SqliteStore {
    fn results(&self) -> Result<Vec<ResultRecord>, SinkError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {RESULT_COLUMNS} FROM game_results ORDER BY id"))?;
            let rows = stmt.query_map([], raw_result)?;
            let results = rows.map(|row| into_result(row?)).collect();
            results
        })
    }

    fn recent(&self, limit: usize) -> Result<Vec<ResultRecord>, SinkError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RESULT_COLUMNS} FROM game_results
                 ORDER BY created_at DESC, id DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], raw_result)?;
            let results = rows.map(|row| into_result(row?)).collect();
            results
        })
    }
}
