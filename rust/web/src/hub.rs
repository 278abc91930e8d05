//! Matchmaking and session lifecycle.
//!
//! Every transition (join, pairing, timeout expiry, move, bot turn, finish,
//! disconnect) runs while holding the single registry lock. Delayed work is
//! spawned as a task that sleeps without the lock and then re-checks the
//! registry, because the world may have changed while it slept.

use crate::config::HubSettings;
use crate::connection::{Connection, ConnectionId, Outbox};
use crate::protocol::{EndPayload, MovePayload, ServerFrame, SessionId, StartPayload};
use crate::registry::{ConnectionEntry, GameSession, SessionRegistry};
use crate::sink::{EventRecord, EventTopic, ResultRecord, SessionRecord, SinkHandle, SinkRecord};
use chrono::Utc;
use fourline_ai::Opponent;
use fourline_engine::errors::GameError;
use fourline_engine::game::{EndReason, Match, Placement};
use fourline_engine::player::{is_reserved_identity, Side, BOT_IDENTITY};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

pub const NO_ACTIVE_GAME: &str = "no active game";
pub const ALREADY_JOINED: &str = "already joined";

#[derive(Debug, Error)]
pub enum HubError {
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Gameplay(#[from] GameError),
    #[error("no active game")]
    NoActiveGame,
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
    #[error("session registry poisoned")]
    StoragePoisoned,
}

/// Owner of the session registry and of everything that mutates it.
pub struct Hub {
    registry: Mutex<SessionRegistry>,
    settings: HubSettings,
    opponent: Box<dyn Opponent>,
    sink: SinkHandle,
    next_connection: AtomicU64,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("settings", &self.settings)
            .field("opponent", &self.opponent.name())
            .finish_non_exhaustive()
    }
}

impl Hub {
    pub fn new(settings: HubSettings, opponent: Box<dyn Opponent>, sink: SinkHandle) -> Arc<Self> {
        Arc::new(Self {
            registry: Mutex::new(SessionRegistry::new()),
            settings,
            opponent,
            sink,
            next_connection: AtomicU64::new(1),
        })
    }

    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    pub fn sink(&self) -> &SinkHandle {
        &self.sink
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionRegistry>, HubError> {
        self.registry.lock().map_err(|_| HubError::StoragePoisoned)
    }

    /// Admit a connection under `identity`, pairing it with the oldest waiting
    /// connection or queueing it until the matchmaking timeout fires.
    pub fn join(self: &Arc<Self>, identity: &str) -> Result<Connection, HubError> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(HubError::Protocol("missing username".into()));
        }
        if is_reserved_identity(identity) {
            return Err(HubError::Protocol(format!("reserved username `{identity}`")));
        }

        let id = ConnectionId::new(self.next_connection.fetch_add(1, Ordering::Relaxed));
        let (outbox, frames) = Outbox::channel(id, self.settings.outbound_capacity);

        let mut registry = self.lock()?;
        registry.register(id, ConnectionEntry::new(identity, outbox));

        match registry.pop_waiting() {
            Some(waiting) => {
                self.start_session(&mut registry, waiting, Some(id));
            }
            None => {
                registry.enqueue(id);
                tracing::debug!(connection_id = %id, identity, "queued for matchmaking");
                self.schedule_wait_expiry(id);
            }
        }

        Ok(Connection { id, frames })
    }

    fn schedule_wait_expiry(self: &Arc<Self>, id: ConnectionId) {
        let hub = Arc::clone(self);
        let delay = self.settings.matchmaking_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = hub.expire_wait(id) {
                tracing::error!(connection_id = %id, error = %err, "matchmaking expiry failed");
            }
        });
    }

    /// Pair a still-waiting connection with the automated opponent. A no-op
    /// when the connection was paired or left in the meantime.
    pub fn expire_wait(&self, id: ConnectionId) -> Result<Option<SessionId>, HubError> {
        let mut registry = self.lock()?;
        if !registry.remove_waiting(id) {
            tracing::trace!(connection_id = %id, "wait expired after pairing");
            return Ok(None);
        }
        if registry.connection(id).is_none() {
            return Ok(None);
        }
        Ok(Some(self.start_session(&mut registry, id, None)))
    }

    /// Create a session with `first` on side One and `second` (or the bot) on
    /// side Two. The bot always moves second, so nothing is scheduled here.
    fn start_session(
        &self,
        registry: &mut SessionRegistry,
        first: ConnectionId,
        second: Option<ConnectionId>,
    ) -> SessionId {
        let identity_of = |conn: Option<ConnectionId>| {
            conn.and_then(|c| registry.connection(c))
                .map(|entry| entry.identity.clone())
                .unwrap_or_else(|| BOT_IDENTITY.to_string())
        };
        let player1 = identity_of(Some(first));
        let player2 = identity_of(second);

        let session_id = Uuid::new_v4().to_string();
        let game = Match::new(session_id.clone(), player1.clone(), player2.clone());
        let started_at = game.started_at();
        registry.insert_session(
            session_id.clone(),
            GameSession {
                game,
                participants: [Some(first), second],
            },
        );

        registry.broadcast(
            &session_id,
            &ServerFrame::Start {
                game_id: session_id.clone(),
                payload: StartPayload {
                    player1: player1.clone(),
                    player2: player2.clone(),
                },
            },
        );

        tracing::info!(
            session_id = %session_id,
            player1 = %player1,
            player2 = %player2,
            bot = second.is_none(),
            "session started"
        );

        self.sink.submit(SinkRecord::SessionCreated(SessionRecord {
            session_id: session_id.clone(),
            player1: player1.clone(),
            player2: player2.clone(),
            started_at,
        }));
        self.record_event(
            EventTopic::GameStart,
            &session_id,
            json!({ "player1": player1, "player2": player2 }),
        );

        session_id
    }

    /// Apply a move requested by `conn`. Failures are reported to that
    /// connection only and leave the session untouched.
    pub fn submit_move(
        self: &Arc<Self>,
        conn: ConnectionId,
        column: i64,
    ) -> Result<Placement, HubError> {
        let mut registry = self.lock()?;
        let seat = registry
            .connection(conn)
            .ok_or(HubError::UnknownConnection(conn))?
            .session
            .clone();

        let Some((session_id, side)) = seat else {
            registry.send_to(conn, ServerFrame::error(NO_ACTIVE_GAME));
            return Err(HubError::NoActiveGame);
        };

        let applied = match registry.session_mut(&session_id) {
            Some(session) => usize::try_from(column)
                .map_err(|_| GameError::InvalidColumn { column })
                .and_then(|col| session.game.apply_move_for(side, col)),
            None => Err(GameError::GameAlreadyFinished),
        };

        match applied {
            Ok(placement) => {
                self.after_move(&mut registry, &session_id, placement);
                Ok(placement)
            }
            Err(err) => {
                tracing::debug!(
                    session_id = %session_id,
                    connection_id = %conn,
                    error = %err,
                    "move rejected"
                );
                registry.send_to(conn, ServerFrame::error(err.to_string()));
                Err(err.into())
            }
        }
    }

    /// Broadcast an applied move, then finish the match or hand the turn to
    /// the bot if nobody is connected on the next side.
    fn after_move(
        self: &Arc<Self>,
        registry: &mut SessionRegistry,
        session_id: &str,
        placement: Placement,
    ) {
        let Some(session) = registry.session(session_id) else {
            return;
        };
        let player = session.game.player(placement.side).to_string();
        let board = *session.game.board();
        let moves = session.game.moves();
        let finished = session.game.is_finished();
        let bot_turn = session.is_bot_turn();

        registry.broadcast(
            session_id,
            &ServerFrame::Move {
                game_id: session_id.to_string(),
                payload: MovePayload {
                    player: player.clone(),
                    column: placement.column,
                    board,
                },
            },
        );
        tracing::debug!(
            session_id,
            identity = %player,
            column = placement.column,
            row = placement.row,
            moves,
            "move applied"
        );
        self.record_event(
            EventTopic::Move,
            session_id,
            json!({
                "player": player,
                "column": placement.column,
                "row": placement.row,
                "moves": moves,
            }),
        );

        if finished {
            self.finish(registry, session_id);
        } else if bot_turn {
            self.schedule_bot_turn(session_id.to_string());
        }
    }

    fn schedule_bot_turn(self: &Arc<Self>, session_id: SessionId) {
        let hub = Arc::clone(self);
        let delay = self.settings.bot_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = hub.play_bot_turn(&session_id) {
                tracing::error!(session_id = %session_id, error = %err, "bot turn failed");
            }
        });
    }

    /// Let the automated opponent move, provided the session still exists and
    /// is still waiting on the bot.
    pub fn play_bot_turn(
        self: &Arc<Self>,
        session_id: &str,
    ) -> Result<Option<Placement>, HubError> {
        let mut registry = self.lock()?;
        let Some(session) = registry.session_mut(session_id) else {
            tracing::trace!(session_id, "bot turn skipped, session gone");
            return Ok(None);
        };
        if !session.is_bot_turn() {
            return Ok(None);
        }

        let Some(column) = self.opponent.choose_column(&session.game) else {
            tracing::warn!(session_id, "opponent found no playable column");
            return Ok(None);
        };
        let placement = session.game.apply_move(column, BOT_IDENTITY)?;
        self.after_move(&mut registry, session_id, placement);
        Ok(Some(placement))
    }

    /// Broadcast the end of a terminal match, persist it, then reap it.
    fn finish(&self, registry: &mut SessionRegistry, session_id: &str) {
        let Some(session) = registry.session(session_id) else {
            return;
        };
        let game = &session.game;
        let Some(outcome) = game.outcome().cloned() else {
            return;
        };
        let forfeit = outcome.reason == EndReason::Forfeit;
        let winner = outcome.winner.as_str().to_string();
        let now = Utc::now();

        let result = ResultRecord {
            session_id: session_id.to_string(),
            player1: game.player(Side::One).to_string(),
            player2: game.player(Side::Two).to_string(),
            winner: winner.clone(),
            moves: game.moves(),
            duration_ms: game.elapsed(now).num_milliseconds(),
            created_at: now,
        };

        registry.broadcast(
            session_id,
            &ServerFrame::End {
                game_id: session_id.to_string(),
                payload: EndPayload {
                    winner: winner.clone(),
                    forfeit,
                },
            },
        );

        tracing::info!(
            session_id,
            winner = %winner,
            reason = ?outcome.reason,
            moves = result.moves,
            "session finished"
        );

        self.record_event(
            EventTopic::GameEnd,
            session_id,
            json!({ "winner": winner, "forfeit": forfeit, "moves": result.moves }),
        );
        self.sink.submit(SinkRecord::Result(result));
        self.sink.submit(SinkRecord::SessionFinished {
            session_id: session_id.to_string(),
            winner,
            updated_at: now,
        });

        registry.reap(session_id);
    }

    /// Handle a closed connection. Leaving the queue has no further effect;
    /// leaving an active match forfeits it. Returns the forfeited session.
    pub fn disconnect(&self, conn: ConnectionId) -> Result<Option<SessionId>, HubError> {
        let mut registry = self.lock()?;
        let Some(entry) = registry.unregister(conn) else {
            return Ok(None);
        };

        if registry.remove_waiting(conn) {
            tracing::debug!(
                connection_id = %conn,
                identity = %entry.identity,
                "left matchmaking queue"
            );
            return Ok(None);
        }

        let Some((session_id, side)) = entry.session else {
            tracing::debug!(connection_id = %conn, identity = %entry.identity, "disconnected");
            return Ok(None);
        };

        let forfeited = match registry.session_mut(&session_id) {
            Some(session) if !session.game.is_finished() => session.game.forfeit(side).is_ok(),
            _ => false,
        };
        if !forfeited {
            return Ok(None);
        }

        tracing::info!(
            session_id = %session_id,
            connection_id = %conn,
            identity = %entry.identity,
            "participant left, match forfeited"
        );
        self.finish(&mut registry, &session_id);
        Ok(Some(session_id))
    }

    pub fn waiting_count(&self) -> usize {
        self.lock().map(|r| r.waiting_len()).unwrap_or_default()
    }

    pub fn active_sessions(&self) -> Vec<SessionId> {
        self.lock().map(|r| r.session_ids()).unwrap_or_default()
    }

    /// Copy of a live match, if the session has not been reaped.
    pub fn snapshot(&self, session_id: &str) -> Option<Match> {
        self.lock()
            .ok()?
            .session(session_id)
            .map(|session| session.game.clone())
    }

    /// Session a connection is currently seated in.
    pub fn session_of(&self, conn: ConnectionId) -> Option<SessionId> {
        self.lock()
            .ok()?
            .connection(conn)
            .and_then(|entry| entry.session.as_ref().map(|(id, _)| id.clone()))
    }

    /// Queue an `error` frame for a single connection.
    pub fn notify(&self, conn: ConnectionId, message: &str) {
        if let Ok(registry) = self.lock() {
            registry.send_to(conn, ServerFrame::error(message));
        }
    }

    fn record_event(&self, topic: EventTopic, session_id: &str, payload: serde_json::Value) {
        self.sink.submit(SinkRecord::Event(EventRecord {
            topic,
            session_id: session_id.to_string(),
            payload,
            recorded_at: Utc::now(),
        }));
    }
}
