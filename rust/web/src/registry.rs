//! Connection table, waiting queue and session table.
//!
//! The registry is plain data. [`crate::hub::Hub`] owns it behind a single
//! mutex and performs every transition while holding that lock.

use crate::connection::{ConnectionId, Outbox};
use crate::protocol::{ServerFrame, SessionId};
use fourline_engine::game::Match;
use fourline_engine::player::Side;
use std::collections::{HashMap, VecDeque};

#[derive(Debug)]
pub struct ConnectionEntry {
    pub identity: String,
    pub outbox: Outbox,
    /// Session this connection plays in, and its seat there.
    pub session: Option<(SessionId, Side)>,
}

impl ConnectionEntry {
    pub fn new(identity: impl Into<String>, outbox: Outbox) -> Self {
        Self {
            identity: identity.into(),
            outbox,
            session: None,
        }
    }
}

/// A live match plus the connections seated on each side. A seat without a
/// connection belongs to the automated opponent.
#[derive(Debug, Clone)]
pub struct GameSession {
    pub game: Match,
    pub participants: [Option<ConnectionId>; 2],
}

impl GameSession {
    pub fn connection(&self, side: Side) -> Option<ConnectionId> {
        self.participants[side.index()]
    }

    /// Whether the side to move has nobody connected and is played by the bot.
    pub fn is_bot_turn(&self) -> bool {
        !self.game.is_finished() && self.connection(self.game.current_side()).is_none()
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    waiting: VecDeque<ConnectionId>,
    sessions: HashMap<SessionId, GameSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: ConnectionId, entry: ConnectionEntry) {
        self.connections.insert(id, entry);
    }

    pub fn unregister(&mut self, id: ConnectionId) -> Option<ConnectionEntry> {
        self.connections.remove(&id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&ConnectionEntry> {
        self.connections.get(&id)
    }

    pub fn enqueue(&mut self, id: ConnectionId) {
        self.waiting.push_back(id);
    }

    /// Pop the oldest waiting connection that is still registered.
    pub fn pop_waiting(&mut self) -> Option<ConnectionId> {
        while let Some(id) = self.waiting.pop_front() {
            if self.connections.contains_key(&id) {
                return Some(id);
            }
        }
        None
    }

    /// Remove `id` from the queue; false if it was no longer waiting.
    pub fn remove_waiting(&mut self, id: ConnectionId) -> bool {
        match self.waiting.iter().position(|&queued| queued == id) {
            Some(index) => {
                self.waiting.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    /// Register a session and seat its connected participants.
    pub fn insert_session(&mut self, id: SessionId, session: GameSession) {
        for side in [Side::One, Side::Two] {
            if let Some(conn) = session.connection(side) {
                if let Some(entry) = self.connections.get_mut(&conn) {
                    entry.session = Some((id.clone(), side));
                }
            }
        }
        self.sessions.insert(id, session);
    }

    pub fn session(&self, id: &str) -> Option<&GameSession> {
        self.sessions.get(id)
    }

    pub fn session_mut(&mut self, id: &str) -> Option<&mut GameSession> {
        self.sessions.get_mut(id)
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().cloned().collect()
    }

    /// Remove a session and unseat whoever is still connected to it.
    pub fn reap(&mut self, id: &str) -> Option<GameSession> {
        let session = self.sessions.remove(id)?;
        for conn in session.participants.iter().flatten() {
            if let Some(entry) = self.connections.get_mut(conn) {
                entry.session = None;
            }
        }
        Some(session)
    }

    pub fn send_to(&self, id: ConnectionId, frame: ServerFrame) -> bool {
        self.connections
            .get(&id)
            .map(|entry| entry.outbox.send(frame))
            .unwrap_or(false)
    }

    /// Send `frame` to every participant of the session that is still connected.
    pub fn broadcast(&self, session_id: &str, frame: &ServerFrame) -> usize {
        let Some(session) = self.sessions.get(session_id) else {
            return 0;
        };
        session
            .participants
            .iter()
            .flatten()
            .filter(|&&conn| self.send_to(conn, frame.clone()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fourline_engine::player::BOT_IDENTITY;
    use tokio::sync::mpsc::Receiver;

    fn entry(
        registry: &mut SessionRegistry,
        raw: u64,
        identity: &str,
    ) -> (ConnectionId, Receiver<ServerFrame>) {
        let id = ConnectionId::new(raw);
        let (outbox, rx) = Outbox::channel(id, 8);
        registry.register(id, ConnectionEntry::new(identity, outbox));
        (id, rx)
    }

    #[test]
    fn queue_is_fifo_and_skips_departed_connections() {
        let mut registry = SessionRegistry::new();
        let (a, _ra) = entry(&mut registry, 1, "a");
        let (b, _rb) = entry(&mut registry, 2, "b");
        let (c, _rc) = entry(&mut registry, 3, "c");
        registry.enqueue(a);
        registry.enqueue(b);
        registry.enqueue(c);

        registry.unregister(a);
        assert_eq!(registry.pop_waiting(), Some(b));
        assert!(registry.remove_waiting(c));
        assert!(!registry.remove_waiting(c));
        assert_eq!(registry.pop_waiting(), None);
    }

    #[test]
    fn insert_and_reap_update_seats() {
        let mut registry = SessionRegistry::new();
        let (carol, _rx) = entry(&mut registry, 1, "carol");
        registry.insert_session(
            "g".into(),
            GameSession {
                game: Match::new("g", "carol", BOT_IDENTITY),
                participants: [Some(carol), None],
            },
        );

        assert_eq!(
            registry.connection(carol).and_then(|e| e.session.clone()),
            Some(("g".to_string(), Side::One))
        );
        assert!(!registry.session("g").expect("session").is_bot_turn());

        let reaped = registry.reap("g").expect("reaped");
        assert_eq!(reaped.game.id(), "g");
        assert!(registry.connection(carol).expect("entry").session.is_none());
        assert!(registry.reap("g").is_none());
    }

    #[test]
    fn broadcast_reaches_only_connected_participants() {
        let mut registry = SessionRegistry::new();
        let (alice, mut alice_rx) = entry(&mut registry, 1, "alice");
        let (bob, _bob_rx) = entry(&mut registry, 2, "bob");
        registry.insert_session(
            "g".into(),
            GameSession {
                game: Match::new("g", "alice", "bob"),
                participants: [Some(alice), Some(bob)],
            },
        );

        assert_eq!(registry.broadcast("g", &ServerFrame::error("x")), 2);
        registry.unregister(bob);
        assert_eq!(registry.broadcast("g", &ServerFrame::error("x")), 1);
        assert_eq!(registry.broadcast("missing", &ServerFrame::error("x")), 0);
        assert!(alice_rx.try_recv().is_ok());
    }
}
