use crate::protocol::ServerFrame;
use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Process-unique id of a live transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Bounded outbound queue of one connection.
///
/// Sending never waits: when the queue is full the frame is dropped, so a slow
/// reader cannot stall whoever holds the registry lock.
#[derive(Debug, Clone)]
pub struct Outbox {
    connection: ConnectionId,
    tx: mpsc::Sender<ServerFrame>,
}

impl Outbox {
    pub fn channel(
        connection: ConnectionId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ServerFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { connection, tx }, rx)
    }

    /// Queue `frame`; returns whether it was accepted.
    pub fn send(&self, frame: ServerFrame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(frame)) => {
                tracing::warn!(
                    connection_id = %self.connection,
                    frame = frame.kind(),
                    "outbound queue full, dropping frame"
                );
                false
            }
            Err(TrySendError::Closed(frame)) => {
                tracing::debug!(
                    connection_id = %self.connection,
                    frame = frame.kind(),
                    "outbound queue closed"
                );
                false
            }
        }
    }
}

/// The hub's half of a joined connection: its id and the frames queued for it.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub frames: mpsc::Receiver<ServerFrame>,
}
