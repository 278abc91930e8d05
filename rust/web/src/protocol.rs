//! JSON frames exchanged over the `/ws` connection.
//!
//! Every frame is an object tagged by `type`. Clients send `join` (first frame
//! only) and `drop`; the server sends `start`, `move`, `end` and `error`.

use fourline_engine::board::Board;
use serde::{Deserialize, Serialize};

pub type SessionId = String;

/// Frames accepted from clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Join { username: String },
    Drop { column: i64 },
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Frames pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Start {
        #[serde(rename = "gameId")]
        game_id: SessionId,
        payload: StartPayload,
    },
    Move {
        #[serde(rename = "gameId")]
        game_id: SessionId,
        payload: MovePayload,
    },
    End {
        #[serde(rename = "gameId")]
        game_id: SessionId,
        payload: EndPayload,
    },
    Error {
        payload: String,
    },
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            payload: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::Start { .. } => "start",
            ServerFrame::Move { .. } => "move",
            ServerFrame::End { .. } => "end",
            ServerFrame::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartPayload {
    pub player1: String,
    pub player2: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovePayload {
    pub player: String,
    pub column: usize,
    pub board: Board,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndPayload {
    pub winner: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub forfeit: bool,
}
