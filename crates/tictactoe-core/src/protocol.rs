// Wire messages exchanged between clients and the relay.
//
// Every frame is a JSON text message of the form
// `{"event": "<name>", "data": {...}}`.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Client -> relay
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask to be paired with an opponent.
    JoinGame {},
    /// Place the sender's mark on `position` (0-8) in game `game_id`.
    MakeMove { position: usize, game_id: String },
}

impl ClientMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

// ---------------------------------------------------------------------------
// Relay -> client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameOverResult {
    Win,
    Draw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent to the first player: a new game was created and is waiting.
    GameJoined { game_id: String },
    /// Sent to the waiting player once someone joins their game.
    OpponentJoined { opponent: String },
    /// Sent to the second player when they are paired into a waiting game.
    GameStarted { game_id: String, opponent: String },
    /// The opponent placed a mark. `seq` is the 1-based move number.
    MoveMade {
        position: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u32>,
    },
    GameOver {
        result: GameOverResult,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winner: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Error { message: String },
}

impl ServerMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Wire name of the event, for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::GameJoined { .. } => "game_joined",
            ServerMessage::OpponentJoined { .. } => "opponent_joined",
            ServerMessage::GameStarted { .. } => "game_started",
            ServerMessage::MoveMade { .. } => "move_made",
            ServerMessage::GameOver { .. } => "game_over",
            ServerMessage::Error { .. } => "error",
        }
    }
}

/// Reason attached to `game_over` when the other player dropped out.
pub const REASON_OPPONENT_DISCONNECTED: &str = "opponent_disconnected";

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// A user's lifetime counters as served by `GET /api/user/profile`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub game_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
