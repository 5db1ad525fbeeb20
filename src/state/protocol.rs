//! Message contract between clients and the match core.
//!
//! The transport decodes client frames into [`ClientMessage`] and drains
//! each player's [`Outbox`]. Sending never blocks and is never retried here.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::cards::CardId;

/// Scene clients load once paired.
pub const BATTLE_SCENE: &str = "Battle";

/// Requests from a connected player. The sender's identity comes from the
/// authenticated connection, not from the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    FindMatch,
    CancelFindMatch,
    PlayCard { card_id: CardId },
    DiscardCard { card_id: CardId },
    EndTurn,
    /// Ask for a state snapshot; also signals ready
    RequestBattleInfo,
    /// Concede the current match
    ExitMatch,
}

/// Who played a card, from the receiver's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardAction {
    YouPlayed,
    EnemyPlayed,
}

/// State snapshot for late join or resync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleInfo {
    pub player_id: Uuid,
    pub your_name: String,
    pub enemy_name: String,
    pub your_tower_health: u32,
    pub enemy_tower_health: u32,
    pub your_wall_health: u32,
    pub enemy_wall_health: u32,
    pub is_your_turn: bool,
    /// Full turn length in seconds
    pub timer: u32,
    pub seconds_remaining: Option<i64>,
    pub start_damage_fatigue: u32,
    pub turn_fatigue: u32,
    pub fatigue_limit: u32,
}

/// Notifications to a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    MatchFound { match_id: Uuid, battle_scene: String },
    TurnStarted,
    TurnEnded,
    MatchWin,
    MatchLose,
    MatchDraw,
    MatchExited,
    BattleInfo(BattleInfo),
    CardPlayed { player_id: Uuid, card_id: CardId, action: CardAction },
    CardDrawn { card_id: CardId },
    CardDiscarded { card_id: CardId, drawn: Option<CardId> },
    Rejected { reason: String },
    Error { message: String },
}

/// The receiving side of a player's connection is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportError {
    pub player_id: Uuid,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connection to player {} is closed", self.player_id)
    }
}

impl std::error::Error for TransportError {}

/// Send handle to one player's connection.
#[derive(Debug, Clone)]
pub struct Outbox {
    player_id: Uuid,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

impl Outbox {
    pub fn new(player_id: Uuid, sender: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self { player_id, sender }
    }

    /// Create an outbox and the receiver the transport drains.
    pub fn channel(player_id: Uuid) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(player_id, tx), rx)
    }

    pub fn player_id(&self) -> Uuid {
        self.player_id
    }

    /// Fire-and-forget send.
    pub fn send(&self, message: ServerMessage) -> Result<(), TransportError> {
        self.sender.send(message).map_err(|_| TransportError {
            player_id: self.player_id,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
