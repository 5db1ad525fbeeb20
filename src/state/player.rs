//! Player sessions and the player location state machine.
//!
//! # State Diagram
//!
//! ```text
//! ┌──────────┐  join_queue   ┌───────────┐  match_found  ┌───────────┐
//! │   Idle   │──────────────▶│ Searching │──────────────▶│  InMatch  │
//! └──────────┘               └─────┬─────┘               └─────┬─────┘
//!      ▲ ▲       leave_queue       │                           │
//!      │ └─────────────────────────┘                           │
//!      │                       leave_match                     │
//!      └───────────────────────────────────────────────────────┘
//! ```
//!
//! A session's `InMatch` location is its back-reference to the owning match.
//! It holds the match ID only, so a finished match is never kept alive by
//! the players that were in it.

use std::collections::HashMap;
use std::fmt;

use uuid::Uuid;

use super::protocol::{Outbox, ServerMessage, TransportError};

/// Display name given to guest players.
pub const GUEST_NAME: &str = "Guest";

/// Where a player currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerLocation {
    /// Connected, not looking for a match
    #[default]
    Idle,

    /// In the matchmaking queue
    Searching,

    /// Owned by a live match
    InMatch { match_id: Uuid },
}

impl PlayerLocation {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_searching(&self) -> bool {
        matches!(self, Self::Searching)
    }

    pub fn match_id(&self) -> Option<Uuid> {
        match self {
            Self::InMatch { match_id } => Some(*match_id),
            _ => None,
        }
    }
}

impl fmt::Display for PlayerLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Searching => write!(f, "Searching"),
            Self::InMatch { match_id } => write!(f, "InMatch({})", match_id),
        }
    }
}

/// State transition events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    JoinQueue,
    LeaveQueue,
    MatchFound { match_id: Uuid },
    LeaveMatch,
}

/// Error when a state transition is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: PlayerLocation,
    pub event: PlayerEvent,
    pub reason: &'static str,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid transition from {} via {:?}: {}",
            self.from, self.event, self.reason
        )
    }
}

impl std::error::Error for InvalidTransition {}

/// One connected, authenticated player.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub id: Uuid,
    pub name: String,
    pub is_guest: bool,
    pub outbox: Outbox,
    location: PlayerLocation,
    pub connected_at: chrono::DateTime<chrono::Utc>,
}

impl PlayerSession {
    pub fn new(id: Uuid, name: String, is_guest: bool, outbox: Outbox) -> Self {
        Self {
            id,
            name,
            is_guest,
            outbox,
            location: PlayerLocation::Idle,
            connected_at: chrono::Utc::now(),
        }
    }

    /// Create a guest session. The outbox's player ID becomes the session ID.
    pub fn guest(outbox: Outbox) -> Self {
        Self::new(outbox.player_id(), GUEST_NAME.to_string(), true, outbox)
    }

    pub fn location(&self) -> PlayerLocation {
        self.location
    }

    /// Apply an event in place, returning error if invalid.
    pub fn apply(&mut self, event: PlayerEvent) -> Result<(), InvalidTransition> {
        self.location = self.transition(event)?;
        Ok(())
    }

    pub fn send(&self, message: ServerMessage) -> Result<(), TransportError> {
        self.outbox.send(message)
    }

    fn transition(&self, event: PlayerEvent) -> Result<PlayerLocation, InvalidTransition> {
        use PlayerEvent::*;
        use PlayerLocation::*;

        let invalid = |reason: &'static str| InvalidTransition {
            from: self.location,
            event,
            reason,
        };

        match (self.location, event) {
            (Idle, JoinQueue) => Ok(Searching),
            (Searching, JoinQueue) => Err(invalid("Already searching")),
            (InMatch { .. }, JoinQueue) => Err(invalid("Must leave match first")),

            (Searching, LeaveQueue) => Ok(Idle),
            (_, LeaveQueue) => Err(invalid("Not searching")),

            (Searching, MatchFound { match_id }) => Ok(InMatch { match_id }),
            (InMatch { .. }, MatchFound { .. }) => Err(invalid("Already in a match")),
            (Idle, MatchFound { .. }) => Err(invalid("Must be searching")),

            (InMatch { .. }, LeaveMatch) => Ok(Idle),
            (_, LeaveMatch) => Err(invalid("Not in a match")),
        }
    }
}

/// Session manager - tracks all connected players.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<Uuid, PlayerSession>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session, replacing any previous one with the same ID.
    pub fn add(&mut self, session: PlayerSession) {
        self.sessions.insert(session.id, session);
    }

    pub fn get(&self, player_id: Uuid) -> Option<&PlayerSession> {
        self.sessions.get(&player_id)
    }

    pub fn get_mut(&mut self, player_id: Uuid) -> Option<&mut PlayerSession> {
        self.sessions.get_mut(&player_id)
    }

    pub fn remove(&mut self, player_id: Uuid) -> Option<PlayerSession> {
        self.sessions.remove(&player_id)
    }

    /// Clear the match back-reference of every player still pointing at
    /// `match_id`.
    pub fn release_match(&mut self, match_id: Uuid) -> Vec<Uuid> {
        let mut released = Vec::new();
        for session in self.sessions.values_mut() {
            if session.location.match_id() == Some(match_id)
                && session.apply(PlayerEvent::LeaveMatch).is_ok()
            {
                released.push(session.id);
            }
        }
        released
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}
