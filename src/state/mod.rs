//! Synchronous match state for TowerSmash.
//!
//! This module provides the core state types:
//!
//! - `castle` - Tower, wall and resource pools
//! - `hand` - A player's deck and hand, with card cycling
//! - `cards` - Card definitions, effects and the card catalog
//! - `config` - Battle configuration and the key/value source it is read from
//! - `player` - Player sessions and the player location state machine
//! - `protocol` - Client requests, server notifications and outboxes
//! - `battle` - The two-player match: turns, fatigue, card play, winners
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Match                              │
//! │                                                              │
//! │  ┌──────────────────────┐        ┌──────────────────────┐    │
//! │  │    Participant 0     │        │    Participant 1     │    │
//! │  │  Castle  Hand Outbox │        │  Castle  Hand Outbox │    │
//! │  └──────────────────────┘        └──────────────────────┘    │
//! │                                                              │
//! │  current seat, turn number, fatigue, timer generation        │
//! └──────────────────────────────────────────────────────────────┘
//!          ▲ match_id
//!          │
//!  PlayerSession::location  (Idle ──▶ Searching ──▶ InMatch)
//! ```
//!
//! Nothing here locks or spawns. Operations that need a timer leave a
//! [`TimerRequest`] on the match for the caller to pick up.

pub mod battle;
pub mod cards;
pub mod castle;
pub mod config;
pub mod hand;
pub mod player;
pub mod protocol;

// Re-export commonly used types
pub use battle::{
    Match, MatchError, MatchOutcome, MatchStatus, Participant, PlayError, PlayOutcome,
    TimerRequest, TurnOutcome, ValidationError,
};
pub use cards::{
    AddIncome, AddResource, BuildTower, BuildWall, CardData, CardId, CardLibrary, CardStore,
    Damage, DamageTower, Effect, EffectError, SpendResource,
};
pub use castle::{Castle, CastleConfig, Resource, Structure};
pub use config::{
    BattleConfig, ConfigError, ConfigProvider, DeckConfig, Settings, BATTLE_SECTION, DECK_SECTION,
    MATCH_SIZE,
};
pub use hand::Hand;
pub use player::{
    InvalidTransition, PlayerEvent, PlayerLocation, PlayerSession, SessionManager, GUEST_NAME,
};
pub use protocol::{
    BattleInfo, CardAction, ClientMessage, Outbox, ServerMessage, TransportError, BATTLE_SCENE,
};
