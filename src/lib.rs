//! TowerSmash match server core
//!
//! This crate provides matchmaking and authoritative battle logic for
//! TowerSmash, a two-player turn-based card game. Each player defends a
//! castle (a tower behind a wall) and plays cards to damage the enemy castle
//! or build up their own.
//!
//! # Overview
//!
//! - **State** - Castles, hands, cards, configuration and the [`Match`]
//!   itself. Plain synchronous types with validated operations.
//!
//! - **Server** - The [`MatchOrchestrator`]: matchmaking queue, live match
//!   registry, request routing and per-match turn timers on tokio.
//!
//! # Design Principles
//!
//! 1. **Players are ordered by seat** - A match holds exactly two
//!    participants; the first one queued moves first.
//!
//! 2. **Stale input is dropped** - Requests for a player outside a match are
//!    logged and ignored, and timers are keyed by generation.
//!
//! 3. **No networking** - Outgoing messages go to per-player channels that a
//!    transport drains.
//!
//! 4. **Serialization-ready** - All messages are serde types.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use towersmash_state::{
//!     BuildWall, CardData, CardLibrary, ClientMessage, Damage, MatchOrchestrator, Settings,
//! };
//!
//! # async fn run() {
//! let mut library = CardLibrary::new();
//! library.add(CardData::new("Arrow").with_effect(Damage { amount: 3 }));
//! library.add(CardData::new("Mortar").with_effect(BuildWall { amount: 4 }));
//!
//! let settings = Settings::new()
//!     .with("BattleConfiguration", "turnTime", "30")
//!     .with("BattleConfiguration", "fatigueTurnStart", "30")
//!     .with("BattleConfiguration", "fatigueDamageStart", "1")
//!     .with("BattleConfiguration", "fatigueLimit", "10");
//!
//! let orchestrator = MatchOrchestrator::new(Arc::new(library), Arc::new(settings));
//!
//! let (alice, _alice_rx) = orchestrator.connect_guest().await;
//! let (bob, _bob_rx) = orchestrator.connect_guest().await;
//! orchestrator.route_request(alice, ClientMessage::FindMatch).await;
//! orchestrator.route_request(bob, ClientMessage::FindMatch).await;
//! assert_eq!(orchestrator.match_count().await, 1);
//! # }
//! ```

pub mod server;
pub mod state;

pub use server::*;
pub use state::*;
