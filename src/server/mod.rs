//! Async orchestration layer.
//!
//! - `orchestrator` - matchmaking queue, match registry, request routing
//! - `timer` - generation-keyed turn timers
//!
//! # Locking
//!
//! The orchestrator's registry (queue, matches, sessions) sits behind one
//! lock; each match sits behind its own. The registry lock may be held while
//! a match lock is taken, never the other way round, so the two can not
//! deadlock. Operations routed to a match release the registry first, so
//! matches never wait on each other.

pub mod orchestrator;
mod timer;

pub use orchestrator::{MatchHandle, MatchOrchestrator};
