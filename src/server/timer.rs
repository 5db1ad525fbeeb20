//! Per-match turn timer.
//!
//! One tokio task per armed timer. A task only ever advances the turn if the
//! match still carries the generation it was armed with; any later arming
//! (voluntary end turn, termination) bumps the generation and leaves the
//! old task to exit on wake-up. A task that fires and re-arms keeps looping
//! instead of spawning a successor.

use std::sync::{Arc, Weak};

use tokio::sync::Mutex;
use uuid::Uuid;

use super::orchestrator::{settle_turn, MatchOrchestrator};
use crate::state::{Match, TimerRequest};

/// Spawn a timer task for `request`.
pub(crate) fn spawn(
    orchestrator: &Arc<MatchOrchestrator>,
    match_id: Uuid,
    handle: &Arc<Mutex<Match>>,
    request: TimerRequest,
) {
    let orchestrator = Arc::downgrade(orchestrator);
    let handle = Arc::downgrade(handle);
    tokio::spawn(run(orchestrator, match_id, handle, request));
}

async fn run(
    orchestrator: Weak<MatchOrchestrator>,
    match_id: Uuid,
    handle: Weak<Mutex<Match>>,
    mut request: TimerRequest,
) {
    loop {
        tokio::time::sleep(request.duration).await;

        let Some(handle) = handle.upgrade() else {
            return;
        };
        let mut game = handle.lock().await;
        let Some(result) = game.on_timer_expired(request.generation) else {
            tracing::trace!(match_id = %match_id, generation = request.generation, "stale turn timer");
            return;
        };

        settle_turn(&mut game, result);
        let next = game.take_timer_request();
        let ended = game.is_ended();
        drop(game);

        if ended {
            if let Some(orchestrator) = orchestrator.upgrade() {
                orchestrator.remove_match(match_id).await;
            }
            return;
        }

        match next {
            Some(next) => request = next,
            None => return,
        }
    }
}
