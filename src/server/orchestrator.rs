//! Matchmaking and match routing.
//!
//! The orchestrator owns the waiting queue, the registry of live matches
//! and the connected player sessions. Pairing is FIFO and happens inside the
//! call that grew the queue. Requests for a player with no live match are
//! dropped: late end-turns and other stale input are routine.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, MutexGuard};
use uuid::Uuid;

use super::timer;
use crate::state::{
    BattleConfig, CardStore, ClientMessage, ConfigProvider, Match, MatchError, MatchStatus, Outbox, PlayError,
    PlayerEvent, PlayerLocation, PlayerSession, ServerMessage, SessionManager, TurnOutcome,
    BATTLE_SCENE, GUEST_NAME, MATCH_SIZE,
};

/// Shared handle to a live match.
pub type MatchHandle = Arc<Mutex<Match>>;

#[derive(Debug, Default)]
struct Registry {
    /// Players waiting for a match, oldest first
    queue: VecDeque<Uuid>,

    /// Live matches by ID
    matches: HashMap<Uuid, MatchHandle>,

    /// Player ID to match ID
    player_index: HashMap<Uuid, Uuid>,

    sessions: SessionManager,
}

/// Process-wide match coordinator. Build one per server and share the `Arc`.
pub struct MatchOrchestrator {
    registry: Mutex<Registry>,
    cards: Arc<dyn CardStore>,
    config: Arc<dyn ConfigProvider>,
}

/// Apply a turn advance result. Faults terminate the match.
pub(crate) fn settle_turn(game: &mut Match, result: Result<TurnOutcome, MatchError>) {
    match result {
        Ok(_) => {}
        Err(MatchError::NotInProgress) => {
            tracing::debug!(match_id = %game.id, "turn advance on inactive match");
        }
        Err(e) => {
            tracing::warn!(match_id = %game.id, error = %e, "turn advance failed, stopping match");
            game.terminate();
        }
    }
}

/// Unlink a match from the registry and release its players.
fn forget_match(registry: &mut Registry, match_id: Uuid) -> Option<MatchHandle> {
    let handle = registry.matches.remove(&match_id)?;
    registry.player_index.retain(|_, m| *m != match_id);
    registry.sessions.release_match(match_id);
    Some(handle)
}

impl MatchOrchestrator {
    pub fn new(cards: Arc<dyn CardStore>, config: Arc<dyn ConfigProvider>) -> Arc<Self> {
        Arc::new(Self {
            registry: Mutex::new(Registry::default()),
            cards,
            config,
        })
    }

    // Sessions

    /// Register an authenticated player.
    pub async fn register(&self, session: PlayerSession) {
        tracing::info!(player_id = %session.id, name = %session.name, guest = session.is_guest, "player connected");
        self.registry.lock().await.sessions.add(session);
    }

    /// Authentication hand-off. Guests get a fresh ID and the guest name.
    pub async fn connect(&self, name: &str, is_guest: bool, outbox: Outbox) -> Uuid {
        let session = if is_guest {
            PlayerSession::guest(outbox)
        } else {
            PlayerSession::new(outbox.player_id(), name.to_string(), false, outbox)
        };
        let id = session.id;
        self.register(session).await;
        id
    }

    /// Register a guest and return its ID with the receiving end of its
    /// outbox.
    pub async fn connect_guest(&self) -> (Uuid, mpsc::UnboundedReceiver<ServerMessage>) {
        let (outbox, receiver) = Outbox::channel(Uuid::new_v4());
        let id = self.connect(GUEST_NAME, true, outbox).await;
        (id, receiver)
    }

    /// The player's transport went away. Any match they are in is forfeited.
    pub async fn disconnect(&self, player_id: Uuid) {
        let handle = {
            let mut registry = self.registry.lock().await;
            registry.queue.retain(|id| *id != player_id);
            registry.sessions.remove(player_id);
            registry
                .player_index
                .remove(&player_id)
                .and_then(|match_id| registry.matches.get(&match_id).cloned())
        };
        tracing::info!(player_id = %player_id, "player disconnected");

        if let Some(handle) = handle {
            let match_id = {
                let mut game = handle.lock().await;
                game.forfeit(player_id);
                game.id
            };
            self.remove_match(match_id).await;
        }
    }

    // Queue

    /// Start looking for a match. No-op if already queued. A player still
    /// seated in a live match abandons it first.
    pub async fn enqueue(&self, player_id: Uuid) {
        let mut registry = self.registry.lock().await;
        if registry.queue.contains(&player_id) {
            return;
        }
        let Some(session) = registry.sessions.get_mut(player_id) else {
            tracing::debug!(player_id = %player_id, "enqueue from unknown player");
            return;
        };
        if let PlayerLocation::InMatch { .. } = session.location() {
            let _ = session.apply(PlayerEvent::LeaveMatch);
        }
        if let Err(e) = session.apply(PlayerEvent::JoinQueue) {
            tracing::debug!(player_id = %player_id, error = %e, "enqueue rejected");
            return;
        }

        if let Some(match_id) = registry.player_index.remove(&player_id) {
            let stale = match registry.matches.get(&match_id) {
                Some(handle) => {
                    let mut game = handle.lock().await;
                    game.abandon(player_id);
                    // a match that never started, or that nobody is left in, can not recover
                    if game.status() != MatchStatus::InProgress
                        || game.participants().iter().all(|p| !p.present)
                    {
                        game.terminate();
                        true
                    } else {
                        false
                    }
                }
                None => false,
            };
            if stale {
                forget_match(&mut registry, match_id);
            }
        }

        registry.queue.push_back(player_id);
        tracing::debug!(player_id = %player_id, queued = registry.queue.len(), "player looking for match");

        self.pair_waiting(&mut registry);
    }

    /// Stop looking for a match. No error if not queued.
    pub async fn dequeue(&self, player_id: Uuid) {
        let mut registry = self.registry.lock().await;
        let Some(pos) = registry.queue.iter().position(|id| *id == player_id) else {
            return;
        };
        registry.queue.remove(pos);
        if let Some(session) = registry.sessions.get_mut(player_id) {
            let _ = session.apply(PlayerEvent::LeaveQueue);
        }
        tracing::debug!(player_id = %player_id, queued = registry.queue.len(), "player stopped looking for match");
    }

    /// Pair waiting players into new matches.
    pub async fn attempt_pairing(&self) {
        let mut registry = self.registry.lock().await;
        self.pair_waiting(&mut registry);
    }

    fn pair_waiting(&self, registry: &mut MutexGuard<'_, Registry>) {
        while registry.queue.len() >= MATCH_SIZE {
            let ids: Vec<Uuid> = registry.queue.drain(..MATCH_SIZE).collect();

            let config = match BattleConfig::load(self.config.as_ref()) {
                Ok(config) => config,
                Err(e) => {
                    tracing::error!(error = %e, "cannot create match");
                    for id in &ids {
                        if let Some(session) = registry.sessions.get_mut(*id) {
                            let _ = session.apply(PlayerEvent::LeaveQueue);
                            let _ = session.send(ServerMessage::Error { message: e.to_string() });
                        }
                    }
                    continue;
                }
            };

            if ids.iter().any(|id| registry.sessions.get(*id).is_none()) {
                tracing::warn!("queued player without a session, skipping");
                for id in ids.iter().rev() {
                    if registry.sessions.get(*id).is_some() {
                        registry.queue.push_front(*id);
                    }
                }
                continue;
            }
            let game = match (registry.sessions.get(ids[0]), registry.sessions.get(ids[1])) {
                (Some(first), Some(second)) => Match::new([first, second], config, self.cards.as_ref()),
                _ => continue,
            };
            let match_id = game.id;

            for id in &ids {
                registry.player_index.insert(*id, match_id);
                if let Some(session) = registry.sessions.get_mut(*id) {
                    let _ = session.apply(PlayerEvent::MatchFound { match_id });
                    let _ = session.send(ServerMessage::MatchFound {
                        match_id,
                        battle_scene: BATTLE_SCENE.to_string(),
                    });
                }
            }
            registry.matches.insert(match_id, Arc::new(Mutex::new(game)));
        }
    }

    // Matches

    /// Drop a match from the registry and release its players. Idempotent.
    pub async fn remove_match(&self, match_id: Uuid) {
        let handle = {
            let mut registry = self.registry.lock().await;
            let Some(handle) = forget_match(&mut registry, match_id) else {
                return;
            };
            handle
        };

        handle.lock().await.terminate();
        tracing::debug!(match_id = %match_id, "match removed");
    }

    /// Route a client request to wherever it belongs.
    pub async fn route_request(self: &Arc<Self>, player_id: Uuid, message: ClientMessage) {
        match message {
            ClientMessage::FindMatch => return self.enqueue(player_id).await,
            ClientMessage::CancelFindMatch => return self.dequeue(player_id).await,
            _ => {}
        }

        let Some(handle) = self.match_for_player(player_id).await else {
            tracing::debug!(player_id = %player_id, ?message, "no match for player, dropping request");
            return;
        };

        let mut game = handle.lock().await;
        let rejection = match message {
            ClientMessage::PlayCard { card_id } => match game.play_card(player_id, card_id, self.cards.as_ref()) {
                Ok(_) => None,
                Err(PlayError::Invalid(e)) => {
                    tracing::warn!(match_id = %game.id, player_id = %player_id, error = %e, "card play rejected");
                    Some(e.to_string())
                }
                Err(e) => Some(e.to_string()),
            },
            ClientMessage::DiscardCard { card_id } => game
                .discard_card(player_id, card_id, self.cards.as_ref())
                .err()
                .map(|e| e.to_string()),
            ClientMessage::EndTurn => {
                if game.is_current(player_id) {
                    let result = game.advance_turn();
                    settle_turn(&mut game, result);
                    None
                } else {
                    Some("It's not your turn".to_string())
                }
            }
            ClientMessage::RequestBattleInfo => {
                if let Some(info) = game.battle_info(player_id) {
                    let _ = game.send_to(player_id, ServerMessage::BattleInfo(info));
                }
                game.player_ready(player_id).err().map(|e| e.to_string())
            }
            ClientMessage::ExitMatch => game.concede(player_id).err().map(|e| e.to_string()),
            ClientMessage::FindMatch | ClientMessage::CancelFindMatch => None,
        };

        if let Some(reason) = rejection {
            tracing::debug!(match_id = %game.id, player_id = %player_id, %reason, "request rejected");
            let _ = game.send_to(player_id, ServerMessage::Rejected { reason });
        }

        let match_id = game.id;
        if let Some(request) = game.take_timer_request() {
            timer::spawn(self, match_id, &handle, request);
        }
        let ended = game.is_ended();
        drop(game);

        if ended {
            self.remove_match(match_id).await;
        }
    }

    // Introspection

    pub async fn match_for_player(&self, player_id: Uuid) -> Option<MatchHandle> {
        let registry = self.registry.lock().await;
        let match_id = registry.player_index.get(&player_id)?;
        registry.matches.get(match_id).cloned()
    }

    /// Run `f` against the player's match under its lock.
    pub async fn with_match<R>(&self, player_id: Uuid, f: impl FnOnce(&Match) -> R) -> Option<R> {
        let handle = self.match_for_player(player_id).await?;
        let game = handle.lock().await;
        Some(f(&game))
    }

    pub async fn get_match(&self, match_id: Uuid) -> Option<MatchHandle> {
        self.registry.lock().await.matches.get(&match_id).cloned()
    }

    pub async fn player_location(&self, player_id: Uuid) -> Option<PlayerLocation> {
        self.registry
            .lock()
            .await
            .sessions
            .get(player_id)
            .map(|s| s.location())
    }

    pub async fn queue_len(&self) -> usize {
        self.registry.lock().await.queue.len()
    }

    pub async fn queued_players(&self) -> Vec<Uuid> {
        self.registry.lock().await.queue.iter().copied().collect()
    }

    pub async fn match_count(&self) -> usize {
        self.registry.lock().await.matches.len()
    }
}
