//! Match state machine.
//!
//! A match moves `WaitingForReady → InProgress → Ended`. Every operation
//! here is synchronous and assumes the caller holds the match exclusively;
//! the orchestrator wraps each match in its own lock.
//!
//! The turn timer lives outside: arming it only bumps a generation counter
//! and leaves a [`TimerRequest`] for the caller to schedule. A timer that
//! wakes with a stale generation is ignored, so at most one timer can ever
//! advance the turn.

use std::fmt;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::Instant;
use uuid::Uuid;

use super::cards::{CardId, CardStore, EffectError};
use super::castle::Castle;
use super::config::{BattleConfig, MATCH_SIZE};
use super::hand::Hand;
use super::player::PlayerSession;
use super::protocol::{BattleInfo, CardAction, Outbox, ServerMessage, TransportError};

/// Match state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchStatus {
    /// Created, waiting for every participant to signal ready
    #[default]
    WaitingForReady,
    /// Turns are running
    InProgress,
    /// Terminal
    Ended,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitingForReady => "waiting_for_ready",
            Self::InProgress => "in_progress",
            Self::Ended => "ended",
        }
    }
}

/// How a match finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Winner(Uuid),
    Draw,
}

/// Result of a successful turn advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Continued {
        current: Uuid,
        turn: u32,
        /// Fatigue damage dealt to every participant this advance
        fatigue_applied: Option<u32>,
    },
    Finished(MatchOutcome),
}

/// Result of a successful card play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayOutcome {
    pub drawn: Option<CardId>,
    pub finished: Option<MatchOutcome>,
}

/// A timer the caller must schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRequest {
    pub generation: u64,
    pub duration: Duration,
}

/// Rejected player input. Never affects the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    MatchNotInProgress,
    PlayerNotFound,
    OpponentMissing,
    NotYourTurn,
    UnknownCard,
    CardNotInHand,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MatchNotInProgress => write!(f, "Match is not in progress"),
            Self::PlayerNotFound => write!(f, "Player is not in this match"),
            Self::OpponentMissing => write!(f, "Opponent is no longer in this match"),
            Self::NotYourTurn => write!(f, "It's not your turn"),
            Self::UnknownCard => write!(f, "Unknown card"),
            Self::CardNotInHand => write!(f, "Card is not in your hand"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Why a card play did not happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayError {
    Invalid(ValidationError),
    /// An effect failed; the play was rolled back
    Effect(EffectError),
}

impl fmt::Display for PlayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(e) => write!(f, "{}", e),
            Self::Effect(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for PlayError {}

impl From<ValidationError> for PlayError {
    fn from(e: ValidationError) -> Self {
        Self::Invalid(e)
    }
}

/// Turn advancement failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    /// Nothing to advance
    NotInProgress,
    /// Match state can no longer be trusted; the match must be terminated
    Fault { match_id: Uuid, reason: String },
}

impl MatchError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fault { .. })
    }
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInProgress => write!(f, "Match is not in progress"),
            Self::Fault { match_id, reason } => write!(f, "Match {} faulted: {}", match_id, reason),
        }
    }
}

impl std::error::Error for MatchError {}

/// One seat in a match.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: Uuid,
    pub name: String,
    outbox: Outbox,
    pub castle: Castle,
    pub hand: Hand,
    pub ready: bool,
    /// Cleared when the player abandons the match for the queue
    pub present: bool,
}

impl Participant {
    fn send(&self, message: ServerMessage) -> Result<(), TransportError> {
        self.outbox.send(message)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "player_id": self.id,
            "name": self.name,
            "ready": self.ready,
            "present": self.present,
            "castle": self.castle.to_json(),
            "hand_size": self.hand.len(),
            "deck_size": self.hand.deck_len()
        })
    }
}

/// A two-player match.
#[derive(Debug)]
pub struct Match {
    pub id: Uuid,
    status: MatchStatus,

    /// Seats in pairing order; seat 0 moves first
    participants: [Participant; MATCH_SIZE],

    /// Seat index whose turn it is
    current: usize,

    config: BattleConfig,

    /// Completed turn advances since start
    turn_number: u32,

    /// Damage the next fatigue tick deals
    fatigue_damage: u32,

    fatigue_turn_start: u32,

    timer_generation: u64,
    pending_timer: Option<TimerRequest>,
    /// On the tokio clock, like the timer task
    turn_deadline: Option<Instant>,

    rng: StdRng,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Match {
    /// Create a match for two paired players.
    pub fn new(players: [&PlayerSession; MATCH_SIZE], config: BattleConfig, store: &dyn CardStore) -> Self {
        Self::with_rng(players, config, store, StdRng::from_entropy())
    }

    /// Create a match with a fixed RNG (deck order and reinsertion).
    pub fn with_rng(
        players: [&PlayerSession; MATCH_SIZE],
        config: BattleConfig,
        store: &dyn CardStore,
        mut rng: StdRng,
    ) -> Self {
        let participants = players.map(|p| Participant {
            id: p.id,
            name: p.name.clone(),
            outbox: p.outbox.clone(),
            castle: Castle::from_config(&config.castle),
            hand: Hand::new(store.player_pool(&mut rng), config.start_hand_size),
            ready: false,
            present: true,
        });

        let id = Uuid::new_v4();
        tracing::info!(match_id = %id, "match created");

        Self {
            id,
            status: MatchStatus::WaitingForReady,
            participants,
            current: 0,
            fatigue_damage: config.fatigue_damage_start,
            fatigue_turn_start: config.fatigue_turn_start,
            config,
            turn_number: 0,
            timer_generation: 0,
            pending_timer: None,
            turn_deadline: None,
            rng,
            created_at: chrono::Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    // Accessors

    pub fn status(&self) -> MatchStatus {
        self.status
    }

    pub fn is_ended(&self) -> bool {
        self.status == MatchStatus::Ended
    }

    pub fn config(&self) -> &BattleConfig {
        &self.config
    }

    pub fn turn_number(&self) -> u32 {
        self.turn_number
    }

    pub fn fatigue_damage(&self) -> u32 {
        self.fatigue_damage
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Get a participant by player ID (present or not).
    pub fn participant(&self, player_id: Uuid) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == player_id)
    }

    pub fn participant_mut(&mut self, player_id: Uuid) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == player_id)
    }

    /// Check if player is seated and has not abandoned.
    pub fn has_player(&self, player_id: Uuid) -> bool {
        self.participants.iter().any(|p| p.id == player_id && p.present)
    }

    pub fn current_player_id(&self) -> Uuid {
        self.participants[self.current].id
    }

    pub fn is_current(&self, player_id: Uuid) -> bool {
        self.current_player_id() == player_id
    }

    /// Send a message to one participant.
    pub fn send_to(&self, player_id: Uuid, message: ServerMessage) -> Result<(), TransportError> {
        match self.participant(player_id) {
            Some(participant) => participant.send(message),
            None => Err(TransportError { player_id }),
        }
    }

    fn seat_of(&self, player_id: Uuid) -> Option<usize> {
        self.participants
            .iter()
            .position(|p| p.id == player_id && p.present)
    }

    /// Mutable access to a seat and its opponent at the same time.
    fn seat_and_opponent(&mut self, seat: usize) -> (&mut Participant, &mut Participant) {
        let (first, second) = self.participants.split_at_mut(1);
        if seat == 0 {
            (&mut first[0], &mut second[0])
        } else {
            (&mut second[0], &mut first[0])
        }
    }

    fn fault(&self, reason: impl Into<String>) -> MatchError {
        MatchError::Fault {
            match_id: self.id,
            reason: reason.into(),
        }
    }

    // Timer

    /// Supersede any outstanding timer and request a fresh one.
    fn restart_timer(&mut self) {
        self.timer_generation += 1;
        let duration = self.config.turn_duration();
        self.pending_timer = Some(TimerRequest {
            generation: self.timer_generation,
            duration,
        });
        self.turn_deadline = Some(Instant::now() + duration);
    }

    /// Take the timer the last operation armed, if any.
    pub fn take_timer_request(&mut self) -> Option<TimerRequest> {
        self.pending_timer.take()
    }

    pub fn timer_generation(&self) -> u64 {
        self.timer_generation
    }

    /// Whether a timer armed with `generation` may still fire.
    pub fn timer_is_current(&self, generation: u64) -> bool {
        self.status == MatchStatus::InProgress && generation == self.timer_generation
    }

    /// Timer expiry. Stale timers return `None` and do nothing.
    pub fn on_timer_expired(&mut self, generation: u64) -> Option<Result<TurnOutcome, MatchError>> {
        if !self.timer_is_current(generation) {
            return None;
        }
        tracing::debug!(match_id = %self.id, turn = self.turn_number, "turn timer expired");
        Some(self.advance_turn())
    }

    // Lifecycle

    /// Mark a player ready. Starts the match once everyone is ready.
    /// Returns whether this call started the match.
    pub fn player_ready(&mut self, player_id: Uuid) -> Result<bool, ValidationError> {
        let seat = self.seat_of(player_id).ok_or_else(|| {
            tracing::warn!(match_id = %self.id, player_id = %player_id, "ready from unknown player");
            ValidationError::PlayerNotFound
        })?;

        self.participants[seat].ready = true;
        tracing::debug!(match_id = %self.id, player_id = %player_id, "player ready");

        if self.status == MatchStatus::WaitingForReady && self.participants.iter().all(|p| p.ready) {
            self.start();
            return Ok(true);
        }
        Ok(false)
    }

    fn start(&mut self) {
        self.status = MatchStatus::InProgress;
        self.started_at = Some(chrono::Utc::now());
        self.turn_number = 0;
        self.fatigue_turn_start = self.config.fatigue_turn_start;
        self.fatigue_damage = self.config.fatigue_damage_start;

        for participant in &mut self.participants {
            for card_id in participant.hand.fill_hand() {
                let _ = participant.send(ServerMessage::CardDrawn { card_id });
            }
        }

        let _ = self.participants[self.current].send(ServerMessage::TurnStarted);
        self.restart_timer();

        tracing::info!(match_id = %self.id, first = %self.current_player_id(), "match started");
    }

    /// Hand the turn to the other participant.
    ///
    /// Runs fatigue, the win check and the economy tick. A participant that
    /// can no longer be reached forfeits. An absent participant is a fault.
    pub fn advance_turn(&mut self) -> Result<TurnOutcome, MatchError> {
        if self.status != MatchStatus::InProgress {
            return Err(MatchError::NotInProgress);
        }
        if let Some(missing) = self.participants.iter().find(|p| !p.present) {
            return Err(self.fault(format!("participant {} left the match", missing.id)));
        }

        let departing = self.current;
        let next = (departing + 1) % MATCH_SIZE;

        if self.participants[departing].send(ServerMessage::TurnEnded).is_err() {
            return Ok(self.forfeit_seat(departing));
        }
        self.current = next;
        if self.participants[next].send(ServerMessage::TurnStarted).is_err() {
            return Ok(self.forfeit_seat(next));
        }

        let fatigue_applied = self.apply_fatigue();

        if let Some(outcome) = self.check_winner() {
            self.finish(outcome);
            return Ok(TurnOutcome::Finished(outcome));
        }

        if self.turn_number % 2 == 0 {
            for participant in &mut self.participants {
                participant.castle.collect_income();
            }
        }

        self.restart_timer();
        self.turn_number += 1;

        tracing::debug!(
            match_id = %self.id,
            player_id = %self.current_player_id(),
            turn = self.turn_number,
            "turn started"
        );

        Ok(TurnOutcome::Continued {
            current: self.current_player_id(),
            turn: self.turn_number,
            fatigue_applied,
        })
    }

    /// Every other turn past the threshold, damage everyone and escalate.
    fn apply_fatigue(&mut self) -> Option<u32> {
        if self.turn_number + 2 < self.fatigue_turn_start || self.turn_number % 2 == 0 {
            return None;
        }

        let damage = self.fatigue_damage;
        for participant in &mut self.participants {
            participant.castle.apply_fatigue(damage);
        }
        if self.fatigue_damage < self.config.fatigue_limit {
            self.fatigue_damage += 1;
        }

        tracing::debug!(match_id = %self.id, damage, "fatigue applied");
        Some(damage)
    }

    /// Destroyed tower loses (draw if the other tower is down too), then a
    /// full tower wins.
    pub fn check_winner(&self) -> Option<MatchOutcome> {
        for (seat, participant) in self.participants.iter().enumerate() {
            if participant.castle.tower.is_destroyed() {
                let winner = &self.participants[(seat + 1) % MATCH_SIZE];
                if winner.castle.tower.is_destroyed() {
                    return Some(MatchOutcome::Draw);
                }
                return Some(MatchOutcome::Winner(winner.id));
            }
        }

        self.participants
            .iter()
            .find(|p| p.castle.tower.is_full())
            .map(|p| MatchOutcome::Winner(p.id))
    }

    /// Notify the result and end the match.
    fn finish(&mut self, outcome: MatchOutcome) {
        match outcome {
            MatchOutcome::Draw => {
                tracing::info!(match_id = %self.id, "match ended in a draw");
                for participant in &self.participants {
                    let _ = participant.send(ServerMessage::MatchDraw);
                }
            }
            MatchOutcome::Winner(winner) => {
                tracing::info!(match_id = %self.id, winner = %winner, "match won");
                for participant in &self.participants {
                    let message = if participant.id == winner {
                        ServerMessage::MatchWin
                    } else {
                        ServerMessage::MatchLose
                    };
                    let _ = participant.send(message);
                }
            }
        }
        self.terminate();
    }

    fn forfeit_seat(&mut self, seat: usize) -> TurnOutcome {
        let winner = &self.participants[(seat + 1) % MATCH_SIZE];
        tracing::info!(
            match_id = %self.id,
            player_id = %self.participants[seat].id,
            "participant unreachable, forfeiting"
        );
        let _ = winner.send(ServerMessage::MatchWin);
        let outcome = MatchOutcome::Winner(winner.id);
        self.terminate();
        TurnOutcome::Finished(outcome)
    }

    /// Forced win for everyone but `player_id` (disconnect).
    pub fn forfeit(&mut self, player_id: Uuid) -> Option<MatchOutcome> {
        if self.is_ended() {
            return None;
        }
        let mut outcome = None;
        for participant in &self.participants {
            if participant.id != player_id && participant.present {
                let _ = participant.send(ServerMessage::MatchWin);
                outcome = Some(MatchOutcome::Winner(participant.id));
            }
        }
        tracing::info!(match_id = %self.id, player_id = %player_id, "match forfeited");
        self.terminate();
        outcome
    }

    /// Give up: the player's tower falls and the win check runs.
    pub fn concede(&mut self, player_id: Uuid) -> Result<Option<MatchOutcome>, ValidationError> {
        if self.is_ended() {
            return Err(ValidationError::MatchNotInProgress);
        }
        let seat = self.seat_of(player_id).ok_or(ValidationError::PlayerNotFound)?;

        let tower = &mut self.participants[seat].castle.tower;
        let health = tower.health();
        tower.damage(health);

        let outcome = self.check_winner();
        if let Some(outcome) = outcome {
            self.finish(outcome);
        }
        Ok(outcome)
    }

    /// Remove a player from the seat without tearing the match down.
    pub fn abandon(&mut self, player_id: Uuid) -> bool {
        match self.seat_of(player_id) {
            Some(seat) => {
                let participant = &mut self.participants[seat];
                participant.present = false;
                participant.ready = false;
                tracing::info!(match_id = %self.id, player_id = %player_id, "player abandoned match");
                true
            }
            None => false,
        }
    }

    /// Stop the match. Safe to call more than once.
    pub fn terminate(&mut self) {
        if self.is_ended() {
            return;
        }
        self.status = MatchStatus::Ended;
        self.ended_at = Some(chrono::Utc::now());
        self.timer_generation += 1;
        self.pending_timer = None;
        self.turn_deadline = None;

        for participant in self.participants.iter().filter(|p| p.present) {
            let _ = participant.send(ServerMessage::MatchExited);
        }

        tracing::info!(match_id = %self.id, turns = self.turn_number, "match stopped");
    }

    // Cards

    fn validate_card(
        &self,
        player_id: Uuid,
        card_id: CardId,
        store: &dyn CardStore,
    ) -> Result<usize, ValidationError> {
        if self.status != MatchStatus::InProgress {
            return Err(ValidationError::MatchNotInProgress);
        }
        let seat = self.seat_of(player_id).ok_or(ValidationError::PlayerNotFound)?;
        if seat != self.current {
            return Err(ValidationError::NotYourTurn);
        }
        if store.card(card_id).is_none() {
            return Err(ValidationError::UnknownCard);
        }
        if !self.participants[seat].hand.contains(card_id) {
            return Err(ValidationError::CardNotInHand);
        }
        Ok(seat)
    }

    /// Play a card from the current player's hand against the opponent.
    ///
    /// If any effect fails, castles and the hand are restored and nothing is
    /// broadcast.
    pub fn play_card(
        &mut self,
        player_id: Uuid,
        card_id: CardId,
        store: &dyn CardStore,
    ) -> Result<PlayOutcome, PlayError> {
        let seat = self.validate_card(player_id, card_id, store)?;
        let opponent = (seat + 1) % MATCH_SIZE;
        if !self.participants[opponent].present {
            return Err(ValidationError::OpponentMissing.into());
        }
        let card = store.card(card_id).ok_or(ValidationError::UnknownCard)?;

        let castles = [
            self.participants[0].castle.clone(),
            self.participants[1].castle.clone(),
        ];
        let hand = self.participants[seat].hand.clone();

        let drawn = self.participants[seat].hand.cycle(card_id, &mut self.rng);

        let (caster, target) = self.seat_and_opponent(seat);
        let result = card
            .effects
            .iter()
            .try_for_each(|effect| effect.execute(&mut caster.castle, &mut target.castle));

        if let Err(e) = result {
            let [first, second] = castles;
            self.participants[0].castle = first;
            self.participants[1].castle = second;
            self.participants[seat].hand = hand;
            tracing::warn!(
                match_id = %self.id,
                player_id = %player_id,
                card = %card.name,
                description = %card.description,
                error = %e,
                "card play aborted"
            );
            return Err(PlayError::Effect(e));
        }

        for participant in &self.participants {
            let action = if participant.id == player_id {
                CardAction::YouPlayed
            } else {
                CardAction::EnemyPlayed
            };
            let _ = participant.send(ServerMessage::CardPlayed {
                player_id,
                card_id,
                action,
            });
        }
        if let Some(card_id) = drawn {
            let _ = self.participants[seat].send(ServerMessage::CardDrawn { card_id });
        }

        tracing::debug!(match_id = %self.id, player_id = %player_id, card = %card.name, "card played");

        let finished = self.check_winner();
        if let Some(outcome) = finished {
            self.finish(outcome);
        }

        Ok(PlayOutcome { drawn, finished })
    }

    /// Swap a card from hand for a fresh draw, with no effects.
    pub fn discard_card(
        &mut self,
        player_id: Uuid,
        card_id: CardId,
        store: &dyn CardStore,
    ) -> Result<Option<CardId>, ValidationError> {
        let seat = self.validate_card(player_id, card_id, store)?;

        let participant = &mut self.participants[seat];
        let drawn = participant.hand.cycle(card_id, &mut self.rng);
        let _ = participant.send(ServerMessage::CardDiscarded { card_id, drawn });

        tracing::debug!(match_id = %self.id, player_id = %player_id, card_id = %card_id, "card discarded");
        Ok(drawn)
    }

    // Snapshots

    /// State snapshot from one participant's point of view.
    pub fn battle_info(&self, player_id: Uuid) -> Option<BattleInfo> {
        let you = self.participants.iter().position(|p| p.id == player_id)?;
        let yours = &self.participants[you];
        let enemy = &self.participants[(you + 1) % MATCH_SIZE];

        let seconds_remaining = self
            .turn_deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()).as_secs() as i64);

        Some(BattleInfo {
            player_id,
            your_name: yours.name.clone(),
            enemy_name: enemy.name.clone(),
            your_tower_health: yours.castle.tower.health(),
            enemy_tower_health: enemy.castle.tower.health(),
            your_wall_health: yours.castle.wall.health(),
            enemy_wall_health: enemy.castle.wall.health(),
            is_your_turn: self.current == you,
            timer: self.config.turn_time,
            seconds_remaining,
            start_damage_fatigue: self.config.fatigue_damage_start,
            turn_fatigue: self.config.fatigue_turn_start,
            fatigue_limit: self.config.fatigue_limit,
        })
    }

    /// Full debug snapshot.
    pub fn to_json(&self) -> serde_json::Value {
        let participants: Vec<serde_json::Value> =
            self.participants.iter().map(|p| p.to_json()).collect();

        serde_json::json!({
            "match_id": self.id,
            "status": self.status.as_str(),
            "participants": participants,
            "current_turn": self.current_player_id(),
            "turn": self.turn_number,
            "fatigue_damage": self.fatigue_damage,
            "fatigue_turn_start": self.fatigue_turn_start,
            "created_at": self.created_at,
            "started_at": self.started_at,
            "ended_at": self.ended_at
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::cards::{BuildTower, CardData, CardLibrary, Damage, DamageTower, SpendResource};
    use crate::state::castle::CastleConfig;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Fixture {
        game: Match,
        library: CardLibrary,
        a: Uuid,
        b: Uuid,
        rx_a: UnboundedReceiver<ServerMessage>,
        rx_b: UnboundedReceiver<ServerMessage>,
    }

    fn make_library() -> CardLibrary {
        let mut library = CardLibrary::new();
        library.add(CardData::new("Arrow").with_effect(Damage { amount: 2 }));
        library.add(CardData::new("Catapult").with_effect(DamageTower { amount: 100 }));
        library.add(CardData::new("Builder").with_effect(BuildTower { amount: 100 }));
        library.add(
            CardData::new("Expensive")
                .with_description("Costs more gems than anyone has")
                .with_effect(Damage { amount: 5 })
                .with_effect(SpendResource { resource: "gems".into(), amount: 99 }),
        );
        for i in 0..6 {
            library.add(CardData::new(format!("Filler{}", i)));
        }
        library
    }

    fn make_config() -> BattleConfig {
        BattleConfig {
            turn_time: 10,
            fatigue_turn_start: 10,
            fatigue_damage_start: 1,
            fatigue_limit: 3,
            start_hand_size: 10,
            castle: CastleConfig {
                wall_health: 5,
                ..CastleConfig::default()
            },
        }
    }

    fn make_fixture(config: BattleConfig) -> Fixture {
        let library = make_library();
        let (out_a, rx_a) = Outbox::channel(Uuid::new_v4());
        let (out_b, rx_b) = Outbox::channel(Uuid::new_v4());
        let a = PlayerSession::new(out_a.player_id(), "Alice".into(), false, out_a);
        let b = PlayerSession::new(out_b.player_id(), "Bob".into(), false, out_b);

        let game = Match::with_rng([&a, &b], config, &library, StdRng::seed_from_u64(42));
        Fixture { game, library, a: a.id, b: b.id, rx_a, rx_b }
    }

    fn started() -> Fixture {
        let mut f = make_fixture(make_config());
        assert!(!f.game.player_ready(f.a).unwrap());
        assert!(f.game.player_ready(f.b).unwrap());
        drain(&mut f.rx_a);
        drain(&mut f.rx_b);
        f
    }

    fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(m) = rx.try_recv() {
            out.push(m);
        }
        out
    }

    fn card(f: &Fixture, name: &str) -> CardId {
        f.library.by_name(name).unwrap().id
    }

    #[test]
    fn test_ready_starts_match() {
        let mut f = make_fixture(make_config());
        assert_eq!(f.game.status(), MatchStatus::WaitingForReady);

        f.game.player_ready(f.a).unwrap();
        assert_eq!(f.game.status(), MatchStatus::WaitingForReady);
        assert!(f.game.take_timer_request().is_none());

        f.game.player_ready(f.b).unwrap();
        assert_eq!(f.game.status(), MatchStatus::InProgress);
        assert!(f.game.is_current(f.a));

        let timer = f.game.take_timer_request().unwrap();
        assert_eq!(timer.duration, Duration::from_secs(10));
        assert!(f.game.timer_is_current(timer.generation));

        for p in f.game.participants() {
            assert_eq!(p.hand.len(), 10);
        }
        let drawn = drain(&mut f.rx_b)
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::CardDrawn { .. }))
            .count();
        assert_eq!(drawn, 10);
    }

    #[test]
    fn test_ready_unknown_player() {
        let mut f = make_fixture(make_config());
        assert_eq!(
            f.game.player_ready(Uuid::new_v4()),
            Err(ValidationError::PlayerNotFound)
        );
    }

    #[test]
    fn test_turn_alternation() {
        let mut f = started();

        for n in 1..=7u32 {
            f.game.advance_turn().unwrap();
            assert_eq!(f.game.is_current(f.a), n % 2 == 0);
        }

        assert_eq!(drain(&mut f.rx_a)[0], ServerMessage::TurnEnded);
        assert_eq!(drain(&mut f.rx_b)[0], ServerMessage::TurnStarted);
    }

    #[test]
    fn test_advance_supersedes_timer() {
        let mut f = started();
        let first = f.game.take_timer_request().unwrap();

        f.game.advance_turn().unwrap();
        let second = f.game.take_timer_request().unwrap();

        assert!(!f.game.timer_is_current(first.generation));
        assert!(f.game.timer_is_current(second.generation));
        assert!(f.game.on_timer_expired(first.generation).is_none());
        assert!(f.game.is_current(f.b));
    }

    #[test]
    fn test_economy_on_even_turns() {
        let mut f = started();
        let start = f.game.participants()[0].castle.resource("bricks").unwrap().value;

        // turn 0 → tick, turn 1 → no tick, turn 2 → tick
        f.game.advance_turn().unwrap();
        f.game.advance_turn().unwrap();
        f.game.advance_turn().unwrap();

        let value = f.game.participants()[0].castle.resource("bricks").unwrap().value;
        assert_eq!(value, start + 4);
    }

    #[test]
    fn test_fatigue_escalation() {
        let mut config = make_config();
        config.castle.tower_health = 40;
        let mut f = make_fixture(config);
        f.game.player_ready(f.a).unwrap();
        f.game.player_ready(f.b).unwrap();

        let mut applied = Vec::new();
        for _ in 0..30 {
            match f.game.advance_turn().unwrap() {
                TurnOutcome::Continued { fatigue_applied, turn, .. } => {
                    if let Some(d) = fatigue_applied {
                        // counter before increment was odd and >= 8
                        assert!(turn - 1 >= 8 && (turn - 1) % 2 == 1);
                        applied.push(d);
                    }
                }
                TurnOutcome::Finished(_) => break,
            }
        }

        assert_eq!(&applied[..4], &[1, 2, 3, 3]);
        assert!(applied.windows(2).all(|w| w[0] <= w[1]));
        assert!(applied.iter().all(|d| *d <= 3));
        assert_eq!(f.game.fatigue_damage(), 3);
    }

    #[test]
    fn test_fatigue_hits_wall_then_tower() {
        let mut config = make_config();
        config.fatigue_turn_start = 0;
        config.fatigue_damage_start = 3;
        config.fatigue_limit = 3;
        let mut f = make_fixture(config);
        f.game.player_ready(f.a).unwrap();
        f.game.player_ready(f.b).unwrap();

        f.game.advance_turn().unwrap(); // turn 0: even, no fatigue
        f.game.advance_turn().unwrap(); // turn 1: wall 5 -> 2
        f.game.advance_turn().unwrap();
        f.game.advance_turn().unwrap(); // turn 3: wall 2 -> 0, no spill

        let castle = &f.game.participants()[0].castle;
        assert_eq!(castle.wall.health(), 0);
        assert_eq!(castle.tower.health(), 25);

        f.game.advance_turn().unwrap();
        f.game.advance_turn().unwrap(); // turn 5: tower 25 -> 22
        assert_eq!(f.game.participants()[1].castle.tower.health(), 22);
    }

    #[test]
    fn test_double_ko_is_draw() {
        let mut f = started();
        for seat in 0..2 {
            let tower = &mut f.game.participants[seat].castle.tower;
            tower.damage(tower.health());
        }

        assert_eq!(f.game.check_winner(), Some(MatchOutcome::Draw));
        assert_eq!(
            f.game.advance_turn().unwrap(),
            TurnOutcome::Finished(MatchOutcome::Draw)
        );
        assert!(drain(&mut f.rx_a).contains(&ServerMessage::MatchDraw));
        assert!(drain(&mut f.rx_b).contains(&ServerMessage::MatchDraw));
        assert!(f.game.is_ended());
    }

    #[test]
    fn test_play_card_damages_opponent() {
        let mut f = started();
        let arrow = card(&f, "Arrow");

        let outcome = f.game.play_card(f.a, arrow, &f.library).unwrap();
        assert_eq!(outcome.finished, None);
        assert_eq!(f.game.participants()[1].castle.wall.health(), 3);
        assert_eq!(f.game.participants()[0].hand.pool_size(), 10);

        assert!(drain(&mut f.rx_a).contains(&ServerMessage::CardPlayed {
            player_id: f.a,
            card_id: arrow,
            action: CardAction::YouPlayed,
        }));
        assert!(drain(&mut f.rx_b).contains(&ServerMessage::CardPlayed {
            player_id: f.a,
            card_id: arrow,
            action: CardAction::EnemyPlayed,
        }));
    }

    #[test]
    fn test_play_card_wins_mid_turn() {
        let mut f = started();
        let catapult = card(&f, "Catapult");

        let outcome = f.game.play_card(f.a, catapult, &f.library).unwrap();
        assert_eq!(outcome.finished, Some(MatchOutcome::Winner(f.a)));
        assert!(f.game.is_ended());
        assert!(drain(&mut f.rx_a).contains(&ServerMessage::MatchWin));
        assert!(drain(&mut f.rx_b).contains(&ServerMessage::MatchLose));
    }

    #[test]
    fn test_full_tower_wins() {
        let mut f = started();
        let builder = card(&f, "Builder");

        let outcome = f.game.play_card(f.a, builder, &f.library).unwrap();
        assert_eq!(outcome.finished, Some(MatchOutcome::Winner(f.a)));
    }

    #[test]
    fn test_play_rejections_leave_state_untouched() {
        let mut f = started();
        let before = f.game.to_json();

        assert_eq!(
            f.game.play_card(f.a, Uuid::new_v4(), &f.library),
            Err(PlayError::Invalid(ValidationError::UnknownCard))
        );
        assert_eq!(
            f.game.play_card(f.b, card(&f, "Arrow"), &f.library),
            Err(PlayError::Invalid(ValidationError::NotYourTurn))
        );
        assert_eq!(
            f.game.play_card(Uuid::new_v4(), card(&f, "Arrow"), &f.library),
            Err(PlayError::Invalid(ValidationError::PlayerNotFound))
        );

        assert_eq!(f.game.to_json(), before);
        assert!(drain(&mut f.rx_a).is_empty());
        assert!(drain(&mut f.rx_b).is_empty());
    }

    #[test]
    fn test_card_not_in_hand() {
        let mut config = make_config();
        config.start_hand_size = 2;
        let mut f = make_fixture(config);
        f.game.player_ready(f.a).unwrap();
        f.game.player_ready(f.b).unwrap();
        drain(&mut f.rx_b);

        let held: Vec<CardId> = f.game.participants()[0].hand.cards().to_vec();
        let missing = f
            .library
            .player_pool(&mut StdRng::seed_from_u64(0))
            .into_iter()
            .find(|c| !held.contains(c))
            .unwrap();

        let before = f.game.to_json();
        assert_eq!(
            f.game.play_card(f.a, missing, &f.library),
            Err(PlayError::Invalid(ValidationError::CardNotInHand))
        );
        assert_eq!(f.game.to_json(), before);
        assert!(drain(&mut f.rx_b).is_empty());
    }

    #[test]
    fn test_failed_effect_rolls_back() {
        let mut f = started();
        let before = f.game.to_json();
        let hand_before = f.game.participants()[0].hand.clone();

        let result = f.game.play_card(f.a, card(&f, "Expensive"), &f.library);
        assert!(matches!(result, Err(PlayError::Effect(_))));

        assert_eq!(f.game.to_json(), before);
        assert_eq!(f.game.participants()[0].hand, hand_before);
        assert_eq!(f.game.status(), MatchStatus::InProgress);
        assert!(drain(&mut f.rx_b).is_empty());
    }

    #[test]
    fn test_discard_card() {
        let mut f = started();
        let arrow = card(&f, "Arrow");

        f.game.discard_card(f.a, arrow, &f.library).unwrap();
        assert_eq!(f.game.participants()[1].castle.wall.health(), 5);
        assert_eq!(f.game.participants()[0].hand.pool_size(), 10);
        assert!(drain(&mut f.rx_b).is_empty());
    }

    #[test]
    fn test_pool_conserved_across_plays() {
        let mut config = make_config();
        config.start_hand_size = 6;
        let mut f = make_fixture(config);
        f.game.player_ready(f.a).unwrap();
        f.game.player_ready(f.b).unwrap();

        let pool = f.game.participants()[0].hand.sorted_pool();
        assert_eq!(pool.len(), 10);
        assert_eq!(f.game.participants()[0].hand.deck_len(), 4);

        let harmless: Vec<CardId> = ["Arrow", "Filler0", "Filler1", "Filler2", "Filler3", "Filler4", "Filler5"]
            .iter()
            .map(|name| card(&f, name))
            .collect();

        let mut fresh_draws = 0;
        for step in 0..24 {
            let hand = &f.game.participants()[0].hand;
            let playable: Vec<CardId> = hand
                .cards()
                .iter()
                .copied()
                .filter(|c| harmless.contains(c))
                .collect();
            let card_id = playable[step % playable.len()];
            let front = hand.next_draw().unwrap();

            let drawn = if step % 2 == 0 {
                f.game.play_card(f.a, card_id, &f.library).unwrap().drawn
            } else {
                f.game.discard_card(f.a, card_id, &f.library).unwrap()
            };

            // the replacement is the old deck front, or the card itself if
            // it went back on top
            let drawn = drawn.unwrap();
            assert!(drawn == front || drawn == card_id);
            if drawn != card_id {
                fresh_draws += 1;
            }

            let hand = &f.game.participants()[0].hand;
            assert_eq!(hand.cards().last(), Some(&drawn));
            assert_eq!(hand.len(), 6);
            assert_eq!(hand.deck_len(), 4);
            assert_eq!(hand.sorted_pool(), pool);
        }

        assert!(fresh_draws > 0);
        assert!(!f.game.is_ended());
    }

    #[test]
    fn test_concede() {
        let mut f = started();

        let outcome = f.game.concede(f.b).unwrap();
        assert_eq!(outcome, Some(MatchOutcome::Winner(f.a)));
        assert!(f.game.is_ended());
        assert!(drain(&mut f.rx_b).contains(&ServerMessage::MatchLose));
    }

    #[test]
    fn test_abandon_faults_next_turn() {
        let mut f = started();
        assert!(f.game.abandon(f.b));
        assert!(!f.game.has_player(f.b));

        assert_eq!(
            f.game.play_card(f.a, card(&f, "Arrow"), &f.library),
            Err(PlayError::Invalid(ValidationError::OpponentMissing))
        );

        let err = f.game.advance_turn().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unreachable_player_forfeits() {
        let mut f = started();
        drop(f.rx_b);

        let outcome = f.game.advance_turn().unwrap();
        assert_eq!(outcome, TurnOutcome::Finished(MatchOutcome::Winner(f.a)));
        assert!(drain(&mut f.rx_a).contains(&ServerMessage::MatchWin));
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let mut f = started();
        f.game.terminate();
        let generation = f.game.timer_generation();
        f.game.terminate();

        assert_eq!(f.game.timer_generation(), generation);
        let exited = drain(&mut f.rx_a)
            .into_iter()
            .filter(|m| *m == ServerMessage::MatchExited)
            .count();
        assert_eq!(exited, 1);
        assert_eq!(f.game.advance_turn(), Err(MatchError::NotInProgress));
    }

    #[test]
    fn test_battle_info() {
        let f = started();
        let info = f.game.battle_info(f.b).unwrap();

        assert_eq!(info.your_name, "Bob");
        assert_eq!(info.enemy_name, "Alice");
        assert!(!info.is_your_turn);
        assert_eq!(info.timer, 10);
        assert_eq!(info.fatigue_limit, 3);
        assert!(info.seconds_remaining.unwrap() <= 10);
        assert!(f.game.battle_info(Uuid::new_v4()).is_none());
    }
}
