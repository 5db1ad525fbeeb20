//! Card reference data and the effect contract.
//!
//! Card definitions are immutable and shared between matches. The match
//! never looks inside an effect: it only calls [`Effect::execute`] with the
//! caster's and the target's castles, in the order the card declares.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::RngCore;
use uuid::Uuid;

use super::castle::Castle;
use super::config::DeckConfig;

/// Card identifier.
pub type CardId = Uuid;

/// Failure raised by an effect. Aborts the card play it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectError {
    pub effect: &'static str,
    pub reason: String,
}

impl EffectError {
    pub fn new(effect: &'static str, reason: impl Into<String>) -> Self {
        Self {
            effect,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for EffectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Effect {} failed: {}", self.effect, self.reason)
    }
}

impl std::error::Error for EffectError {}

/// Something a card does when played.
pub trait Effect: fmt::Debug + Send + Sync {
    fn execute(&self, caster: &mut Castle, target: &mut Castle) -> Result<(), EffectError>;
}

/// Immutable card definition.
#[derive(Debug, Clone)]
pub struct CardData {
    pub id: CardId,
    pub name: String,

    /// `(resource, amount)`, informational; spending is an effect
    pub cost: Vec<(String, u32)>,

    /// Executed in order on play
    pub effects: Vec<Arc<dyn Effect>>,

    /// Play-again marker, read by effects
    pub save_turn: bool,

    /// Cannot-be-discarded marker, read by effects
    pub non_discard: bool,

    pub description: String,
}

impl CardData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            cost: Vec::new(),
            effects: Vec::new(),
            save_turn: false,
            non_discard: false,
            description: String::new(),
        }
    }

    pub fn with_cost(mut self, resource: impl Into<String>, amount: u32) -> Self {
        self.cost.push((resource.into(), amount));
        self
    }

    pub fn with_effect(mut self, effect: impl Effect + 'static) -> Self {
        self.effects.push(Arc::new(effect));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Card reference store.
pub trait CardStore: Send + Sync {
    /// Look up a card definition.
    fn card(&self, id: CardId) -> Option<Arc<CardData>>;

    /// The pool a new participant's deck is built from, in deck order.
    fn player_pool(&self, rng: &mut dyn RngCore) -> Vec<CardId>;
}

/// In-memory card library.
#[derive(Debug, Clone, Default)]
pub struct CardLibrary {
    /// Cards in definition order
    cards: Vec<Arc<CardData>>,

    /// Card ID to position in `cards`
    index: HashMap<CardId, usize>,

    deck: DeckConfig,
}

impl CardLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deck_config(mut self, deck: DeckConfig) -> Self {
        self.deck = deck;
        self
    }

    /// Add a card. A card with an already known ID replaces the old one.
    pub fn add(&mut self, card: CardData) -> CardId {
        let id = card.id;
        match self.index.get(&id) {
            Some(&pos) => self.cards[pos] = Arc::new(card),
            None => {
                self.index.insert(id, self.cards.len());
                self.cards.push(Arc::new(card));
            }
        }
        id
    }

    /// Find a card by name.
    pub fn by_name(&self, name: &str) -> Option<&Arc<CardData>> {
        self.cards.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

impl CardStore for CardLibrary {
    fn card(&self, id: CardId) -> Option<Arc<CardData>> {
        self.index.get(&id).map(|&pos| Arc::clone(&self.cards[pos]))
    }

    fn player_pool(&self, rng: &mut dyn RngCore) -> Vec<CardId> {
        let mut pool: Vec<CardId> = match &self.deck.custom_deck {
            Some(names) => {
                let mut ids = Vec::with_capacity(names.len());
                for name in names {
                    if let Some(card) = self.by_name(name) {
                        if !ids.contains(&card.id) {
                            ids.push(card.id);
                        }
                    }
                }
                ids
            }
            None => self.cards.iter().map(|c| c.id).collect(),
        };

        if self.deck.shuffle {
            pool.shuffle(rng);
        }
        pool
    }
}

// ---------------------------------------------------------------------------
// Built-in effects
// ---------------------------------------------------------------------------

/// Attack the target: wall first, overflow into the tower.
#[derive(Debug, Clone)]
pub struct Damage {
    pub amount: u32,
}

impl Effect for Damage {
    fn execute(&self, _caster: &mut Castle, target: &mut Castle) -> Result<(), EffectError> {
        target.apply_damage(self.amount);
        Ok(())
    }
}

/// Hit the target's tower directly, ignoring the wall.
#[derive(Debug, Clone)]
pub struct DamageTower {
    pub amount: u32,
}

impl Effect for DamageTower {
    fn execute(&self, _caster: &mut Castle, target: &mut Castle) -> Result<(), EffectError> {
        target.tower.damage(self.amount);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct BuildTower {
    pub amount: u32,
}

impl Effect for BuildTower {
    fn execute(&self, caster: &mut Castle, _target: &mut Castle) -> Result<(), EffectError> {
        caster.tower.heal(self.amount);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct BuildWall {
    pub amount: u32,
}

impl Effect for BuildWall {
    fn execute(&self, caster: &mut Castle, _target: &mut Castle) -> Result<(), EffectError> {
        caster.wall.heal(self.amount);
        Ok(())
    }
}

/// Give the caster some of a resource.
#[derive(Debug, Clone)]
pub struct AddResource {
    pub resource: String,
    pub amount: u32,
}

impl Effect for AddResource {
    fn execute(&self, caster: &mut Castle, _target: &mut Castle) -> Result<(), EffectError> {
        let resource = caster
            .resource_mut(&self.resource)
            .ok_or_else(|| EffectError::new("AddResource", format!("unknown resource {}", self.resource)))?;
        resource.add(self.amount);
        Ok(())
    }
}

/// Raise the caster's income for a resource.
#[derive(Debug, Clone)]
pub struct AddIncome {
    pub resource: String,
    pub amount: u32,
}

impl Effect for AddIncome {
    fn execute(&self, caster: &mut Castle, _target: &mut Castle) -> Result<(), EffectError> {
        let resource = caster
            .resource_mut(&self.resource)
            .ok_or_else(|| EffectError::new("AddIncome", format!("unknown resource {}", self.resource)))?;
        resource.add_income(self.amount);
        Ok(())
    }
}

/// Pay a cost. Fails without touching anything if the caster cannot afford it.
#[derive(Debug, Clone)]
pub struct SpendResource {
    pub resource: String,
    pub amount: u32,
}

impl Effect for SpendResource {
    fn execute(&self, caster: &mut Castle, _target: &mut Castle) -> Result<(), EffectError> {
        let resource = caster
            .resource_mut(&self.resource)
            .ok_or_else(|| EffectError::new("SpendResource", format!("unknown resource {}", self.resource)))?;
        if resource.value < self.amount {
            return Err(EffectError::new(
                "SpendResource",
                format!("need {} {}, have {}", self.amount, self.resource, resource.value),
            ));
        }
        resource.remove(self.amount);
        Ok(())
    }
}
