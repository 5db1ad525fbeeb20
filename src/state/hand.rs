//! Deck and hand bookkeeping.
//!
//! The deck is a shuffled draw pile, not a discard: played and discarded
//! cards go back into it at a random position. At every point between
//! operations the deck and the hand together form a permutation of the
//! player's card pool.

use std::collections::VecDeque;

use rand::Rng;

use super::cards::CardId;

/// Default number of cards dealt at match start.
pub const DEFAULT_START_HAND_SIZE: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hand {
    /// Draw pile, front is drawn next
    deck: VecDeque<CardId>,

    /// Cards currently held, in draw order
    cards: Vec<CardId>,

    /// Size `fill_hand` deals up to
    start_size: usize,
}

impl Hand {
    /// Create a hand with the whole pool in the deck.
    ///
    /// Duplicate identifiers are dropped so each card lives in exactly one
    /// place.
    pub fn new(pool: Vec<CardId>, start_size: usize) -> Self {
        let mut deck = VecDeque::with_capacity(pool.len());
        for card in pool {
            if !deck.contains(&card) {
                deck.push_back(card);
            }
        }

        Self {
            deck,
            cards: Vec::with_capacity(start_size),
            start_size,
        }
    }

    /// Draw until the hand reaches its starting size or the deck runs dry.
    /// Returns the drawn cards in order.
    pub fn fill_hand(&mut self) -> Vec<CardId> {
        let mut drawn = Vec::new();
        while self.cards.len() < self.start_size {
            match self.draw_nearest() {
                Some(card) => drawn.push(card),
                None => break,
            }
        }
        drawn
    }

    /// Move the front of the deck into the hand.
    pub fn draw_nearest(&mut self) -> Option<CardId> {
        let card = self.deck.pop_front()?;
        self.cards.push(card);
        Some(card)
    }

    /// Take a card out of the hand. Returns false if it was not held.
    pub fn remove_from_hand(&mut self, card: CardId) -> bool {
        match self.cards.iter().position(|c| *c == card) {
            Some(index) => {
                self.cards.remove(index);
                true
            }
            None => false,
        }
    }

    /// Put a card back into the deck at a uniformly random position.
    ///
    /// Ignored if the card is already in the deck or still in the hand.
    pub fn reinsert_at_random_position<R: Rng + ?Sized>(&mut self, card: CardId, rng: &mut R) {
        if self.deck.contains(&card) || self.cards.contains(&card) {
            return;
        }
        let index = rng.gen_range(0..=self.deck.len());
        self.deck.insert(index, card);
    }

    /// Remove, reinsert and draw a replacement. Returns the drawn card, or
    /// `None` if the card was not in hand.
    pub fn cycle<R: Rng + ?Sized>(&mut self, card: CardId, rng: &mut R) -> Option<CardId> {
        if !self.remove_from_hand(card) {
            return None;
        }
        self.reinsert_at_random_position(card, rng);
        self.draw_nearest()
    }

    pub fn contains(&self, card: CardId) -> bool {
        self.cards.contains(&card)
    }

    pub fn cards(&self) -> &[CardId] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn deck_len(&self) -> usize {
        self.deck.len()
    }

    /// Hand plus deck.
    pub fn pool_size(&self) -> usize {
        self.cards.len() + self.deck.len()
    }

    pub fn start_size(&self) -> usize {
        self.start_size
    }
}

#[cfg(test)]
impl Hand {
    /// Card the next draw takes.
    pub(crate) fn next_draw(&self) -> Option<CardId> {
        self.deck.front().copied()
    }

    /// Hand then deck, sorted.
    pub(crate) fn sorted_pool(&self) -> Vec<CardId> {
        let mut pool: Vec<CardId> = self.cards.iter().chain(self.deck.iter()).copied().collect();
        pool.sort();
        pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn make_pool(n: usize) -> Vec<CardId> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn test_fill_hand() {
        let pool = make_pool(10);
        let mut hand = Hand::new(pool.clone(), 6);

        let drawn = hand.fill_hand();
        assert_eq!(drawn, pool[..6].to_vec());
        assert_eq!(hand.len(), 6);
        assert_eq!(hand.deck_len(), 4);
    }

    #[test]
    fn test_fill_hand_small_pool() {
        let mut hand = Hand::new(make_pool(3), 6);
        hand.fill_hand();

        assert_eq!(hand.len(), 3);
        assert_eq!(hand.deck_len(), 0);
        assert_eq!(hand.draw_nearest(), None);
    }

    #[test]
    fn test_duplicates_dropped() {
        let card = Uuid::new_v4();
        let hand = Hand::new(vec![card, card, card], 6);
        assert_eq!(hand.pool_size(), 1);
    }

    #[test]
    fn test_remove_missing_card() {
        let mut hand = Hand::new(make_pool(8), 6);
        hand.fill_hand();

        assert!(!hand.remove_from_hand(Uuid::new_v4()));
        assert_eq!(hand.len(), 6);
    }

    #[test]
    fn test_cycle_conserves_pool() {
        let pool = make_pool(12);
        let mut hand = Hand::new(pool.clone(), 6);
        let mut rng = StdRng::seed_from_u64(7);
        hand.fill_hand();

        for step in 0..200 {
            let card = hand.cards()[step % hand.len()];
            assert!(hand.cycle(card, &mut rng).is_some());

            assert_eq!(hand.pool_size(), pool.len());
            assert_eq!(hand.len(), 6);

            let mut seen: HashSet<CardId> = hand.cards().iter().copied().collect();
            seen.extend(hand.deck.iter().copied());
            assert_eq!(seen.len(), pool.len());
        }
    }

    #[test]
    fn test_reinsert_ignores_held_card() {
        let mut hand = Hand::new(make_pool(8), 6);
        let mut rng = StdRng::seed_from_u64(1);
        hand.fill_hand();

        let held = hand.cards()[0];
        hand.reinsert_at_random_position(held, &mut rng);
        assert_eq!(hand.pool_size(), 8);
    }
}
