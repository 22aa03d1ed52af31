//! Decks and hand draws.
//!
//! Draw policy is shuffle-and-slice: a hand is `n` distinct deck slots picked
//! at random. The deck itself is never consumed, so a later draw may return a
//! card that is already in hand.

use serde::{Deserialize, Serialize};

use super::card::Card;
use crate::core::GameRng;

/// A player's full ordered card pool.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    /// Create a deck from cards.
    #[must_use]
    pub fn new(cards: Vec<Card>) -> Self {
        Self { cards }
    }

    /// The cards in deck order.
    #[must_use]
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Draw an opening hand of up to `size` cards, without replacement.
    pub fn draw_hand(&self, size: usize, rng: &mut GameRng) -> Vec<Card> {
        rng.sample_indices(self.cards.len(), size)
            .into_iter()
            .map(|i| self.cards[i].clone())
            .collect()
    }

    /// Draw a single card. `None` only for an empty deck.
    pub fn draw_one(&self, rng: &mut GameRng) -> Option<Card> {
        rng.choose(&self.cards).cloned()
    }

    /// First card in deck order with positive attack that fits `mana`.
    #[must_use]
    pub fn first_affordable_attack(&self, mana: u32) -> Option<&Card> {
        self.cards
            .iter()
            .find(|card| card.is_attack() && card.mana_cost <= mana)
    }
}

impl From<Vec<Card>> for Deck {
    fn from(cards: Vec<Card>) -> Self {
        Self::new(cards)
    }
}

impl FromIterator<Card> for Deck {
    fn from_iter<I: IntoIterator<Item = Card>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
