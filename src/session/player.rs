//! Per-player combat state.
//!
//! Fields are private so the bounds always hold:
//! - `0 <= hp <= max_hp` (max is the configured starting health)
//! - `0 <= mana <= max_mana`
//! - `hand.len() <= max_hand`

use serde::Serialize;

use crate::cards::{Card, Deck};
use crate::core::{BattleConfig, GameRng, UserId};

/// Combat state for one side of a match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    user_id: UserId,
    display_name: String,
    hp: u32,
    max_hp: u32,
    mana: u32,
    max_mana: u32,
    hand: Vec<Card>,
    max_hand: usize,
    #[serde(skip)]
    deck: Deck,
}

impl PlayerState {
    /// Fresh state: full hp, starting mana, opening hand drawn from `deck`.
    pub fn new(
        user_id: UserId,
        display_name: impl Into<String>,
        deck: Deck,
        config: &BattleConfig,
        rng: &mut GameRng,
    ) -> Self {
        let max_hand = config.max_hand_size;
        let hand = deck.draw_hand(config.initial_hand_size.min(max_hand), rng);

        Self {
            user_id,
            display_name: display_name.into(),
            hp: config.starting_health,
            max_hp: config.starting_health,
            mana: config.starting_mana.min(config.max_mana),
            max_mana: config.max_mana,
            hand,
            max_hand,
            deck,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn hp(&self) -> u32 {
        self.hp
    }

    #[must_use]
    pub fn max_hp(&self) -> u32 {
        self.max_hp
    }

    #[must_use]
    pub fn mana(&self) -> u32 {
        self.mana
    }

    #[must_use]
    pub fn max_mana(&self) -> u32 {
        self.max_mana
    }

    #[must_use]
    pub fn hand(&self) -> &[Card] {
        &self.hand
    }

    #[must_use]
    pub fn deck(&self) -> &Deck {
        &self.deck
    }

    #[must_use]
    pub fn is_defeated(&self) -> bool {
        self.hp == 0
    }

    /// Position of the first card in hand with this name.
    #[must_use]
    pub fn hand_position(&self, name: &str) -> Option<usize> {
        self.hand.iter().position(|card| card.name == name)
    }

    /// Apply damage, clamped at zero. Returns the hp actually removed.
    pub(crate) fn take_damage(&mut self, amount: u32) -> u32 {
        let applied = amount.min(self.hp);
        self.hp -= applied;
        applied
    }

    /// Deduct mana. Callers check affordability first; this saturates.
    pub(crate) fn spend_mana(&mut self, cost: u32) {
        self.mana = self.mana.saturating_sub(cost);
    }

    /// Add mana up to the cap.
    pub(crate) fn regen_mana(&mut self, amount: u32) {
        self.mana = self.mana.saturating_add(amount).min(self.max_mana);
    }

    /// Remove the card at `index` from hand and draw a replacement.
    pub(crate) fn play_from_hand(&mut self, index: usize, rng: &mut GameRng) -> Card {
        let card = self.hand.remove(index);
        if self.hand.len() < self.max_hand {
            if let Some(drawn) = self.deck.draw_one(rng) {
                self.hand.push(drawn);
            }
        }
        card
    }
}
