//! Card reference data.
//!
//! A `Card` is read-only data supplied by the profile store or the client's
//! deck payload. The engine only looks at two numbers: mana cost and flat
//! attack damage. Missing values fall back to cost 1 and attack 0.

use serde::{Deserialize, Serialize};

/// Default mana cost for cards that omit it.
pub const DEFAULT_MANA_COST: u32 = 1;

/// A playable card.
///
/// ## Example
///
/// ```
/// use ccg_arena::cards::Card;
///
/// let card: Card = serde_json::from_str(r#"{"name": "Spark"}"#).unwrap();
/// assert_eq!(card.mana_cost, 1);
/// assert_eq!(card.attack, 0);
///
/// let bolt: Card = serde_json::from_str(r#"{"name": "Bolt", "manaCost": 2, "damage": 3}"#).unwrap();
/// assert_eq!(bolt.attack, 3);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// Display name; also the identity used to find the card in a hand.
    pub name: String,

    /// Mana deducted when played.
    #[serde(default = "default_mana_cost", alias = "cost")]
    pub mana_cost: u32,

    /// Flat damage dealt to the opponent.
    #[serde(default, alias = "damage")]
    pub attack: u32,
}

fn default_mana_cost() -> u32 {
    DEFAULT_MANA_COST
}

impl Card {
    /// Create a card.
    #[must_use]
    pub fn new(name: impl Into<String>, mana_cost: u32, attack: u32) -> Self {
        Self {
            name: name.into(),
            mana_cost,
            attack,
        }
    }

    /// Does this card deal damage?
    #[must_use]
    pub fn is_attack(&self) -> bool {
        self.attack > 0
    }
}

impl std::fmt::Display for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}/{})", self.name, self.mana_cost, self.attack)
    }
}
