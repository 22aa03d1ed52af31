//! Card system: card reference data and decks.
//!
//! ## Key Types
//!
//! - `Card`: Name, mana cost and flat attack damage
//! - `Deck`: A player's card pool with shuffle-and-slice draws

pub mod card;
pub mod deck;

pub use card::{Card, DEFAULT_MANA_COST};
pub use deck::Deck;
