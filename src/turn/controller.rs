//! Turn switching and the AI opponent's move policy.
//!
//! ```text
//! WaitingForMove --play (no win)--> WaitingForMove
//! WaitingForMove --end_turn-------> WaitingForMove (owner flipped, +1 mana each)
//! WaitingForMove --lethal play----> Completed
//! WaitingForMove --disconnect/idle-> Abandoned
//! ```
//!
//! Timers are armed by the engine around these calls; this module only
//! changes session state.

use std::collections::BTreeMap;

use crate::cards::Card;
use crate::core::BattleError;
use crate::session::{Participant, Session, Side};

/// Mana both seats gain when the turn passes.
pub const MANA_PER_TURN: u32 = 1;

/// Name of the card the AI plays when nothing in its deck fits.
pub const AI_FALLBACK_CARD: &str = "Basic Strike";

/// Result of a turn switch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnChange {
    pub owner: Side,
    pub owner_id: String,
    pub turn: u32,
    /// Player id to mana after regeneration.
    pub mana: BTreeMap<String, u32>,
}

/// End `actor`'s turn.
///
/// Flips ownership to the other seat and gives both seats
/// [`MANA_PER_TURN`] mana, capped at their maximum.
pub fn end_turn(session: &mut Session, actor: Participant) -> Result<TurnChange, BattleError> {
    let side = session.side_of(actor).ok_or(BattleError::InvalidTurn)?;
    if !session.is_in_progress() || session.current_turn() != side {
        return Err(BattleError::InvalidTurn);
    }

    let owner = session.pass_turn();
    for seat_side in [Side::First, Side::Second] {
        session.seat_mut(seat_side).state.regen_mana(MANA_PER_TURN);
    }

    Ok(TurnChange {
        owner,
        owner_id: session.seat(owner).player_id(),
        turn: session.turn_number(),
        mana: session
            .seats()
            .map(|(_, seat)| (seat.player_id(), seat.state.mana()))
            .collect(),
    })
}

/// Fallback AI card: free, two damage.
#[must_use]
pub fn ai_fallback_card() -> Card {
    Card::new(AI_FALLBACK_CARD, 0, 2)
}

/// Card the AI seat plays this turn.
///
/// First card in the AI's deck with positive attack that it can afford,
/// otherwise [`ai_fallback_card`].
#[must_use]
pub fn choose_ai_card(session: &Session) -> Option<Card> {
    let side = session.side_of(Participant::Ai)?;
    let state = &session.seat(side).state;
    Some(
        state
            .deck()
            .first_affordable_attack(state.mana())
            .cloned()
            .unwrap_or_else(ai_fallback_card),
    )
}

/// Does the AI own the current turn of a live session?
#[must_use]
pub fn is_ai_turn(session: &Session) -> bool {
    session.is_in_progress() && session.current_turn_owner() == Participant::Ai
}
