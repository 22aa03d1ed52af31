//! Card play resolution.
//!
//! `apply_card_play` is the only code path that changes hp, mana or hand
//! during a match. Every check runs before the first mutation, so a
//! rejected play leaves the session untouched.

use crate::cards::Card;
use crate::core::BattleError;
use crate::session::{MoveRecord, Participant, Session, SessionStatus, Side};

/// Target keyword that always means "the other seat".
pub const ENEMY_TARGET: &str = "enemy";

/// Outcome of one accepted card play.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardPlay {
    pub actor: Side,
    pub actor_id: String,
    pub target_id: String,
    pub card: Card,
    /// Damage actually dealt after clamping.
    pub damage: u32,
    pub actor_hp: u32,
    pub defender_hp: u32,
    /// Actor's mana after paying the cost.
    pub actor_mana: u32,
    /// Position of this play in the move log.
    pub move_number: u32,
    /// Set when the play reduced the defender to zero.
    pub winner: Option<Side>,
}

impl CardPlay {
    #[must_use]
    pub fn is_lethal(&self) -> bool {
        self.winner.is_some()
    }
}

/// Validate and apply `card` played by `actor` against the other seat.
///
/// Humans must hold a card with that name; the copy in hand is what gets
/// played. The AI plays `card` as given. On a lethal hit the session is
/// marked `Completed` and no further plays are accepted.
pub fn apply_card_play(
    session: &mut Session,
    actor: Participant,
    card: &Card,
    target: Option<&str>,
) -> Result<CardPlay, BattleError> {
    let side = session.side_of(actor).ok_or(BattleError::InvalidTurn)?;
    if !session.is_in_progress() || session.current_turn() != side {
        return Err(BattleError::InvalidTurn);
    }

    let defender = side.opponent();
    let target_id = session.seat(defender).player_id();
    if let Some(named) = target {
        if named != ENEMY_TARGET && named != target_id {
            return Err(BattleError::InvalidPayload(format!("Invalid target: {named}")));
        }
    }

    let attacker = &session.seat(side).state;
    let hand_index = match actor {
        Participant::Human(_) => Some(
            attacker
                .hand_position(&card.name)
                .ok_or_else(|| BattleError::CardNotInHand(card.name.clone()))?,
        ),
        Participant::Ai => None,
    };
    let played = match hand_index {
        Some(index) => attacker.hand()[index].clone(),
        None => card.clone(),
    };
    if attacker.mana() < played.mana_cost {
        return Err(BattleError::InsufficientMana {
            required: played.mana_cost,
            available: attacker.mana(),
        });
    }

    // Validated; mutate.
    session.seat_mut(side).state.spend_mana(played.mana_cost);
    if let Some(index) = hand_index {
        session.play_from_hand(side, index);
    }
    let damage = session.seat_mut(defender).state.take_damage(played.attack);

    let actor_id = session.seat(side).player_id();
    let move_number = session.record_move(MoveRecord {
        sequence: 0,
        turn: session.turn_number(),
        actor: actor_id.clone(),
        target: target_id.clone(),
        card: played.clone(),
        damage,
        elapsed_ms: 0,
    });

    let winner = if session.seat(defender).state.is_defeated() {
        session.set_status(SessionStatus::Completed { winner: side });
        Some(side)
    } else {
        None
    };

    Ok(CardPlay {
        actor: side,
        actor_id,
        target_id,
        card: played,
        damage,
        actor_hp: session.seat(side).state.hp(),
        defender_hp: session.seat(defender).state.hp(),
        actor_mana: session.seat(side).state.mana(),
        move_number,
        winner,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::Deck;
    use crate::core::{BattleConfig, ConnectionId, UserId};
    use crate::session::{BattleMode, NewPlayer, SessionStore};
    use std::sync::Arc;

    const ALICE: Participant = Participant::Human(ConnectionId(1));
    const BOB: Participant = Participant::Human(ConnectionId(2));

    fn deck() -> Deck {
        Deck::new(vec![
            Card::new("Spark", 1, 3),
            Card::new("Bolt", 2, 5),
            Card::new("Wall", 1, 0),
            Card::new("Nuke", 1, 50),
        ])
    }

    fn player(conn: u64, user: &str) -> NewPlayer {
        NewPlayer {
            connection: ConnectionId::new(conn),
            user_id: UserId::new(user),
            display_name: user.to_string(),
            deck: deck(),
        }
    }

    /// PvP session where both players hold the whole deck.
    fn pvp(config: BattleConfig) -> (SessionStore, crate::core::SessionId) {
        let mut store = SessionStore::new(Arc::new(config.with_seed(1).with_initial_hand_size(4)));
        let id = store
            .create(BattleMode::PvP, vec![player(1, "alice"), player(2, "bob")])
            .unwrap();
        (store, id)
    }

    #[test]
    fn test_valid_play_applies_damage() {
        let (mut store, id) = pvp(BattleConfig::default());
        let session = store.get_mut(id).unwrap();

        let play = apply_card_play(session, ALICE, &Card::new("Spark", 1, 3), None).unwrap();

        assert_eq!(play.damage, 3);
        assert_eq!(play.defender_hp, 27);
        assert_eq!(play.actor_mana, 0);
        assert_eq!(play.actor_id, "alice");
        assert_eq!(play.target_id, "bob");
        assert_eq!(play.move_number, 1);
        assert!(!play.is_lethal());
        assert_eq!(session.move_log().len(), 1);
    }

    #[test]
    fn test_non_owner_rejected_without_mutation() {
        let (mut store, id) = pvp(BattleConfig::default());
        let session = store.get_mut(id).unwrap();
        let before = session.summary();

        let err = apply_card_play(session, BOB, &Card::new("Spark", 1, 3), None).unwrap_err();

        assert_eq!(err, BattleError::InvalidTurn);
        assert_eq!(session.summary(), before);
    }

    #[test]
    fn test_outsider_rejected() {
        let (mut store, id) = pvp(BattleConfig::default());
        let session = store.get_mut(id).unwrap();
        let outsider = Participant::Human(ConnectionId::new(99));

        assert_eq!(
            apply_card_play(session, outsider, &Card::new("Spark", 1, 3), None),
            Err(BattleError::InvalidTurn)
        );
    }

    #[test]
    fn test_insufficient_mana() {
        let (mut store, id) = pvp(BattleConfig::default());
        let session = store.get_mut(id).unwrap();
        let before = session.summary();

        let err = apply_card_play(session, ALICE, &Card::new("Bolt", 2, 5), None).unwrap_err();

        assert_eq!(
            err,
            BattleError::InsufficientMana {
                required: 2,
                available: 1
            }
        );
        assert_eq!(session.summary(), before);
    }

    #[test]
    fn test_card_not_in_hand() {
        let (mut store, id) = pvp(BattleConfig::default());
        let session = store.get_mut(id).unwrap();

        let err = apply_card_play(session, ALICE, &Card::new("Dragon", 1, 99), None).unwrap_err();
        assert_eq!(err, BattleError::CardNotInHand("Dragon".into()));
    }

    #[test]
    fn test_hand_copy_is_authoritative() {
        let (mut store, id) = pvp(BattleConfig::default());
        let session = store.get_mut(id).unwrap();

        // Client claims 40 attack; the hand copy deals 3.
        let play = apply_card_play(session, ALICE, &Card::new("Spark", 0, 40), None).unwrap();
        assert_eq!(play.damage, 3);
        assert_eq!(play.card.mana_cost, 1);
    }

    #[test]
    fn test_invalid_target() {
        let (mut store, id) = pvp(BattleConfig::default());
        let session = store.get_mut(id).unwrap();

        assert!(apply_card_play(session, ALICE, &Card::new("Spark", 1, 3), Some("bob")).is_ok());
        session.pass_turn();
        assert!(matches!(
            apply_card_play(session, BOB, &Card::new("Spark", 1, 3), Some("bob")),
            Err(BattleError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_lethal_completes_session() {
        let (mut store, id) = pvp(BattleConfig::default());
        let session = store.get_mut(id).unwrap();

        let play = apply_card_play(session, ALICE, &Card::new("Nuke", 1, 50), Some(ENEMY_TARGET)).unwrap();

        assert_eq!(play.damage, 30);
        assert_eq!(play.defender_hp, 0);
        assert_eq!(play.winner, Some(Side::First));
        assert_eq!(session.status(), SessionStatus::Completed { winner: Side::First });

        // Nothing more is accepted.
        assert_eq!(
            apply_card_play(session, ALICE, &Card::new("Spark", 1, 3), None),
            Err(BattleError::InvalidTurn)
        );
    }

    #[test]
    fn test_ai_plays_card_as_given() {
        let mut store = SessionStore::new(Arc::new(BattleConfig::default().with_seed(1)));
        let id = store.create(BattleMode::Ai, vec![player(1, "alice")]).unwrap();
        let session = store.get_mut(id).unwrap();
        session.pass_turn();

        let play = apply_card_play(session, Participant::Ai, &Card::new("Basic Strike", 0, 2), None).unwrap();

        assert_eq!(play.actor_id, "ai");
        assert_eq!(play.target_id, "alice");
        assert_eq!(play.defender_hp, 28);
    }
}
