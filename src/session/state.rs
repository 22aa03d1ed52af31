//! Match state.
//!
//! ## Session
//!
//! One active match: two seats, the turn owner, status, spectators, the move
//! log and the session's timers. Seat `First` always opens the match (oldest
//! queue entry in PvP, the requester in AI mode).
//!
//! Combat mutations go through `crate::combat` and `crate::turn`; this module
//! exposes them as `pub(crate)` only.

use im::Vector;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tokio::time::Instant;

use super::player::PlayerState;
use crate::cards::Card;
use crate::core::{ConnectionId, GameRng, SessionId};
use crate::turn::{TimerHandle, TimerKind, TimerToken};

/// Label used for the AI opponent wherever a player id is expected.
pub const AI_PLAYER_ID: &str = "ai";

/// Match mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BattleMode {
    #[serde(rename = "AI")]
    Ai,
    #[serde(rename = "PvP")]
    PvP,
}

/// Seat index. Exactly one seat owns the turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    First,
    Second,
}

impl Side {
    /// The other seat.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Side::First => Side::Second,
            Side::Second => Side::First,
        }
    }

    const fn index(self) -> usize {
        match self {
            Side::First => 0,
            Side::Second => 1,
        }
    }
}

/// Who occupies a seat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Participant {
    Human(ConnectionId),
    Ai,
}

impl Participant {
    #[must_use]
    pub fn connection(self) -> Option<ConnectionId> {
        match self {
            Participant::Human(conn) => Some(conn),
            Participant::Ai => None,
        }
    }
}

/// Why a match ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Victory,
    Inactivity,
    Disconnect,
    Shutdown,
}

/// Lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    InProgress,
    Completed { winner: Side },
    Abandoned(EndReason),
}

/// One applied card play.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// 1-based position in the move log.
    pub sequence: u32,
    /// Turn number the move was made in.
    pub turn: u32,
    pub actor: String,
    pub target: String,
    pub card: Card,
    /// Damage actually applied after clamping.
    pub damage: u32,
    /// Milliseconds since the session started.
    pub elapsed_ms: u64,
}

/// One seat at the table.
#[derive(Debug)]
pub struct Seat {
    pub participant: Participant,
    pub state: PlayerState,
}

impl Seat {
    /// Player id used on the wire: user id for humans, `"ai"` for the AI.
    #[must_use]
    pub fn player_id(&self) -> String {
        match self.participant {
            Participant::Human(_) => self.state.user_id().to_string(),
            Participant::Ai => AI_PLAYER_ID.to_string(),
        }
    }
}

/// Timer slots owned by a session. Replacing a slot cancels the old timer.
#[derive(Debug, Default)]
pub struct SessionTimers {
    pub turn: Option<TimerHandle>,
    pub inactivity: Option<TimerHandle>,
    pub ai_action: Option<TimerHandle>,
}

impl SessionTimers {
    /// Mutable slot for a timer kind.
    pub fn slot_mut(&mut self, kind: TimerKind) -> &mut Option<TimerHandle> {
        match kind {
            TimerKind::Turn => &mut self.turn,
            TimerKind::Inactivity => &mut self.inactivity,
            TimerKind::AiAction => &mut self.ai_action,
        }
    }

    /// Is `token` the live timer of this kind?
    #[must_use]
    pub fn is_current(&self, kind: TimerKind, token: TimerToken) -> bool {
        let slot = match kind {
            TimerKind::Turn => &self.turn,
            TimerKind::Inactivity => &self.inactivity,
            TimerKind::AiAction => &self.ai_action,
        };
        slot.as_ref().is_some_and(|handle| handle.token() == token)
    }

    /// Cancel every timer.
    pub fn cancel_all(&mut self) {
        self.turn = None;
        self.inactivity = None;
        self.ai_action = None;
    }
}

/// Read-only view of a live session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub mode: BattleMode,
    pub current_turn_owner: String,
    pub turn: u32,
    pub players: Vec<PlayerSummary>,
    pub spectator_count: usize,
    pub total_moves: usize,
}

/// Public per-player numbers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub player_id: String,
    pub display_name: String,
    pub hp: u32,
    pub mana: u32,
    pub hand_size: usize,
}

/// An active match.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    mode: BattleMode,
    seats: [Seat; 2],
    turn: Side,
    turn_number: u32,
    status: SessionStatus,
    spectators: FxHashSet<ConnectionId>,
    move_log: Vector<MoveRecord>,
    started_at: Instant,
    rng: GameRng,
    pub(crate) timers: SessionTimers,
}

impl Session {
    /// Create a session; `first` owns the opening turn.
    pub(crate) fn new(id: SessionId, mode: BattleMode, first: Seat, second: Seat, rng: GameRng) -> Self {
        Self {
            id,
            mode,
            seats: [first, second],
            turn: Side::First,
            turn_number: 1,
            status: SessionStatus::InProgress,
            spectators: FxHashSet::default(),
            move_log: Vector::new(),
            started_at: Instant::now(),
            rng,
            timers: SessionTimers::default(),
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn mode(&self) -> BattleMode {
        self.mode
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.status == SessionStatus::InProgress
    }

    /// Seat whose turn it is.
    #[must_use]
    pub fn current_turn(&self) -> Side {
        self.turn
    }

    /// Participant whose turn it is.
    #[must_use]
    pub fn current_turn_owner(&self) -> Participant {
        self.seat(self.turn).participant
    }

    #[must_use]
    pub fn turn_number(&self) -> u32 {
        self.turn_number
    }

    #[must_use]
    pub fn seat(&self, side: Side) -> &Seat {
        &self.seats[side.index()]
    }

    pub(crate) fn seat_mut(&mut self, side: Side) -> &mut Seat {
        &mut self.seats[side.index()]
    }

    /// Both seats, `First` then `Second`.
    pub fn seats(&self) -> impl Iterator<Item = (Side, &Seat)> {
        [Side::First, Side::Second]
            .into_iter()
            .map(move |side| (side, self.seat(side)))
    }

    /// Seat occupied by `participant`, if any.
    #[must_use]
    pub fn side_of(&self, participant: Participant) -> Option<Side> {
        self.seats()
            .find(|(_, seat)| seat.participant == participant)
            .map(|(side, _)| side)
    }

    /// Human player connections: one in AI mode, two in PvP.
    #[must_use]
    pub fn players(&self) -> SmallVec<[ConnectionId; 2]> {
        self.seats
            .iter()
            .filter_map(|seat| seat.participant.connection())
            .collect()
    }

    #[must_use]
    pub fn is_player(&self, conn: ConnectionId) -> bool {
        self.side_of(Participant::Human(conn)).is_some()
    }

    #[must_use]
    pub fn spectators(&self) -> &FxHashSet<ConnectionId> {
        &self.spectators
    }

    /// Everyone in the broadcast group: players then spectators.
    #[must_use]
    pub fn audience(&self) -> Vec<ConnectionId> {
        let mut all: Vec<ConnectionId> = self.players().into_iter().collect();
        all.extend(self.spectators.iter().copied());
        all
    }

    #[must_use]
    pub fn move_log(&self) -> &Vector<MoveRecord> {
        &self.move_log
    }

    /// Time since the session was created.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Public view for inspection and spectators.
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id,
            mode: self.mode,
            current_turn_owner: self.seat(self.turn).player_id(),
            turn: self.turn_number,
            players: self
                .seats
                .iter()
                .map(|seat| PlayerSummary {
                    player_id: seat.player_id(),
                    display_name: seat.state.display_name().to_string(),
                    hp: seat.state.hp(),
                    mana: seat.state.mana(),
                    hand_size: seat.state.hand().len(),
                })
                .collect(),
            spectator_count: self.spectators.len(),
            total_moves: self.move_log.len(),
        }
    }

    // === Mutation (combat / turn / relay only) ===

    pub(crate) fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
    }

    pub(crate) fn pass_turn(&mut self) -> Side {
        self.turn = self.turn.opponent();
        self.turn_number += 1;
        self.turn
    }

    /// Play a card out of `side`'s hand, drawing a replacement.
    pub(crate) fn play_from_hand(&mut self, side: Side, index: usize) -> Card {
        let Self { seats, rng, .. } = self;
        seats[side.index()].state.play_from_hand(index, rng)
    }

    pub(crate) fn record_move(&mut self, mut record: MoveRecord) -> u32 {
        record.sequence = self.move_log.len() as u32 + 1;
        record.elapsed_ms = self.elapsed().as_millis() as u64;
        let sequence = record.sequence;
        self.move_log.push_back(record);
        sequence
    }

    pub(crate) fn add_spectator(&mut self, conn: ConnectionId) -> usize {
        self.spectators.insert(conn);
        self.spectators.len()
    }

    pub(crate) fn remove_spectator(&mut self, conn: ConnectionId) -> bool {
        self.spectators.remove(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::Deck;
    use crate::core::{BattleConfig, UserId};

    fn seat(participant: Participant, user: &str) -> Seat {
        let config = BattleConfig::default();
        let deck: Deck = (1..=6).map(|i| Card::new(format!("C{i}"), 1, i)).collect();
        Seat {
            participant,
            state: PlayerState::new(UserId::new(user), user, deck, &config, &mut GameRng::new(1)),
        }
    }

    fn pvp() -> Session {
        Session::new(
            SessionId::generate(),
            BattleMode::PvP,
            seat(Participant::Human(ConnectionId::new(1)), "alice"),
            seat(Participant::Human(ConnectionId::new(2)), "bob"),
            GameRng::new(5),
        )
    }

    #[test]
    fn test_side_opponent() {
        assert_eq!(Side::First.opponent(), Side::Second);
        assert_eq!(Side::Second.opponent(), Side::First);
    }

    #[test]
    fn test_new_session_first_seat_opens() {
        let session = pvp();
        assert!(session.is_in_progress());
        assert_eq!(session.current_turn(), Side::First);
        assert_eq!(session.current_turn_owner(), Participant::Human(ConnectionId::new(1)));
        assert_eq!(session.turn_number(), 1);
    }

    #[test]
    fn test_players_and_audience() {
        let mut session = pvp();
        session.add_spectator(ConnectionId::new(9));

        assert_eq!(session.players().as_slice(), &[ConnectionId::new(1), ConnectionId::new(2)]);
        assert_eq!(session.audience().len(), 3);
        assert!(session.is_player(ConnectionId::new(2)));
        assert!(!session.is_player(ConnectionId::new(9)));
    }

    #[test]
    fn test_ai_seat_labels() {
        let session = Session::new(
            SessionId::generate(),
            BattleMode::Ai,
            seat(Participant::Human(ConnectionId::new(1)), "alice"),
            seat(Participant::Ai, "ai"),
            GameRng::new(5),
        );

        assert_eq!(session.players().len(), 1);
        assert_eq!(session.seat(Side::Second).player_id(), AI_PLAYER_ID);
        assert_eq!(session.side_of(Participant::Ai), Some(Side::Second));
    }

    #[test]
    fn test_record_move_sequences() {
        let mut session = pvp();
        let record = MoveRecord {
            sequence: 0,
            turn: 1,
            actor: "alice".into(),
            target: "bob".into(),
            card: Card::new("C1", 1, 1),
            damage: 1,
            elapsed_ms: 0,
        };

        assert_eq!(session.record_move(record.clone()), 1);
        assert_eq!(session.record_move(record), 2);
        assert_eq!(session.move_log().len(), 2);
    }

    #[test]
    fn test_summary() {
        let session = pvp();
        let summary = session.summary();

        assert_eq!(summary.current_turn_owner, "alice");
        assert_eq!(summary.players.len(), 2);
        assert_eq!(summary.players[1].hp, 30);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["mode"], "PvP");
        assert_eq!(json["currentTurnOwner"], "alice");
    }
}
