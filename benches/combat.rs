//! Benchmarks for the combat hot path: session setup, card resolution and
//! turn switching.

use std::hint::black_box;
use std::sync::Arc;

use ccg_arena::cards::{Card, Deck};
use ccg_arena::core::{BattleConfig, ConnectionId, UserId};
use ccg_arena::session::{BattleMode, NewPlayer, Participant, SessionStore};
use ccg_arena::{apply_card_play, end_turn};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

const ALICE: Participant = Participant::Human(ConnectionId(1));
const BOB: Participant = Participant::Human(ConnectionId(2));

fn deck() -> Deck {
    Deck::new(vec![
        Card::new("Spark", 1, 3),
        Card::new("Bolt", 2, 5),
        Card::new("Shield", 1, 0),
        Card::new("Blast", 3, 7),
    ])
}

fn player(id: u64, user: &str) -> NewPlayer {
    NewPlayer {
        connection: ConnectionId(id),
        user_id: UserId::new(user),
        display_name: user.to_string(),
        deck: deck(),
    }
}

fn pvp_store() -> (SessionStore, ccg_arena::SessionId) {
    let config = Arc::new(BattleConfig::default().with_seed(42).with_starting_mana(10).with_max_mana(10));
    let mut store = SessionStore::new(config);
    let id = store
        .create(BattleMode::PvP, vec![player(1, "alice"), player(2, "bob")])
        .expect("session");
    (store, id)
}

fn bench_create_session(c: &mut Criterion) {
    let config = Arc::new(BattleConfig::default().with_seed(42));

    c.bench_function("create_pvp_session", |b| {
        b.iter_batched(
            || SessionStore::new(config.clone()),
            |mut store| {
                let id = store.create(BattleMode::PvP, vec![player(1, "alice"), player(2, "bob")]);
                black_box(id)
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_card_play(c: &mut Criterion) {
    c.bench_function("apply_card_play", |b| {
        b.iter_batched(
            pvp_store,
            |(mut store, id)| {
                let session = store.get_mut(id).expect("session");
                let card = session.seat(session.current_turn()).state.hand()[0].clone();
                black_box(apply_card_play(session, ALICE, &card, Some("enemy")))
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_turn_cycle(c: &mut Criterion) {
    c.bench_function("end_turn_x20", |b| {
        b.iter_batched(
            pvp_store,
            |(mut store, id)| {
                let session = store.get_mut(id).expect("session");
                for round in 0..20 {
                    let actor = if round % 2 == 0 { ALICE } else { BOB };
                    let _ = black_box(end_turn(session, actor));
                }
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_create_session, bench_card_play, bench_turn_cycle);
criterion_main!(benches);
