//! Process-local store used by the server binary and tests.
//!
//! History records are kept bincode-encoded, the same bytes a durable
//! backend would write. `set_offline(true)` makes every call fail with
//! `StoreError::Unavailable` to exercise outage handling.

use futures::future::{self, BoxFuture, FutureExt};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use super::{LeaderboardStore, MatchHistoryStore, MatchRecord, Profile, ProfileStore};
use crate::core::{StoreError, UserId};

#[derive(Clone, Debug, PartialEq, Eq)]
struct LeaderboardEntry {
    display_name: String,
    wins: u32,
}

/// In-memory profiles, history and leaderboard.
#[derive(Debug, Default)]
pub struct MemoryStore {
    profiles: RwLock<FxHashMap<UserId, Profile>>,
    history: Mutex<Vec<Vec<u8>>>,
    leaderboard: Mutex<FxHashMap<UserId, LeaderboardEntry>>,
    offline: AtomicBool,
    history_attempts: AtomicUsize,
    leaderboard_attempts: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: seed a profile.
    #[must_use]
    pub fn with_profile(self, profile: Profile) -> Self {
        self.insert_profile(profile);
        self
    }

    pub fn insert_profile(&self, profile: Profile) {
        let mut profiles = self.profiles.write().unwrap_or_else(PoisonError::into_inner);
        profiles.insert(profile.user_id.clone(), profile);
    }

    /// Simulate an outage.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Decoded history, oldest first.
    pub fn history(&self) -> Result<Vec<MatchRecord>, StoreError> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history
            .iter()
            .map(|bytes| bincode::deserialize(bytes).map_err(StoreError::from))
            .collect()
    }

    /// Calls to `append_match`, including failed ones.
    #[must_use]
    pub fn history_attempts(&self) -> usize {
        self.history_attempts.load(Ordering::SeqCst)
    }

    /// Calls to `record_win`, including failed ones.
    #[must_use]
    pub fn leaderboard_attempts(&self) -> usize {
        self.leaderboard_attempts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn wins(&self, user_id: &UserId) -> u32 {
        let board = self.leaderboard.lock().unwrap_or_else(PoisonError::into_inner);
        board.get(user_id).map_or(0, |entry| entry.wins)
    }

    /// Top `limit` players by wins, ties by user id.
    #[must_use]
    pub fn top(&self, limit: usize) -> Vec<(UserId, String, u32)> {
        let board = self.leaderboard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut rows: Vec<_> = board
            .iter()
            .map(|(id, entry)| (id.clone(), entry.display_name.clone(), entry.wins))
            .collect();
        rows.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
        rows.truncate(limit);
        rows
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl ProfileStore for MemoryStore {
    fn load_profile(&self, user_id: &UserId) -> BoxFuture<'_, Result<Option<Profile>, StoreError>> {
        let result = self.check_online().map(|()| {
            let profiles = self.profiles.read().unwrap_or_else(PoisonError::into_inner);
            profiles.get(user_id).cloned()
        });
        future::ready(result).boxed()
    }
}

impl MatchHistoryStore for MemoryStore {
    fn append_match(&self, record: MatchRecord) -> BoxFuture<'_, Result<(), StoreError>> {
        self.history_attempts.fetch_add(1, Ordering::SeqCst);
        let result = self.check_online().and_then(|()| {
            let bytes = bincode::serialize(&record)?;
            self.history
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(bytes);
            Ok(())
        });
        future::ready(result).boxed()
    }
}

impl LeaderboardStore for MemoryStore {
    fn record_win(&self, user_id: UserId, display_name: String) -> BoxFuture<'_, Result<(), StoreError>> {
        self.leaderboard_attempts.fetch_add(1, Ordering::SeqCst);
        let result = self.check_online().map(|()| {
            let mut board = self.leaderboard.lock().unwrap_or_else(PoisonError::into_inner);
            let entry = board.entry(user_id).or_insert_with(|| LeaderboardEntry {
                display_name: display_name.clone(),
                wins: 0,
            });
            entry.display_name = display_name;
            entry.wins += 1;
        });
        future::ready(result).boxed()
    }
}
