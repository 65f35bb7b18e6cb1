//! Process-wide conversation store.
//!
//! Histories are spread over a fixed set of shards selected by user key, so
//! unrelated users only share a lock for the few instructions it takes to
//! copy or append turns. Whole exchanges for the same user are serialized
//! separately through [`ConversationStore::begin_exchange`].

use crate::history::ConversationHistory;
use crate::turn::{ConversationTurn, TurnRole};
use parley_core::UserKey;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Default maximum number of turns kept per user.
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

const SHARD_COUNT: usize = 16;

#[derive(Debug, Default)]
struct Shard {
    histories: HashMap<UserKey, ConversationHistory>,
    /// Per-key exchange gates, present only while an exchange holds or
    /// waits for one. `clear` leaves them alone.
    gates: HashMap<UserKey, Arc<AsyncMutex<()>>>,
}

/// Diagnostic snapshot of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Number of keys with an entry, including empty ones.
    pub total_keys: usize,
    /// Number of turns across all keys.
    pub total_turns: usize,
    /// Keys holding at least one turn, ascending.
    pub keys_with_history: Vec<UserKey>,
}

/// Holds the exchange gate for one user key.
///
/// While a guard is alive, [`ConversationStore::begin_exchange`] for the same
/// key waits. Dropping the guard releases the gate, and removes it from the
/// store when no other exchange is waiting on it.
#[derive(Debug)]
pub struct ExchangeGuard<'a> {
    store: &'a ConversationStore,
    key: UserKey,
    gate: Option<OwnedMutexGuard<()>>,
}

impl Drop for ExchangeGuard<'_> {
    fn drop(&mut self) {
        drop(self.gate.take());

        // Waiters clone the gate under the shard lock, so a count of one
        // here means the map holds the only reference.
        let mut shard = self.store.shard(self.key);
        let idle = shard
            .gates
            .get(&self.key)
            .is_some_and(|gate| Arc::strong_count(gate) == 1);
        if idle {
            shard.gates.remove(&self.key);
        }
    }
}

/// Keyed map of bounded conversation histories.
///
/// Construct one per process and share it by `Arc`. Every operation is
/// infallible; histories are created lazily on first access.
#[derive(Debug)]
pub struct ConversationStore {
    shards: Box<[Mutex<Shard>]>,
    capacity: usize,
}

impl ConversationStore {
    /// Creates a store with [`DEFAULT_HISTORY_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Creates a store keeping at most `capacity` turns per key.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| Mutex::new(Shard::default()))
            .collect();
        Self {
            shards,
            capacity: capacity.max(1),
        }
    }

    /// Returns the per-key turn capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns up to `limit` of the most recent turns for `key`, oldest first.
    ///
    /// An unseen key gets an empty history entry and an empty result.
    #[must_use]
    pub fn get_history(&self, key: UserKey, limit: usize) -> Vec<ConversationTurn> {
        let capacity = self.capacity;
        let mut shard = self.shard(key);
        shard
            .histories
            .entry(key)
            .or_insert_with(|| ConversationHistory::new(capacity))
            .recent(limit)
    }

    /// Appends one turn for `key`, evicting the oldest turns past capacity.
    pub fn add_turn(&self, key: UserKey, role: TurnRole, content: impl Into<String>) {
        let turn = ConversationTurn::new(role, content);
        let capacity = self.capacity;
        let mut shard = self.shard(key);
        shard
            .histories
            .entry(key)
            .or_insert_with(|| ConversationHistory::new(capacity))
            .push(turn);
    }

    /// Appends a user turn followed by its assistant reply.
    ///
    /// Both turns are written under one lock acquisition; no other writer
    /// can land between them.
    pub fn append_exchange(
        &self,
        key: UserKey,
        user_content: impl Into<String>,
        assistant_content: impl Into<String>,
    ) {
        let user = ConversationTurn::user(user_content);
        let assistant = ConversationTurn::assistant(assistant_content);
        let capacity = self.capacity;
        let mut shard = self.shard(key);
        let history = shard
            .histories
            .entry(key)
            .or_insert_with(|| ConversationHistory::new(capacity));
        history.push(user);
        history.push(assistant);
    }

    /// Removes all history for `key`. Idempotent.
    pub fn clear(&self, key: UserKey) {
        self.shard(key).histories.remove(&key);
    }

    /// Returns a snapshot of key and turn counts.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let mut total_keys = 0;
        let mut total_turns = 0;
        let mut keys_with_history = Vec::new();

        for shard in self.shards.iter() {
            let shard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            total_keys += shard.histories.len();
            for (key, history) in &shard.histories {
                total_turns += history.len();
                if !history.is_empty() {
                    keys_with_history.push(*key);
                }
            }
        }

        keys_with_history.sort_unstable();
        StoreStats {
            total_keys,
            total_turns,
            keys_with_history,
        }
    }

    /// Waits for exclusive use of `key`'s exchange gate.
    ///
    /// Other keys are unaffected.
    pub async fn begin_exchange(&self, key: UserKey) -> ExchangeGuard<'_> {
        let gate = {
            let mut shard = self.shard(key);
            Arc::clone(shard.gates.entry(key).or_default())
        };
        ExchangeGuard {
            store: self,
            key,
            gate: Some(gate.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn gate_count(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().unwrap_or_else(PoisonError::into_inner).gates.len())
            .sum()
    }

    fn shard(&self, key: UserKey) -> MutexGuard<'_, Shard> {
        let index = key.get().rem_euclid(SHARD_COUNT as i64) as usize;
        self.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn contents(turns: &[ConversationTurn]) -> Vec<String> {
        turns.iter().map(|t| t.content().to_string()).collect()
    }

    #[test]
    fn unseen_key_has_empty_history() {
        let store = ConversationStore::new();
        assert!(store.get_history(UserKey::new(999_999), 6).is_empty());
    }

    #[test]
    fn add_and_get_turns() {
        let store = ConversationStore::new();
        let key = UserKey::new(1);
        store.add_turn(key, TurnRole::User, "Hello");
        store.add_turn(key, TurnRole::Assistant, "Hello! How can I help?");

        let history = store.get_history(key, 6);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], ConversationTurn::user("Hello"));
        assert_eq!(history[1], ConversationTurn::assistant("Hello! How can I help?"));
    }

    #[test]
    fn overflow_keeps_the_last_capacity_turns() {
        let store = ConversationStore::new();
        let key = UserKey::new(7);
        for i in 0..25 {
            store.add_turn(key, TurnRole::User, format!("msg-{i}"));
        }

        let history = store.get_history(key, 50);
        let expected: Vec<String> = (5..25).map(|i| format!("msg-{i}")).collect();
        assert_eq!(contents(&history), expected);
    }

    #[test]
    fn get_history_returns_min_of_appended_limit_and_capacity() {
        let capacity = 5;
        for appended in [0usize, 3, 5, 9] {
            for limit in [0usize, 2, 5, 8] {
                let store = ConversationStore::with_capacity(capacity);
                let key = UserKey::new(3);
                for i in 0..appended {
                    store.add_turn(key, TurnRole::User, i.to_string());
                }

                let history = store.get_history(key, limit);
                let expected_len = appended.min(limit).min(capacity);
                let expected: Vec<String> = (appended - expected_len..appended)
                    .map(|i| i.to_string())
                    .collect();
                assert_eq!(contents(&history), expected, "n={appended} m={limit}");
            }
        }
    }

    #[test]
    fn keys_are_isolated() {
        let store = ConversationStore::new();
        store.add_turn(UserKey::new(1), TurnRole::User, "one");
        store.add_turn(UserKey::new(17), TurnRole::User, "seventeen");

        assert_eq!(contents(&store.get_history(UserKey::new(1), 10)), ["one"]);
        assert_eq!(
            contents(&store.get_history(UserKey::new(17), 10)),
            ["seventeen"]
        );
    }

    #[test]
    fn negative_keys_are_supported() {
        let store = ConversationStore::new();
        let key = UserKey::new(-1_001_234);
        store.add_turn(key, TurnRole::User, "group chat");
        assert_eq!(store.get_history(key, 1).len(), 1);
    }

    #[test]
    fn clear_is_idempotent() {
        let store = ConversationStore::new();
        let key = UserKey::new(5);
        store.add_turn(key, TurnRole::User, "Test");
        assert_eq!(store.get_history(key, 6).len(), 1);

        store.clear(key);
        let once = store.stats();
        assert!(store.get_history(key, 6).is_empty());

        store.clear(key);
        store.clear(key);
        assert!(store.get_history(key, 6).is_empty());
        assert_eq!(store.stats().keys_with_history, once.keys_with_history);
    }

    #[test]
    fn append_exchange_writes_user_then_assistant() {
        let store = ConversationStore::new();
        let key = UserKey::new(2);
        store.append_exchange(key, "question", "answer");

        let history = store.get_history(key, 10);
        assert_eq!(history[0], ConversationTurn::user("question"));
        assert_eq!(history[1], ConversationTurn::assistant("answer"));
    }

    #[test]
    fn stats_counts_keys_and_turns() {
        let store = ConversationStore::new();
        store.add_turn(UserKey::new(9), TurnRole::User, "a");
        store.add_turn(UserKey::new(9), TurnRole::Assistant, "b");
        store.add_turn(UserKey::new(4), TurnRole::User, "c");
        let _ = store.get_history(UserKey::new(100), 6);

        let stats = store.stats();
        assert_eq!(stats.total_keys, 3);
        assert_eq!(stats.total_turns, 3);
        assert_eq!(stats.keys_with_history, [UserKey::new(4), UserKey::new(9)]);
    }

    #[tokio::test]
    async fn exchange_gate_blocks_same_key_only() {
        let store = ConversationStore::new();
        let guard = store.begin_exchange(UserKey::new(1)).await;

        let same = tokio::time::timeout(
            Duration::from_millis(50),
            store.begin_exchange(UserKey::new(1)),
        )
        .await;
        assert!(same.is_err(), "same key should wait for the gate");

        let other = tokio::time::timeout(
            Duration::from_millis(50),
            store.begin_exchange(UserKey::new(2)),
        )
        .await;
        assert!(other.is_ok(), "other keys should not wait");

        drop(guard);
        let again = tokio::time::timeout(
            Duration::from_millis(50),
            store.begin_exchange(UserKey::new(1)),
        )
        .await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn gate_survives_clear() {
        let store = ConversationStore::new();
        let key = UserKey::new(8);
        let guard = store.begin_exchange(key).await;
        store.clear(key);

        let second = tokio::time::timeout(Duration::from_millis(50), store.begin_exchange(key)).await;
        assert!(second.is_err());
        drop(guard);
    }

    #[tokio::test]
    async fn idle_gates_are_released() {
        let store = ConversationStore::new();
        for raw in 0..100 {
            let _guard = store.begin_exchange(UserKey::new(raw)).await;
        }
        assert_eq!(store.gate_count(), 0);
    }

    #[tokio::test]
    async fn gate_stays_while_an_exchange_waits() {
        let store = Arc::new(ConversationStore::new());
        let key = UserKey::new(12);
        let first = store.begin_exchange(key).await;

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let _guard = store.begin_exchange(key).await;
            })
        };
        // Let the waiter reach the gate.
        tokio::task::yield_now().await;

        drop(first);
        assert_eq!(store.gate_count(), 1);

        waiter.await.expect("waiter should not panic");
        assert_eq!(store.gate_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_exchanges_keep_pairs_intact() {
        let store = Arc::new(ConversationStore::with_capacity(200));
        let key = UserKey::new(11);

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let _guard = store.begin_exchange(key).await;
                let _ = store.get_history(key, 6);
                tokio::task::yield_now().await;
                store.append_exchange(key, format!("q{i}"), format!("a{i}"));
            }));
        }
        for handle in handles {
            handle.await.expect("task should not panic");
        }

        let history = store.get_history(key, 200);
        assert_eq!(history.len(), 40);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role(), TurnRole::User);
            assert_eq!(pair[1].role(), TurnRole::Assistant);
            assert_eq!(pair[0].content()[1..], pair[1].content()[1..]);
        }
    }
}
