//! Per-user state records.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::state::State;
use crate::store::UserId;
use crate::ttl::is_idle;

/// A user's current state and when it was last used.
#[derive(Debug, Clone)]
pub struct StateRecord {
    pub state: State,
    pub last_use: Instant,
}

impl StateRecord {
    fn new(state: State) -> Self {
        Self {
            state,
            last_use: Instant::now(),
        }
    }
}

/// Concurrent map of user id to [`StateRecord`].
///
/// At most one record exists per user. Sharded locking keeps unrelated users
/// from contending.
#[derive(Debug, Default)]
pub struct StateTable {
    records: DashMap<UserId, StateRecord>,
}

impl StateTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a default record if the user has none. Returns whether a record
    /// was inserted.
    pub fn create(&self, user: UserId) -> bool {
        match self.records.entry(user) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(StateRecord::new(State::DEFAULT));
                true
            }
        }
    }

    /// Overwrite the user's record with `state`, creating it if needed.
    pub fn set(&self, user: UserId, state: State) {
        self.records.insert(user, StateRecord::new(state));
    }

    /// Current state of the user, refreshing its last-use time.
    pub fn current(&self, user: UserId) -> Option<State> {
        let mut record = self.records.get_mut(&user)?;
        record.last_use = Instant::now();
        Some(record.state.clone())
    }

    /// Current record without refreshing it.
    #[cfg(test)]
    fn peek(&self, user: UserId) -> Option<StateRecord> {
        self.records.get(&user).map(|r| r.value().clone())
    }

    /// Remove every record idle for longer than `ttl`, returning the evicted
    /// user ids.
    ///
    /// Each removal re-checks idleness under the shard lock, so a user
    /// refreshed between the scan and the delete is kept.
    pub fn drain_expired(&self, ttl: Duration) -> Vec<UserId> {
        let candidates: Vec<UserId> = self
            .records
            .iter()
            .filter(|r| is_idle(r.value().last_use, ttl))
            .map(|r| *r.key())
            .collect();

        candidates
            .into_iter()
            .filter(|user| {
                self.records
                    .remove_if(user, |_, record| is_idle(record.last_use, ttl))
                    .is_some()
            })
            .collect()
    }

    /// Number of users with a record.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no user has a record.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids of every tracked user.
    #[cfg(test)]
    fn users(&self) -> Vec<UserId> {
        self.records.iter().map(|r| *r.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_create_is_idempotent() {
        let table = StateTable::new();
        assert!(table.create(1));
        table.set(1, State::from("step_two"));

        assert!(!table.create(1));
        assert_eq!(table.current(1), Some(State::from("step_two")));
    }

    #[test]
    fn test_current_miss_does_not_insert() {
        let table = StateTable::new();
        assert_eq!(table.current(1), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_current_refreshes_last_use() {
        let table = StateTable::new();
        table.create(1);
        let before = table.peek(1).unwrap().last_use;

        thread::sleep(Duration::from_millis(5));
        table.current(1);

        assert!(table.peek(1).unwrap().last_use > before);
    }

    #[test]
    fn test_drain_expired() {
        let table = StateTable::new();
        table.create(1);
        table.create(2);

        thread::sleep(Duration::from_millis(40));
        table.current(2);

        let evicted = table.drain_expired(Duration::from_millis(25));
        assert_eq!(evicted, vec![1]);
        assert_eq!(table.users(), vec![2]);
    }
}
