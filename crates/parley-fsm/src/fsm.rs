//! The state machine facade.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::config::FsmConfig;
use crate::error::{Error, Result};
use crate::media::{File, MediaGroup};
use crate::reaper::ReaperHandle;
use crate::scope::UserScope;
use crate::state::State;
use crate::store::{CacheStore, CacheValue, MemoryStore, UserId};
use crate::table::StateTable;

/// Per-user finite-state machine with a transient cache.
///
/// Owns the state table, the cache store and the reapers that evict idle
/// users. Reapers stop when [`shutdown`](Fsm::shutdown) is called or the `Fsm`
/// is dropped. Share an instance with `Arc<Fsm>`.
///
/// Transitioning a user into [`State::DEFAULT`] wipes the user's cache.
pub struct Fsm {
    states: Arc<StateTable>,
    store: Arc<dyn CacheStore>,
    config: FsmConfig,
    reapers: Vec<ReaperHandle>,
}

impl Fsm {
    /// Create a state machine backed by a [`MemoryStore`].
    ///
    /// Must be called inside a Tokio runtime if either reaper is enabled.
    pub fn new(config: FsmConfig) -> Result<Self> {
        Self::with_store(config, MemoryStore::new())
    }

    /// Create a state machine backed by a custom cache store.
    pub fn with_store<S: CacheStore + 'static>(config: FsmConfig, store: S) -> Result<Self> {
        let states = Arc::new(StateTable::new());
        let store: Arc<dyn CacheStore> = Arc::new(store);
        let mut reapers = Vec::new();

        if let Some((ttl, interval)) = config.state_reaper() {
            let states = Arc::clone(&states);
            let store = Arc::clone(&store);
            let cascade = config.cascade_eviction;
            reapers.extend(ReaperHandle::spawn("state", interval, move || {
                sweep_states(&states, store.as_ref(), ttl, cascade)
            })?);
        }

        if let Some((ttl, interval)) = config.cache_reaper() {
            let store = Arc::clone(&store);
            reapers.extend(ReaperHandle::spawn("cache", interval, move || {
                store.evict_idle(ttl)
            })?);
        }

        debug!(
            state_reaper = config.state_reaper().is_some(),
            cache_reaper = config.cache_reaper().is_some(),
            "FSM created"
        );

        Ok(Self {
            states,
            store,
            config,
            reapers,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &FsmConfig {
        &self.config
    }

    /// Get the cache store.
    pub fn store(&self) -> &dyn CacheStore {
        self.store.as_ref()
    }

    /// Give the user the default state unless they already have one.
    pub fn create(&self, user: UserId) {
        if self.states.create(user) {
            trace!(user_id = %user, "State created");
        }
    }

    /// Move the user into `state`.
    ///
    /// The record is written even if the user was never created. Moving into
    /// [`State::DEFAULT`] also clears the user's cache.
    pub fn transition(&self, user: UserId, state: impl Into<State>) {
        let state = state.into();
        let reset = state.is_default();
        trace!(user_id = %user, state = %state, "State transition");
        self.states.set(user, state);

        if reset {
            self.store.clean_cache(user);
        }
    }

    /// Return the user to the default state, clearing the cache.
    pub fn finish(&self, user: UserId) {
        self.transition(user, State::DEFAULT);
    }

    /// The user's current state, if any. Refreshes the state's idle timer.
    pub fn current_state(&self, user: UserId) -> Option<State> {
        self.states.current(user)
    }

    /// Like [`current_state`](Fsm::current_state), reporting a missing state
    /// as [`State::NIL`].
    pub fn current_state_or_nil(&self, user: UserId) -> State {
        self.current_state(user).unwrap_or(State::NIL)
    }

    /// Whether the user's state passes a filter of allowed states.
    ///
    /// An empty filter or one containing [`State::ANY`] always passes. Otherwise
    /// a user without a state never passes.
    pub fn is_in(&self, user: UserId, allowed: &[State]) -> bool {
        if allowed.is_empty() || allowed.contains(&State::ANY) {
            return true;
        }
        self.current_state(user)
            .is_some_and(|state| state.matches(allowed))
    }

    /// Bind a user id for a sequence of calls.
    pub fn user(&self, user: UserId) -> UserScope<'_> {
        UserScope::new(self, user)
    }

    /// Cache a value for the user under `key`.
    pub fn set(&self, user: UserId, key: &str, value: impl Into<CacheValue>) {
        self.store.set(user, key, value.into());
    }

    /// Read a cached value.
    pub fn get(&self, user: UserId, key: &str) -> Option<CacheValue> {
        self.store.get(user, key)
    }

    /// Cache any serializable value.
    pub fn set_as<T: Serialize + ?Sized>(&self, user: UserId, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.store.set(user, key, value);
        Ok(())
    }

    /// Read a cached value as `T`.
    ///
    /// Returns `Ok(None)` when the key is absent and
    /// [`Error::TypeMismatch`] when the stored value is not a `T`.
    pub fn get_as<T: DeserializeOwned>(&self, user: UserId, key: &str) -> Result<Option<T>> {
        let Some(value) = self.store.get(user, key) else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|source| Error::TypeMismatch {
                key: key.to_string(),
                expected: std::any::type_name::<T>(),
                source,
            })
    }

    /// Append a file to one of the user's media groups.
    pub fn set_media(&self, user: UserId, group_id: &str, file: File) {
        self.store.set_media(user, group_id, file);
    }

    /// Look up one of the user's media groups.
    pub fn get_media(&self, user: UserId, group_id: &str) -> Option<Arc<MediaGroup>> {
        self.store.get_media(user, group_id)
    }

    /// Drop a media group. Returns whether it existed.
    pub fn clean_media_cache(&self, user: UserId, group_id: &str) -> bool {
        self.store.clean_media_cache(user, group_id)
    }

    /// Remove all cached data for the user without touching their state.
    pub fn clean_cache(&self, user: UserId) {
        self.store.clean_cache(user);
    }

    /// Run one state sweep now, returning how many users were evicted.
    ///
    /// Does nothing when state eviction is disabled.
    pub fn sweep_states(&self) -> usize {
        match self.config.effective_state_ttl() {
            Some(ttl) => sweep_states(
                &self.states,
                self.store.as_ref(),
                ttl,
                self.config.cascade_eviction,
            ),
            None => 0,
        }
    }

    /// Run one cache sweep now, returning how many users were evicted.
    ///
    /// Does nothing when cache eviction is disabled.
    pub fn sweep_cache(&self) -> usize {
        self.config
            .effective_cache_ttl()
            .map_or(0, |ttl| self.store.evict_idle(ttl))
    }

    /// Number of users with a state record.
    pub fn tracked_users(&self) -> usize {
        self.states.len()
    }

    /// Names of the reapers currently attached.
    pub fn reapers(&self) -> Vec<&'static str> {
        self.reapers.iter().map(ReaperHandle::name).collect()
    }

    /// Stop all reapers. Idempotent.
    pub fn shutdown(&self) {
        for reaper in &self.reapers {
            reaper.cancel();
        }
    }
}

impl std::fmt::Debug for Fsm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fsm")
            .field("tracked_users", &self.states.len())
            .field("config", &self.config)
            .field("reapers", &self.reapers)
            .finish_non_exhaustive()
    }
}

/// Evict idle state records, purging the cache of each evicted user when
/// `cascade` is set. The cache is never consulted to evict states.
fn sweep_states(
    states: &StateTable,
    store: &dyn CacheStore,
    ttl: std::time::Duration,
    cascade: bool,
) -> usize {
    let evicted = states.drain_expired(ttl);
    for &user in &evicted {
        debug!(user_id = %user, "Evicting idle state");
        if cascade {
            store.clean_cache(user);
        }
    }
    evicted.len()
}
