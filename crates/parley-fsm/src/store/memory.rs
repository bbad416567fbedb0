//! In-memory cache store partitioned by user.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{CacheStore, CacheValue, UserId};
use crate::media::{File, MediaGroup};
use crate::ttl::LastSeen;

/// Everything cached for one user.
///
/// Plain keys and media groups live in separate namespaces with separate
/// locks, so a media append never waits on key/value traffic for the same user.
#[derive(Debug, Default)]
struct UserCache {
    /// Plain key/value namespace.
    values: DashMap<String, CacheValue>,

    /// Media namespace. The mutex only covers finding or creating a group;
    /// appends go through the group's own lock.
    media: Mutex<HashMap<String, Arc<MediaGroup>>>,

    /// Refreshed on every successful access; drives cache eviction.
    last_seen: LastSeen,
}

/// Concurrent in-memory [`CacheStore`].
///
/// The top-level map is sharded by user id, so operations on unrelated users
/// never contend. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<UserId, Arc<UserCache>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users with cached data.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Check if no user has cached data.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Whether the user has a cache entry.
    pub fn contains_user(&self, user: UserId) -> bool {
        self.users.contains_key(&user)
    }

    /// Drop every user's data.
    pub fn clear(&self) {
        self.users.clear();
    }

    fn user(&self, user: UserId) -> Option<Arc<UserCache>> {
        self.users.get(&user).map(|entry| Arc::clone(entry.value()))
    }

    fn user_or_insert(&self, user: UserId) -> Arc<UserCache> {
        if let Some(cache) = self.user(user) {
            return cache;
        }
        // Shard write lock makes find-or-create atomic; no duplicate slot can
        // be published for the same user.
        Arc::clone(self.users.entry(user).or_default().value())
    }
}

impl CacheStore for MemoryStore {
    fn set(&self, user: UserId, key: &str, value: CacheValue) {
        let cache = self.user_or_insert(user);
        cache.values.insert(key.to_string(), value);
        cache.last_seen.touch();
        trace!(user_id = %user, key = %key, "Cache value set");
    }

    fn get(&self, user: UserId, key: &str) -> Option<CacheValue> {
        let cache = self.user(user)?;
        let value = cache.values.get(key).map(|v| v.value().clone())?;
        cache.last_seen.touch();
        Some(value)
    }

    fn set_media(&self, user: UserId, group_id: &str, file: File) {
        let cache = self.user_or_insert(user);
        let group = {
            let mut media = cache.media.lock();
            Arc::clone(media.entry(group_id.to_string()).or_default())
        };

        group.push(file);
        cache.last_seen.touch();
        trace!(user_id = %user, group_id = %group_id, files = group.len(), "Media file appended");
    }

    fn get_media(&self, user: UserId, group_id: &str) -> Option<Arc<MediaGroup>> {
        let cache = self.user(user)?;
        let group = cache.media.lock().get(group_id).cloned()?;
        cache.last_seen.touch();
        Some(group)
    }

    fn clean_media_cache(&self, user: UserId, group_id: &str) -> bool {
        let Some(cache) = self.user(user) else {
            return false;
        };

        let removed = cache.media.lock().remove(group_id).is_some();
        if removed {
            cache.last_seen.touch();
            trace!(user_id = %user, group_id = %group_id, "Media group removed");
        }
        removed
    }

    fn clean_cache(&self, user: UserId) {
        if self.users.remove(&user).is_some() {
            debug!(user_id = %user, "User cache cleaned");
        }
    }

    fn evict_idle(&self, ttl: Duration) -> usize {
        let idle: Vec<UserId> = self
            .users
            .iter()
            .filter(|entry| entry.value().last_seen.is_expired(ttl))
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = 0;
        for user in idle {
            // Re-checked under the shard lock: a user touched since the scan stays.
            if self
                .users
                .remove_if(&user, |_, cache| cache.last_seen.is_expired(ttl))
                .is_some()
            {
                debug!(user_id = %user, "Evicting idle user cache");
                evicted += 1;
            }
        }

        if evicted > 0 {
            debug!(count = evicted, "Evicted idle user caches");
        }

        evicted
    }
}
