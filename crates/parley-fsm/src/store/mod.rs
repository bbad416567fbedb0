//! Cache store contract and its backends.
//!
//! [`CacheStore`] decouples the state machine from where per-user data lives.
//! Every operation is total: absence is reported as `None` / `false`, and a
//! backend that can fail internally (I/O, decoding) must translate that failure
//! into absence instead of surfacing it.

use std::sync::Arc;
use std::time::Duration;

use crate::media::{File, MediaGroup};

mod flat;
mod memory;

pub use flat::{DEFAULT_NAMESPACE, FlatBackend, FlatStore};
pub use memory::MemoryStore;

/// Identifier of the user owning a state record and a cache entry.
pub type UserId = i64;

/// Value stored under a cache key.
///
/// A tagged variant, so values can be anything JSON can express and survive a
/// round trip through byte-oriented backends.
pub type CacheValue = serde_json::Value;

/// Trait for per-user cache backends.
///
/// Implementations must be safe to call concurrently for the same and for
/// different users.
pub trait CacheStore: Send + Sync {
    /// Store `value` under `key` for the user, replacing any previous value.
    fn set(&self, user: UserId, key: &str, value: CacheValue);

    /// Read the value stored under `key` for the user.
    fn get(&self, user: UserId, key: &str) -> Option<CacheValue>;

    /// Append a file to a media group, creating the group if needed.
    fn set_media(&self, user: UserId, group_id: &str, file: File);

    /// Look up a media group.
    fn get_media(&self, user: UserId, group_id: &str) -> Option<Arc<MediaGroup>>;

    /// Remove a media group. Returns whether it existed.
    fn clean_media_cache(&self, user: UserId, group_id: &str) -> bool;

    /// Remove every key and media group of the user. Idempotent.
    fn clean_cache(&self, user: UserId);

    /// Evict users whose cache has been idle for longer than `ttl`.
    ///
    /// Returns the number of users evicted. Backends that expire data on
    /// their own keep the default, which does nothing.
    fn evict_idle(&self, _ttl: Duration) -> usize {
        0
    }
}

impl<S: CacheStore + ?Sized> CacheStore for Arc<S> {
    fn set(&self, user: UserId, key: &str, value: CacheValue) {
        (**self).set(user, key, value)
    }

    fn get(&self, user: UserId, key: &str) -> Option<CacheValue> {
        (**self).get(user, key)
    }

    fn set_media(&self, user: UserId, group_id: &str, file: File) {
        (**self).set_media(user, group_id, file)
    }

    fn get_media(&self, user: UserId, group_id: &str) -> Option<Arc<MediaGroup>> {
        (**self).get_media(user, group_id)
    }

    fn clean_media_cache(&self, user: UserId, group_id: &str) -> bool {
        (**self).clean_media_cache(user, group_id)
    }

    fn clean_cache(&self, user: UserId) {
        (**self).clean_cache(user)
    }

    fn evict_idle(&self, ttl: Duration) -> usize {
        (**self).evict_idle(ttl)
    }
}
