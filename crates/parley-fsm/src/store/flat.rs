//! Cache store over a flat, byte-oriented key/value backend.
//!
//! Remote stores (Redis, memcached, a database table) only need to provide the
//! four primitives of [`FlatBackend`]. [`FlatStore`] lays the per-user cache
//! out over them with composite keys:
//!
//! ```text
//! <namespace>:<user_id>:kv:<key>
//! <namespace>:<user_id>:media:<group_id>
//! <namespace>:<user_id>:seen
//! ```
//!
//! Values and media groups are stored as JSON. The `seen` key holds the
//! user's last successful access and drives [`evict_idle`](CacheStore::evict_idle).
//! There are no cross-key transactions: concurrent appends to the same media
//! group may lose a file.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::{CacheStore, CacheValue, UserId};
use crate::error::Result;
use crate::media::{File, MediaGroup};

/// Default key namespace.
pub const DEFAULT_NAMESPACE: &str = "user";

/// Minimal byte-oriented key/value primitive.
pub trait FlatBackend: Send + Sync {
    /// Read a key.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a key, replacing any previous value.
    fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Delete keys. Returns how many existed.
    fn delete(&self, keys: &[String]) -> Result<usize>;

    /// List every key starting with `prefix`.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Stored shape of a media group.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredMedia {
    files: Vec<File>,
    last_update: Option<DateTime<Utc>>,
}

/// [`CacheStore`] that maps the per-user cache onto a [`FlatBackend`].
///
/// Backend and decoding failures are logged and reported as absence. Each
/// successful access stamps the user's `seen` key; users without one are never
/// evicted. Eviction is not atomic with a concurrent access.
/// [`get_media`](CacheStore::get_media) returns a fresh snapshot on every
/// call rather than a shared accumulator.
#[derive(Debug)]
pub struct FlatStore<B> {
    backend: B,
    namespace: String,
}

impl<B: FlatBackend> FlatStore<B> {
    /// Create a store using the default namespace.
    pub fn new(backend: B) -> Self {
        Self::with_namespace(backend, DEFAULT_NAMESPACE)
    }

    /// Create a store whose keys all start with `namespace`.
    pub fn with_namespace(backend: B, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
        }
    }

    /// Get the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Key holding a plain value.
    pub fn value_key(&self, user: UserId, key: &str) -> String {
        format!("{}:{}:kv:{}", self.namespace, user, key)
    }

    /// Key holding a media group.
    pub fn media_key(&self, user: UserId, group_id: &str) -> String {
        format!("{}:{}:media:{}", self.namespace, user, group_id)
    }

    /// Key holding the user's last access time.
    pub fn seen_key(&self, user: UserId) -> String {
        format!("{}:{}:seen", self.namespace, user)
    }

    /// Prefix shared by every key of a user.
    pub fn user_prefix(&self, user: UserId) -> String {
        format!("{}:{}:", self.namespace, user)
    }

    fn touch(&self, user: UserId) {
        let key = self.seen_key(user);
        match serde_json::to_vec(&Utc::now()) {
            Ok(bytes) => {
                self.ok_or_warn(self.backend.set(&key, bytes), &key);
            }
            Err(e) => warn!(key = %key, error = %e, "Failed to encode access time"),
        }
    }

    /// Parse a `seen` key back into its user id.
    fn seen_user(&self, key: &str) -> Option<UserId> {
        let rest = key.strip_prefix(self.namespace.as_str())?.strip_prefix(':')?;
        match rest.split_once(':')? {
            (user, "seen") => user.parse().ok(),
            _ => None,
        }
    }

    fn last_seen(&self, key: &str) -> Option<DateTime<Utc>> {
        let bytes = self.ok_or_warn(self.backend.get(key), key)??;
        match serde_json::from_slice(&bytes) {
            Ok(at) => Some(at),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable access time");
                None
            }
        }
    }

    fn load_media(&self, key: &str) -> Option<StoredMedia> {
        let bytes = self.ok_or_warn(self.backend.get(key), key)??;
        match serde_json::from_slice(&bytes) {
            Ok(media) => Some(media),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable media group");
                None
            }
        }
    }

    fn ok_or_warn<T>(&self, result: Result<T>, key: &str) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Cache backend call failed");
                None
            }
        }
    }
}

impl<B: FlatBackend> CacheStore for FlatStore<B> {
    fn set(&self, user: UserId, key: &str, value: CacheValue) {
        let key = self.value_key(user, key);
        match serde_json::to_vec(&value) {
            Ok(bytes) => {
                if self.ok_or_warn(self.backend.set(&key, bytes), &key).is_some() {
                    self.touch(user);
                }
            }
            Err(e) => warn!(key = %key, error = %e, "Failed to encode cache value"),
        }
    }

    fn get(&self, user: UserId, key: &str) -> Option<CacheValue> {
        let key = self.value_key(user, key);
        let bytes = self.ok_or_warn(self.backend.get(&key), &key)??;
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                self.touch(user);
                Some(value)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable cache value");
                None
            }
        }
    }

    fn set_media(&self, user: UserId, group_id: &str, file: File) {
        let key = self.media_key(user, group_id);
        let mut media = self.load_media(&key).unwrap_or_default();
        media.files.push(file);
        media.last_update = Some(Utc::now());

        match serde_json::to_vec(&media) {
            Ok(bytes) => {
                if self.ok_or_warn(self.backend.set(&key, bytes), &key).is_some() {
                    self.touch(user);
                    trace!(key = %key, files = media.files.len(), "Media file appended");
                }
            }
            Err(e) => warn!(key = %key, error = %e, "Failed to encode media group"),
        }
    }

    fn get_media(&self, user: UserId, group_id: &str) -> Option<Arc<MediaGroup>> {
        let key = self.media_key(user, group_id);
        let media = self.load_media(&key)?;
        self.touch(user);
        let last_update = media.last_update.unwrap_or_else(Utc::now);
        Some(Arc::new(MediaGroup::from_parts(media.files, last_update)))
    }

    fn clean_media_cache(&self, user: UserId, group_id: &str) -> bool {
        let key = self.media_key(user, group_id);
        let removed = self
            .ok_or_warn(self.backend.delete(std::slice::from_ref(&key)), &key)
            .is_some_and(|removed| removed > 0);
        if removed {
            self.touch(user);
        }
        removed
    }

    fn clean_cache(&self, user: UserId) {
        let prefix = self.user_prefix(user);
        let Some(keys) = self.ok_or_warn(self.backend.scan_prefix(&prefix), &prefix) else {
            return;
        };
        if !keys.is_empty() {
            self.ok_or_warn(self.backend.delete(&keys), &prefix);
        }
    }

    fn evict_idle(&self, ttl: Duration) -> usize {
        let Ok(ttl) = TimeDelta::from_std(ttl) else {
            return 0;
        };
        let prefix = format!("{}:", self.namespace);
        let Some(keys) = self.ok_or_warn(self.backend.scan_prefix(&prefix), &prefix) else {
            return 0;
        };

        let now = Utc::now();
        let mut evicted = 0;
        for key in keys {
            let Some(user) = self.seen_user(&key) else {
                continue;
            };
            let Some(at) = self.last_seen(&key) else {
                continue;
            };
            if now.signed_duration_since(at) > ttl {
                debug!(user_id = %user, "Evicting idle user cache");
                self.clean_cache(user);
                evicted += 1;
            }
        }

        if evicted > 0 {
            debug!(count = evicted, "Evicted idle user caches");
        }

        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct MapBackend {
        entries: Mutex<BTreeMap<String, Vec<u8>>>,
    }

    impl FlatBackend for MapBackend {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.entries.lock().get(key).cloned())
        }

        fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
            self.entries.lock().insert(key.to_string(), value);
            Ok(())
        }

        fn delete(&self, keys: &[String]) -> Result<usize> {
            let mut entries = self.entries.lock();
            Ok(keys.iter().filter(|k| entries.remove(*k).is_some()).count())
        }

        fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
            Ok(self
                .entries
                .lock()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }
    }

    struct DownBackend;

    impl FlatBackend for DownBackend {
        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(Error::Backend("connection refused".into()))
        }

        fn set(&self, _key: &str, _value: Vec<u8>) -> Result<()> {
            Err(Error::Backend("connection refused".into()))
        }

        fn delete(&self, _keys: &[String]) -> Result<usize> {
            Err(Error::Backend("connection refused".into()))
        }

        fn scan_prefix(&self, _prefix: &str) -> Result<Vec<String>> {
            Err(Error::Backend("connection refused".into()))
        }
    }

    #[test]
    fn test_key_layout() {
        let store = FlatStore::with_namespace(MapBackend::default(), "bot");
        assert_eq!(store.value_key(42, "caption"), "bot:42:kv:caption");
        assert_eq!(store.media_key(42, "g1"), "bot:42:media:g1");
        assert_eq!(store.user_prefix(42), "bot:42:");
        assert_eq!(store.seen_key(42), "bot:42:seen");
    }

    #[test]
    fn test_values() {
        let store = FlatStore::new(MapBackend::default());
        store.set(1, "caption", json!({"text": "hello"}));

        assert_eq!(store.get(1, "caption"), Some(json!({"text": "hello"})));
        assert_eq!(store.get(1, "missing"), None);
        assert_eq!(store.get(2, "caption"), None);
    }

    #[test]
    fn test_media_accumulates() {
        let store = FlatStore::new(MapBackend::default());
        store.set_media(1, "album", File::new("photo", "f1"));
        store.set_media(1, "album", File::new("video", "f2"));

        let group = store.get_media(1, "album").unwrap();
        assert_eq!(
            group.files(),
            vec![File::new("photo", "f1"), File::new("video", "f2")]
        );
        assert!(store.get_media(1, "other").is_none());
    }

    #[test]
    fn test_clean_media_cache() {
        let store = FlatStore::new(MapBackend::default());
        store.set_media(1, "album", File::new("photo", "f1"));

        assert!(store.clean_media_cache(1, "album"));
        assert!(!store.clean_media_cache(1, "album"));
    }

    #[test]
    fn test_clean_cache_is_scoped_to_user() {
        let store = FlatStore::new(MapBackend::default());
        store.set(1, "a", json!(1));
        store.set_media(1, "album", File::new("photo", "f1"));
        store.set(12, "a", json!(12));

        store.clean_cache(1);

        assert_eq!(store.get(1, "a"), None);
        assert!(store.get_media(1, "album").is_none());
        // "user:1:" must not match "user:12:"
        assert_eq!(store.get(12, "a"), Some(json!(12)));
    }

    #[test]
    fn test_undecodable_value_is_absent() {
        let store = FlatStore::new(MapBackend::default());
        store
            .backend()
            .set("user:1:kv:broken", b"not json".to_vec())
            .unwrap();
        store
            .backend()
            .set("user:1:media:broken", b"{".to_vec())
            .unwrap();

        assert_eq!(store.get(1, "broken"), None);
        assert!(store.get_media(1, "broken").is_none());
    }

    #[test]
    fn test_backend_failure_reads_as_absent() {
        let store = FlatStore::new(DownBackend);

        store.set(1, "a", json!(1));
        store.set_media(1, "album", File::new("photo", "f1"));
        assert_eq!(store.get(1, "a"), None);
        assert!(store.get_media(1, "album").is_none());
        assert!(!store.clean_media_cache(1, "album"));
        store.clean_cache(1);
        assert_eq!(store.evict_idle(Duration::from_millis(1)), 0);
    }

    #[test]
    fn test_evict_idle() {
        let store = FlatStore::new(MapBackend::default());
        store.set(1, "a", json!(1));
        store.set_media(1, "album", File::new("photo", "f1"));
        store.set(2, "b", json!(2));

        std::thread::sleep(Duration::from_millis(40));
        // Touch user 2 so only user 1 is idle
        assert!(store.get(2, "b").is_some());

        assert_eq!(store.evict_idle(Duration::from_millis(25)), 1);
        assert_eq!(store.get(1, "a"), None);
        assert!(store.get_media(1, "album").is_none());
        assert_eq!(store.get(2, "b"), Some(json!(2)));
        assert!(store.backend().get("user:1:seen").unwrap().is_none());
    }

    #[test]
    fn test_evict_idle_ignores_value_named_seen() {
        let store = FlatStore::with_namespace(MapBackend::default(), "bot");
        store.set(7, "seen", json!("not a timestamp"));

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(store.evict_idle(Duration::from_millis(5)), 1);
        assert_eq!(store.get(7, "seen"), None);
    }

    #[test]
    fn test_failed_reads_do_not_stamp_access() {
        let store = FlatStore::new(MapBackend::default());
        store.set(1, "a", json!(1));

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(store.get(1, "missing"), None);
        assert!(store.get_media(1, "missing").is_none());
        assert!(!store.clean_media_cache(1, "missing"));

        assert_eq!(store.evict_idle(Duration::from_millis(25)), 1);
    }

    #[test]
    fn test_users_without_stamp_are_kept() {
        let store = FlatStore::new(MapBackend::default());
        store
            .backend()
            .set("user:3:kv:legacy", serde_json::to_vec(&json!(3)).unwrap())
            .unwrap();

        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(store.evict_idle(Duration::from_millis(1)), 0);
        assert!(store.backend().get("user:3:kv:legacy").unwrap().is_some());
    }
}
