//! Media group accumulation.
//!
//! Chat platforms deliver an album of attachments as a burst of separate
//! messages sharing a group id. A [`MediaGroup`] collects those files in
//! arrival order until the caller decides the burst is over.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Opaque descriptor of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct File {
    /// File type (e.g. "photo", "video").
    #[serde(rename = "type")]
    pub kind: String,

    /// Platform file identifier.
    pub id: String,
}

impl File {
    /// Create a file descriptor.
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

#[derive(Debug)]
struct MediaInner {
    files: Vec<File>,
    last_update: DateTime<Utc>,
}

/// Ordered list of files belonging to one media group.
///
/// Shared as `Arc<MediaGroup>`: the store keeps one instance per
/// (user, group) and appends into it in place, so a handle obtained earlier
/// observes later appends. The group carries its own lock, independent of the
/// maps that hold it.
#[derive(Debug)]
pub struct MediaGroup {
    inner: Mutex<MediaInner>,
}

impl MediaGroup {
    /// Create an empty group stamped with the current time.
    pub fn new() -> Self {
        Self::from_parts(Vec::new(), Utc::now())
    }

    /// Rebuild a group from stored parts.
    pub fn from_parts(files: Vec<File>, last_update: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(MediaInner { files, last_update }),
        }
    }

    /// Append a file and refresh the last-update time.
    pub fn push(&self, file: File) {
        let mut inner = self.inner.lock();
        inner.files.push(file);
        inner.last_update = Utc::now();
    }

    /// Copy of the files in arrival order.
    pub fn files(&self) -> Vec<File> {
        self.inner.lock().files.clone()
    }

    /// Number of files collected so far.
    pub fn len(&self) -> usize {
        self.inner.lock().files.len()
    }

    /// Check if no file has been collected.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().files.is_empty()
    }

    /// When the last file was appended.
    pub fn last_update(&self) -> DateTime<Utc> {
        self.inner.lock().last_update
    }

    /// Whether more than `quiet` has passed since the last append.
    pub fn elapsed(&self, quiet: Duration) -> bool {
        match TimeDelta::from_std(quiet) {
            Ok(quiet) => Utc::now().signed_duration_since(self.last_update()) > quiet,
            Err(_) => false,
        }
    }
}

impl Default for MediaGroup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_push_keeps_order() {
        let group = MediaGroup::new();
        group.push(File::new("photo", "a"));
        group.push(File::new("video", "b"));

        assert_eq!(
            group.files(),
            vec![File::new("photo", "a"), File::new("video", "b")]
        );
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_files_is_a_copy() {
        let group = MediaGroup::new();
        group.push(File::new("photo", "a"));

        let mut files = group.files();
        files.clear();
        files.push(File::new("photo", "injected"));

        assert_eq!(group.files(), vec![File::new("photo", "a")]);
    }

    #[test]
    fn test_push_refreshes_last_update() {
        let group = MediaGroup::new();
        let created = group.last_update();

        thread::sleep(Duration::from_millis(5));
        group.push(File::new("photo", "a"));

        assert!(group.last_update() > created);
    }

    #[test]
    fn test_elapsed() {
        let group = MediaGroup::new();
        assert!(!group.elapsed(Duration::from_secs(60)));

        thread::sleep(Duration::from_millis(20));
        assert!(group.elapsed(Duration::from_millis(10)));

        group.push(File::new("photo", "a"));
        assert!(!group.elapsed(Duration::from_millis(10)));
    }

    #[test]
    fn test_concurrent_push() {
        let group = Arc::new(MediaGroup::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let group = Arc::clone(&group);
                thread::spawn(move || {
                    for i in 0..25 {
                        group.push(File::new("photo", format!("{t}-{i}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(group.len(), 200);
    }

    #[test]
    fn test_file_serializes_type_field() {
        let json = serde_json::to_value(File::new("photo", "abc")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "photo", "id": "abc"}));
    }
}
