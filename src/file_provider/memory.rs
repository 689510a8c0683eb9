//! In-memory file provider

use super::FileProvider;
use crate::change_token::{ChangeToken, TriggerToken};
use crate::error::{CacheError, Result};
use crate::path::normalize_path;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
struct MemoryFile {
    content: Vec<u8>,
    last_modified: DateTime<Utc>,
}

/// File provider backed by an in-memory map.
///
/// Every mutation fires the pending change token for the affected path, the
/// same way a file system watcher would.
#[derive(Debug, Default)]
pub struct InMemoryFileProvider {
    files: RwLock<HashMap<String, MemoryFile>>,
    watchers: Mutex<HashMap<String, Arc<TriggerToken>>>,
    file_system_reads: AtomicU64,
}

impl InMemoryFileProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file, stamped with the current time
    pub fn add_file(&self, path: &str, content: impl Into<Vec<u8>>) {
        self.add_file_with_timestamp(path, content, Utc::now());
    }

    /// Add or replace a file with an explicit last-modified timestamp
    pub fn add_file_with_timestamp(
        &self,
        path: &str,
        content: impl Into<Vec<u8>>,
        last_modified: DateTime<Utc>,
    ) {
        let key = normalize_path(path).into_owned();
        self.files.write().insert(
            key.clone(),
            MemoryFile {
                content: content.into(),
                last_modified,
            },
        );
        self.notify(&key);
    }

    /// Change a file's timestamp without touching its content
    pub fn set_last_modified(&self, path: &str, last_modified: DateTime<Utc>) -> Result<()> {
        let key = normalize_path(path).into_owned();
        {
            let mut files = self.files.write();
            let file = files
                .get_mut(&key)
                .ok_or_else(|| CacheError::FileNotFound(key.clone()))?;
            file.last_modified = last_modified;
        }
        self.notify(&key);
        Ok(())
    }

    /// Delete a file. Returns `false` if it did not exist.
    pub fn remove_file(&self, path: &str) -> bool {
        let key = normalize_path(path).into_owned();
        let removed = self.files.write().remove(&key).is_some();
        if removed {
            self.notify(&key);
        }
        removed
    }

    /// Fire the pending change token for `path` without changing the file.
    /// Returns `false` if nobody was watching.
    pub fn notify(&self, path: &str) -> bool {
        let key = normalize_path(path);
        let token = self.watchers.lock().remove(key.as_ref());
        match token {
            Some(token) => {
                debug!("Change detected for in-memory file: {}", key);
                token.fire()
            }
            None => false,
        }
    }

    /// Number of metadata and content reads served so far
    pub fn file_system_reads(&self) -> u64 {
        self.file_system_reads.load(Ordering::Relaxed)
    }

    /// Number of paths with a pending change token
    pub fn watched_paths(&self) -> usize {
        self.watchers.lock().len()
    }

    fn with_file<T>(&self, path: &str, f: impl FnOnce(&MemoryFile) -> T) -> Result<T> {
        self.file_system_reads.fetch_add(1, Ordering::Relaxed);
        let key = normalize_path(path);
        let files = self.files.read();
        files
            .get(key.as_ref())
            .map(f)
            .ok_or_else(|| CacheError::FileNotFound(key.into_owned()))
    }
}

impl FileProvider for InMemoryFileProvider {
    fn exists(&self, path: &str) -> bool {
        self.with_file(path, |_| ()).is_ok()
    }

    fn length(&self, path: &str) -> Result<u64> {
        self.with_file(path, |file| file.content.len() as u64)
    }

    fn last_modified(&self, path: &str) -> Result<DateTime<Utc>> {
        self.with_file(path, |file| file.last_modified)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.with_file(path, |file| file.content.clone())
    }

    fn watch(&self, path: &str) -> Arc<dyn ChangeToken> {
        let key = normalize_path(path).into_owned();
        let token = self
            .watchers
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(TriggerToken::new()))
            .clone();
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashAlgorithm;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_file_metadata() {
        let provider = InMemoryFileProvider::new();
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        provider.add_file_with_timestamp("/Views/Index.tpl", "<h1>Hi</h1>", timestamp);

        assert!(provider.exists("Views/Index.tpl"));
        assert!(!provider.exists("Views/Missing.tpl"));
        assert_eq!(provider.length("Views/Index.tpl").unwrap(), 11);
        assert_eq!(provider.last_modified("Views\\Index.tpl").unwrap(), timestamp);
        assert_eq!(provider.read("Views/Index.tpl").unwrap(), b"<h1>Hi</h1>".to_vec());
        assert!(matches!(
            provider.length("Views/Missing.tpl"),
            Err(CacheError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_content_hash_uses_requested_version() {
        let provider = InMemoryFileProvider::new();
        provider.add_file("a.tpl", "content");

        let sha = provider.content_hash("a.tpl", 1).unwrap();
        assert_eq!(sha, HashAlgorithm::Sha256.digest(b"content"));
        let xxh = provider.content_hash("a.tpl", 2).unwrap();
        assert_eq!(xxh, HashAlgorithm::Xxh3_128.digest(b"content"));
        assert!(provider.content_hash("a.tpl", 99).is_err());
    }

    #[test]
    fn test_watch_fires_on_mutation() {
        let provider = InMemoryFileProvider::new();
        provider.add_file("a.tpl", "one");

        let fired = Arc::new(AtomicUsize::new(0));
        let token = provider.watch("a.tpl");
        let counter = fired.clone();
        token.register_callback(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        provider.add_file("a.tpl", "two");
        assert!(token.has_changed());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Fired tokens are not re-armed
        provider.add_file("a.tpl", "three");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!provider.watch("a.tpl").has_changed());
    }

    #[test]
    fn test_watch_shares_token_per_path() {
        let provider = InMemoryFileProvider::new();
        let a = provider.watch("a.tpl");
        let b = provider.watch("/a.tpl");
        provider.watch("b.tpl");
        assert_eq!(provider.watched_paths(), 2);

        assert!(!provider.remove_file("a.tpl"));
        provider.add_file("a.tpl", "x");
        assert!(a.has_changed());
        assert!(b.has_changed());
    }

    #[test]
    fn test_remove_and_touch() {
        let provider = InMemoryFileProvider::new();
        provider.add_file("a.tpl", "x");

        let token = provider.watch("a.tpl");
        provider
            .set_last_modified("a.tpl", Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
            .unwrap();
        assert!(token.has_changed());

        let token = provider.watch("a.tpl");
        assert!(provider.remove_file("a.tpl"));
        assert!(token.has_changed());
        assert!(!provider.exists("a.tpl"));
        assert!(provider.set_last_modified("a.tpl", Utc::now()).is_err());
    }

    #[test]
    fn test_reads_are_counted() {
        let provider = InMemoryFileProvider::new();
        provider.add_file("a.tpl", "x");
        let before = provider.file_system_reads();
        provider.exists("a.tpl");
        provider.length("a.tpl").unwrap();
        assert_eq!(provider.file_system_reads(), before + 2);
    }
}
