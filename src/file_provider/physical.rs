//! File provider for templates stored under a directory on local disk
//!
//! Change detection polls file metadata. Each watched path remembers the
//! length and modification time it had when the watch was created; a poll
//! that observes anything different (including creation or deletion) fires
//! the path's token and forgets it.

use super::FileProvider;
use crate::change_token::{ChangeToken, TriggerToken};
use crate::error::{CacheError, Result};
use crate::path::{normalize_path, SEPARATOR};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileState {
    length: u64,
    modified: Option<SystemTime>,
}

#[derive(Debug)]
struct WatchedFile {
    token: Arc<TriggerToken>,
    state: Option<FileState>,
}

/// File provider rooted at a directory
#[derive(Debug)]
pub struct PhysicalFileProvider {
    root: PathBuf,
    watched: Mutex<HashMap<String, WatchedFile>>,
}

impl PhysicalFileProvider {
    /// Create a provider serving files below `root`
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let metadata = fs::metadata(&root).map_err(|e| CacheError::io(&root, e))?;
        if !metadata.is_dir() {
            return Err(CacheError::InvalidPath(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        info!("Serving templates from {}", root.display());
        Ok(Self {
            root,
            watched: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of paths with a pending change token
    pub fn watched_paths(&self) -> usize {
        self.watched.lock().len()
    }

    /// Check every watched path once and fire the tokens of changed files.
    ///
    /// Returns the number of tokens fired. File metadata is read without
    /// holding the watch lock.
    pub fn poll_changes(&self) -> usize {
        let snapshot: Vec<(String, Option<FileState>, Arc<TriggerToken>)> = self
            .watched
            .lock()
            .iter()
            .map(|(path, watched)| (path.clone(), watched.state, watched.token.clone()))
            .collect();

        let changed: Vec<(String, Arc<TriggerToken>)> = snapshot
            .into_iter()
            .filter(|(path, state, _)| self.state_of(path) != *state)
            .map(|(path, _, token)| (path, token))
            .collect();

        if changed.is_empty() {
            return 0;
        }

        {
            let mut watched = self.watched.lock();
            for (path, token) in &changed {
                let same_token = watched
                    .get(path)
                    .map(|w| Arc::ptr_eq(&w.token, token))
                    .unwrap_or(false);
                if same_token {
                    watched.remove(path);
                }
            }
        }

        let mut fired = 0;
        for (path, token) in changed {
            if token.fire() {
                debug!("Change detected for file: {}", path);
                fired += 1;
            }
        }
        fired
    }

    fn full_path(&self, path: &str) -> Result<PathBuf> {
        let normalized = normalize_path(path);
        let mut full = self.root.clone();
        for segment in normalized.split(SEPARATOR).filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." || segment.contains(':') {
                return Err(CacheError::InvalidPath(path.to_string()));
            }
            full.push(segment);
        }
        Ok(full)
    }

    fn metadata(&self, path: &str) -> Result<fs::Metadata> {
        let full = self.full_path(path)?;
        match fs::metadata(&full) {
            Ok(metadata) if metadata.is_file() => Ok(metadata),
            Ok(_) => Err(CacheError::FileNotFound(path.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(CacheError::FileNotFound(path.to_string()))
            }
            Err(e) => Err(CacheError::io(full, e)),
        }
    }

    fn state_of(&self, path: &str) -> Option<FileState> {
        self.metadata(path).ok().map(|metadata| FileState {
            length: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

impl FileProvider for PhysicalFileProvider {
    fn exists(&self, path: &str) -> bool {
        self.metadata(path).is_ok()
    }

    fn length(&self, path: &str) -> Result<u64> {
        Ok(self.metadata(path)?.len())
    }

    fn last_modified(&self, path: &str) -> Result<DateTime<Utc>> {
        let full = self.full_path(path)?;
        let modified = self
            .metadata(path)?
            .modified()
            .map_err(|e| CacheError::io(full, e))?;
        Ok(DateTime::<Utc>::from(modified))
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.full_path(path)?;
        fs::read(&full).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CacheError::FileNotFound(path.to_string()),
            _ => CacheError::io(full, e),
        })
    }

    fn watch(&self, path: &str) -> Arc<dyn ChangeToken> {
        let key = normalize_path(path).into_owned();
        if let Some(existing) = self.watched.lock().get(&key) {
            return existing.token.clone();
        }

        // Metadata is read unlocked; a concurrent watcher may have won meanwhile
        let state = self.state_of(&key);
        self.watched
            .lock()
            .entry(key)
            .or_insert_with(|| WatchedFile {
                token: Arc::new(TriggerToken::new()),
                state,
            })
            .token
            .clone()
    }
}

/// Background task polling a physical provider for file changes.
///
/// Runs until the surrounding task is aborted; spawn it with
/// `tokio::spawn(poll_for_changes(provider, interval))`.
pub async fn poll_for_changes(provider: Arc<PhysicalFileProvider>, interval: Duration) {
    info!(
        "Starting file change polling for {} (interval: {:?})",
        provider.root().display(),
        interval
    );

    loop {
        tokio::time::sleep(interval).await;

        let poller = provider.clone();
        match tokio::task::spawn_blocking(move || poller.poll_changes()).await {
            Ok(fired) => {
                if fired > 0 {
                    debug!("File change poll: {} tokens fired", fired);
                }
            }
            Err(e) => {
                warn!("File change poll failed: {}", e);
            }
        }
    }
}
