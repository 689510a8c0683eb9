//! File system abstraction used by the cache
//!
//! The cache never touches the disk directly. It asks a [`FileProvider`] for
//! existence, length, timestamps and content hashes, and subscribes to change
//! notifications through [`FileProvider::watch`].
//!
//! Two providers ship with the crate:
//! - [`PhysicalFileProvider`]: files under a root directory, with polling
//!   change detection
//! - [`InMemoryFileProvider`]: files held in memory, for tests and embedding

pub mod memory;
pub mod physical;

pub use memory::InMemoryFileProvider;
pub use physical::{poll_for_changes, PhysicalFileProvider};

use crate::change_token::ChangeToken;
use crate::error::Result;
use crate::hash::hash_content;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Read access and change notifications for template source files.
///
/// Paths are normalized relative paths using `/` as separator.
pub trait FileProvider: Send + Sync {
    /// Whether a file exists at `path`
    fn exists(&self, path: &str) -> bool;

    /// File length in bytes
    fn length(&self, path: &str) -> Result<u64>;

    /// Last-modified timestamp
    fn last_modified(&self, path: &str) -> Result<DateTime<Utc>>;

    /// Full file content
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Content hash computed with the algorithm registered under
    /// `algorithm_version`
    fn content_hash(&self, path: &str, algorithm_version: u32) -> Result<Vec<u8>> {
        hash_content(algorithm_version, &self.read(path)?)
    }

    /// Subscribe to the next change of `path`.
    ///
    /// The token fires once, when the file is created, modified or deleted.
    /// Watching a file that does not exist yet is allowed.
    fn watch(&self, path: &str) -> Arc<dyn ChangeToken>;
}
