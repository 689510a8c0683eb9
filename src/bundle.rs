//! Precompiled artifact bundles
//!
//! A bundle is the set of templates compiled ahead of time and shipped with
//! the application. Each item carries the artifact plus a snapshot of the
//! source file it was compiled from, which the cache later compares against
//! the live file.
//!
//! Bundles are usually described by a JSON manifest written by build tooling:
//!
//! ```json
//! {
//!   "name": "views",
//!   "items": [
//!     {
//!       "relative_path": "Views/Home/Index.tpl",
//!       "type_name": "Views_Home_Index",
//!       "file_length": 512,
//!       "last_modified": "2024-03-01T12:00:00Z",
//!       "hash": "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
//!       "hash_algorithm_version": 1
//!     }
//!   ]
//! }
//! ```
//!
//! [`BundleManifest::resolve`] binds every `type_name` to a concrete artifact.

use crate::entry::FileSnapshot;
use crate::error::{CacheError, Result};
use crate::file_provider::FileProvider;
use crate::hash::HashAlgorithm;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// One precompiled template
#[derive(Debug)]
pub struct PrecompiledItem<A> {
    /// Path of the source file, relative to the provider root
    pub relative_path: String,

    /// Name of the generated artifact type
    pub type_name: String,

    /// Source file metadata at precompilation time
    pub snapshot: FileSnapshot,

    pub artifact: Arc<A>,
}

impl<A> Clone for PrecompiledItem<A> {
    fn clone(&self) -> Self {
        Self {
            relative_path: self.relative_path.clone(),
            type_name: self.type_name.clone(),
            snapshot: self.snapshot.clone(),
            artifact: self.artifact.clone(),
        }
    }
}

impl<A> PrecompiledItem<A> {
    pub fn new(
        relative_path: impl Into<String>,
        type_name: impl Into<String>,
        snapshot: FileSnapshot,
        artifact: Arc<A>,
    ) -> Self {
        Self {
            relative_path: relative_path.into(),
            type_name: type_name.into(),
            snapshot,
            artifact,
        }
    }

    /// Build an item from the current state of `path` in `provider`
    pub fn snapshot(
        provider: &dyn FileProvider,
        path: &str,
        type_name: impl Into<String>,
        artifact: Arc<A>,
        algorithm: HashAlgorithm,
    ) -> Result<Self> {
        let snapshot = FileSnapshot {
            length: provider.length(path)?,
            last_modified: provider.last_modified(path)?,
            hash: provider.content_hash(path, algorithm.version())?,
            hash_algorithm_version: algorithm.version(),
        };
        Ok(Self::new(path, type_name, snapshot, artifact))
    }
}

/// A named collection of precompiled items
#[derive(Debug)]
pub struct PrecompiledBundle<A> {
    pub name: String,
    pub items: Vec<PrecompiledItem<A>>,
}

impl<A> PrecompiledBundle<A> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    /// Add an item, builder style
    pub fn with_item(mut self, item: PrecompiledItem<A>) -> Self {
        self.items.push(item);
        self
    }

    pub fn push(&mut self, item: PrecompiledItem<A>) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Serialized description of a precompiled item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestItem {
    pub relative_path: String,
    pub type_name: String,
    pub file_length: u64,
    /// RFC 3339 timestamp
    pub last_modified: DateTime<Utc>,
    /// Hex-encoded content hash
    pub hash: String,
    pub hash_algorithm_version: u32,
}

impl ManifestItem {
    /// Decode the recorded file metadata
    pub fn file_snapshot(&self) -> Result<FileSnapshot> {
        let hash = hex::decode(self.hash.trim()).map_err(|e| {
            CacheError::InvalidHash(format!("{}: {}", self.relative_path, e))
        })?;

        Ok(FileSnapshot {
            length: self.file_length,
            last_modified: self.last_modified,
            hash,
            hash_algorithm_version: self.hash_algorithm_version,
        })
    }
}

impl<A> From<&PrecompiledItem<A>> for ManifestItem {
    fn from(item: &PrecompiledItem<A>) -> Self {
        Self {
            relative_path: item.relative_path.clone(),
            type_name: item.type_name.clone(),
            file_length: item.snapshot.length,
            last_modified: item.snapshot.last_modified,
            hash: hex::encode(&item.snapshot.hash),
            hash_algorithm_version: item.snapshot.hash_algorithm_version,
        }
    }
}

/// JSON form of a [`PrecompiledBundle`], without artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub name: String,
    #[serde(default)]
    pub items: Vec<ManifestItem>,
}

impl BundleManifest {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a manifest file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| CacheError::io(path, e))?;
        let manifest = Self::from_json_str(&json)?;
        debug!(
            "Loaded bundle manifest '{}' with {} items from {}",
            manifest.name,
            manifest.items.len(),
            path.display()
        );
        Ok(manifest)
    }

    /// Describe an existing bundle
    pub fn from_bundle<A>(bundle: &PrecompiledBundle<A>) -> Self {
        Self {
            name: bundle.name.clone(),
            items: bundle.items.iter().map(ManifestItem::from).collect(),
        }
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Bind every item to an artifact.
    ///
    /// `resolver` maps a type name to its artifact. Fails on the first item
    /// whose type cannot be resolved or whose hash is not valid hex.
    pub fn resolve<A>(
        &self,
        mut resolver: impl FnMut(&str) -> Option<Arc<A>>,
    ) -> Result<PrecompiledBundle<A>> {
        let mut bundle = PrecompiledBundle::new(self.name.clone());

        for item in &self.items {
            let snapshot = item.file_snapshot()?;
            let artifact =
                resolver(item.type_name.as_str()).ok_or_else(|| CacheError::ArtifactNotResolved {
                    relative_path: item.relative_path.clone(),
                    type_name: item.type_name.clone(),
                })?;
            bundle.push(PrecompiledItem::new(
                item.relative_path.clone(),
                item.type_name.clone(),
                snapshot,
                artifact,
            ));
        }

        Ok(bundle)
    }
}
