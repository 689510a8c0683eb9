//! Cache entries for compiled templates

use crate::types::{CacheKey, EntryId, EntryOrigin};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

/// Metadata of a source file captured when its artifact was precompiled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    /// File length in bytes
    pub length: u64,

    /// Last-modified timestamp
    pub last_modified: DateTime<Utc>,

    /// Content hash
    pub hash: Vec<u8>,

    /// Version of the algorithm that produced `hash`
    pub hash_algorithm_version: u32,
}

/// A compiled template bound to its normalized path.
///
/// Everything except the precompiled validation state is immutable after
/// construction. The validation flag only ever flips from `false` to `true`
/// and the timestamp is overwritten as a single atomic value, so concurrent
/// validators never observe a half-updated entry.
pub struct CacheEntry<A> {
    id: EntryId,
    relative_path: CacheKey,
    artifact: Arc<A>,
    created_at: DateTime<Utc>,
    precompiled: Option<PrecompiledState>,
}

struct PrecompiledState {
    length: u64,
    last_modified_micros: AtomicI64,
    hash: Vec<u8>,
    hash_algorithm_version: u32,
    associated_dependency: Option<EntryId>,
    validated: AtomicBool,
}

impl<A> CacheEntry<A> {
    /// Create an entry for an artifact compiled by this process
    pub fn runtime(relative_path: CacheKey, artifact: Arc<A>) -> Self {
        Self {
            id: EntryId::next(),
            relative_path,
            artifact,
            created_at: Utc::now(),
            precompiled: None,
        }
    }

    /// Create an entry for a precompiled artifact.
    ///
    /// `id` is allocated by the caller so that entries registered together can
    /// reference each other through `associated_dependency`.
    pub fn precompiled(
        id: EntryId,
        relative_path: CacheKey,
        artifact: Arc<A>,
        snapshot: FileSnapshot,
        associated_dependency: Option<EntryId>,
    ) -> Self {
        Self {
            id,
            relative_path,
            artifact,
            created_at: Utc::now(),
            precompiled: Some(PrecompiledState {
                length: snapshot.length,
                last_modified_micros: AtomicI64::new(snapshot.last_modified.timestamp_micros()),
                hash: snapshot.hash,
                hash_algorithm_version: snapshot.hash_algorithm_version,
                associated_dependency,
                validated: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// The compiled artifact
    pub fn artifact(&self) -> &Arc<A> {
        &self.artifact
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn origin(&self) -> EntryOrigin {
        if self.precompiled.is_some() {
            EntryOrigin::Precompiled
        } else {
            EntryOrigin::RuntimeCompiled
        }
    }

    /// Whether a precompiled entry has been checked against the live file.
    /// Always `false` for runtime entries.
    pub fn is_validated(&self) -> bool {
        self.precompiled
            .as_ref()
            .map(|state| state.validated.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Whether the entry must be revalidated before it can be served
    pub fn needs_validation(&self) -> bool {
        self.precompiled
            .as_ref()
            .map(|state| !state.validated.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Mark a precompiled entry as validated.
    ///
    /// Returns `true` if this call flipped the flag.
    pub fn mark_validated(&self) -> bool {
        match &self.precompiled {
            Some(state) => !state.validated.swap(true, Ordering::AcqRel),
            None => false,
        }
    }

    /// Recorded file length (precompiled only)
    pub fn file_length(&self) -> Option<u64> {
        self.precompiled.as_ref().map(|state| state.length)
    }

    /// Recorded last-modified timestamp (precompiled only)
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.precompiled.as_ref().and_then(|state| {
            DateTime::from_timestamp_micros(state.last_modified_micros.load(Ordering::Acquire))
        })
    }

    /// Whether `timestamp` equals the recorded timestamp, at microsecond precision
    pub fn last_modified_matches(&self, timestamp: DateTime<Utc>) -> bool {
        self.precompiled
            .as_ref()
            .map(|state| {
                state.last_modified_micros.load(Ordering::Acquire) == timestamp.timestamp_micros()
            })
            .unwrap_or(false)
    }

    /// Overwrite the recorded timestamp after a hash-based validation
    pub fn refresh_last_modified(&self, timestamp: DateTime<Utc>) {
        if let Some(state) = &self.precompiled {
            state
                .last_modified_micros
                .store(timestamp.timestamp_micros(), Ordering::Release);
        }
    }

    /// Recorded content hash (precompiled only)
    pub fn content_hash(&self) -> Option<&[u8]> {
        self.precompiled.as_ref().map(|state| state.hash.as_slice())
    }

    pub fn hash_algorithm_version(&self) -> Option<u32> {
        self.precompiled.as_ref().map(|state| state.hash_algorithm_version)
    }

    /// Entry of the nearest ancestor start file this entry was compiled against
    pub fn associated_dependency(&self) -> Option<EntryId> {
        self.precompiled
            .as_ref()
            .and_then(|state| state.associated_dependency)
    }
}

impl<A> fmt::Debug for CacheEntry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("id", &self.id)
            .field("relative_path", &self.relative_path)
            .field("origin", &self.origin())
            .field("validated", &self.is_validated())
            .field("associated_dependency", &self.associated_dependency())
            .finish()
    }
}
