//! Core type definitions for the template cache

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache key type - a normalized relative path
pub type CacheKey = String;

/// Identity of a cache entry.
///
/// Every entry gets a fresh id when it is created, so two entries for the
/// same path compare unequal once one has replaced the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(u64);

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

impl EntryId {
    /// Allocate a new, process-unique id
    pub fn next() -> Self {
        EntryId(NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a cached artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOrigin {
    /// Compiled ahead of time and shipped with the application
    Precompiled,

    /// Compiled on first use by this process
    RuntimeCompiled,
}

impl fmt::Display for EntryOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryOrigin::Precompiled => write!(f, "precompiled"),
            EntryOrigin::RuntimeCompiled => write!(f, "runtime_compiled"),
        }
    }
}

/// Statistics snapshot for cache monitoring
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from a cached entry
    pub hits: u64,

    /// Lookups that found no entry for the key
    pub misses: u64,

    /// Successful compile invocations
    pub compilations: u64,

    /// Compile invocations that returned diagnostics
    pub compilation_failures: u64,

    /// Precompiled entries confirmed unchanged
    pub validations: u64,

    /// Validations that needed a content hash comparison
    pub hash_validations: u64,

    /// Precompiled entries replaced because their source drifted
    pub drift_recompilations: u64,

    /// Entries removed by change notifications
    pub evictions: u64,

    /// Lookups for files that do not exist
    pub files_not_found: u64,

    /// Number of entries currently in the cache
    pub entries: usize,
}

impl CacheStats {
    /// Cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Miss rate as a percentage
    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }

    /// Total compile invocations, successful or not
    pub fn total_compilations(&self) -> u64 {
        self.compilations + self.compilation_failures
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, entries: {}, \
             compilations: {}, failures: {}, evictions: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.entries,
            self.compilations,
            self.compilation_failures,
            self.evictions
        )
    }
}

/// Live counters behind [`CacheStats`]
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub compilations: AtomicU64,
    pub compilation_failures: AtomicU64,
    pub validations: AtomicU64,
    pub hash_validations: AtomicU64,
    pub drift_recompilations: AtomicU64,
    pub files_not_found: AtomicU64,
}

impl StatsCounters {
    pub fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Evictions are counted by the store, so they are passed in
    pub fn snapshot(&self, entries: usize, evictions: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            compilations: self.compilations.load(Ordering::Relaxed),
            compilation_failures: self.compilation_failures.load(Ordering::Relaxed),
            validations: self.validations.load(Ordering::Relaxed),
            hash_validations: self.hash_validations.load(Ordering::Relaxed),
            drift_recompilations: self.drift_recompilations.load(Ordering::Relaxed),
            evictions,
            files_not_found: self.files_not_found.load(Ordering::Relaxed),
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_ids_are_unique() {
        let a = EntryId::next();
        let b = EntryId::next();
        assert_ne!(a, b);
        assert!(b > a);
        assert_eq!(format!("{}", a), format!("#{}", a.as_u64()));
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };

        assert_eq!(stats.hit_rate(), 80.0);
        assert_eq!(stats.miss_rate(), 20.0);
    }

    #[test]
    fn test_cache_stats_zero_requests() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.miss_rate(), 100.0);
    }

    #[test]
    fn test_cache_stats_display() {
        let stats = CacheStats {
            hits: 100,
            misses: 50,
            compilations: 40,
            compilation_failures: 10,
            entries: 40,
            ..Default::default()
        };

        let display = format!("{}", stats);
        assert!(display.contains("hits: 100"));
        assert!(display.contains("misses: 50"));
        assert!(display.contains("failures: 10"));
        assert!(display.contains("hit_rate: 66.67%, entries: 40, compilations: 40, failures: 10"));
        assert_eq!(stats.total_compilations(), 50);
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = StatsCounters::default();
        StatsCounters::increment(&counters.hits);
        StatsCounters::increment(&counters.hits);
        StatsCounters::increment(&counters.files_not_found);

        let stats = counters.snapshot(3, 1);
        assert_eq!(stats.files_not_found, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.entries, 3);
    }

    #[test]
    fn test_entry_origin_display() {
        assert_eq!(format!("{}", EntryOrigin::Precompiled), "precompiled");
        assert_eq!(format!("{}", EntryOrigin::RuntimeCompiled), "runtime_compiled");
    }
}
