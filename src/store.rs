//! Concurrent entry store with change-driven eviction
//!
//! Entries live in a sharded concurrent map. Each insertion may come with a
//! set of change tokens; when any of them fires, the entry is evicted. The
//! eviction callback holds only a weak reference to the map, and tokens are
//! registered after the shard lock is released, so eviction never runs
//! inside an insertion.

use crate::change_token::ChangeToken;
use crate::entry::CacheEntry;
use crate::types::{CacheKey, EntryId, StatsCounters};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

type EntryMap<A> = DashMap<CacheKey, Arc<CacheEntry<A>>>;

/// An entry ready for insertion plus the tokens that expire it
pub struct PopulatedEntry<A> {
    pub entry: Arc<CacheEntry<A>>,
    pub expiration_tokens: Vec<Arc<dyn ChangeToken>>,
}

impl<A> PopulatedEntry<A> {
    pub fn new(entry: Arc<CacheEntry<A>>, expiration_tokens: Vec<Arc<dyn ChangeToken>>) -> Self {
        Self {
            entry,
            expiration_tokens,
        }
    }
}

/// Key → entry map whose entries are evicted by change notifications
pub struct InvalidatingStore<A> {
    entries: Arc<EntryMap<A>>,
    evictions: Arc<AtomicU64>,
}

impl<A> Default for InvalidatingStore<A>
where
    A: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A> InvalidatingStore<A>
where
    A: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            evictions: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current entry for `key`. Never blocks on I/O.
    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry<A>>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Return the entry for `key`, populating it if absent.
    ///
    /// `populate` runs without any lock held, so concurrent callers for the
    /// same key may each run it. The first insertion wins; later results are
    /// dropped (their tokens are never registered) and every caller gets the
    /// winning entry. A populate error is returned as-is and nothing is stored.
    pub fn get_or_add<E>(
        &self,
        key: &str,
        populate: impl FnOnce() -> Result<PopulatedEntry<A>, E>,
    ) -> Result<Arc<CacheEntry<A>>, E> {
        if let Some(existing) = self.get(key) {
            return Ok(existing);
        }

        let populated = populate()?;
        let candidate = populated.entry.clone();

        let (winner, inserted) = match self.entries.entry(key.to_string()) {
            Entry::Occupied(occupied) => (occupied.get().clone(), false),
            Entry::Vacant(vacant) => {
                vacant.insert(candidate.clone());
                (candidate, true)
            }
        };

        if inserted {
            self.register_expiration(key, &winner, populated.expiration_tokens);
        } else {
            debug!(
                "Discarding entry {} for {}: lost insertion race to {}",
                populated.entry.id(),
                key,
                winner.id()
            );
        }

        Ok(winner)
    }

    /// Insert or replace the entry for `key`
    pub fn set(&self, key: &str, populated: PopulatedEntry<A>) -> Arc<CacheEntry<A>> {
        let entry = populated.entry;
        if let Some(previous) = self.entries.insert(key.to_string(), entry.clone()) {
            debug!("Replaced entry {} for {} with {}", previous.id(), key, entry.id());
        }
        self.register_expiration(key, &entry, populated.expiration_tokens);
        entry
    }

    /// Replace the entry for `key` only if it is still entry `stale`.
    ///
    /// If another writer already replaced `stale`, the candidate is dropped
    /// (its tokens are never registered) and the current entry is returned.
    /// A vacant key is populated as in [`get_or_add`](Self::get_or_add).
    pub fn replace_if(
        &self,
        key: &str,
        stale: EntryId,
        populated: PopulatedEntry<A>,
    ) -> Arc<CacheEntry<A>> {
        let candidate = populated.entry.clone();

        let (current, inserted) = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().id() == stale => {
                occupied.insert(candidate.clone());
                (candidate, true)
            }
            Entry::Occupied(occupied) => (occupied.get().clone(), false),
            Entry::Vacant(vacant) => {
                vacant.insert(candidate.clone());
                (candidate, true)
            }
        };

        if inserted {
            debug!("Replaced entry {} for {} with {}", stale, key, current.id());
            self.register_expiration(key, &current, populated.expiration_tokens);
        } else {
            debug!(
                "Discarding entry {} for {}: {} already replaced by {}",
                populated.entry.id(),
                key,
                stale,
                current.id()
            );
        }

        current
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries evicted by change notifications so far
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    fn register_expiration(
        &self,
        key: &str,
        entry: &Arc<CacheEntry<A>>,
        tokens: Vec<Arc<dyn ChangeToken>>,
    ) {
        for token in tokens {
            let entries = Arc::downgrade(&self.entries);
            let evictions = self.evictions.clone();
            let key = key.to_string();
            let id = entry.id();
            token.register_callback(Box::new(move || {
                evict(&entries, &key, id, &evictions);
            }));
        }
    }
}

/// Remove `key` if it still maps to entry `id`.
///
/// A token belonging to an entry that has since been replaced must not evict
/// the replacement.
fn evict<A>(entries: &Weak<EntryMap<A>>, key: &str, id: EntryId, evictions: &AtomicU64) {
    let Some(entries) = entries.upgrade() else {
        return;
    };

    if entries.remove_if(key, |_, entry| entry.id() == id).is_some() {
        StatsCounters::increment(evictions);
        debug!("Evicted cache entry {} for {}", id, key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_token::TriggerToken;
    use std::convert::Infallible;

    fn runtime_entry(key: &str, value: u32) -> Arc<CacheEntry<u32>> {
        Arc::new(CacheEntry::runtime(key.to_string(), Arc::new(value)))
    }

    fn populated(key: &str, value: u32, tokens: &[Arc<TriggerToken>]) -> PopulatedEntry<u32> {
        PopulatedEntry::new(
            runtime_entry(key, value),
            tokens
                .iter()
                .map(|t| t.clone() as Arc<dyn ChangeToken>)
                .collect(),
        )
    }

    #[test]
    fn test_get_or_add_populates_once() {
        let store = InvalidatingStore::new();
        let mut calls = 0;

        let first = store
            .get_or_add("a.tpl", || {
                calls += 1;
                Ok::<_, Infallible>(populated("a.tpl", 1, &[]))
            })
            .unwrap();
        let second = store
            .get_or_add("a.tpl", || {
                calls += 1;
                Ok::<_, Infallible>(populated("a.tpl", 2, &[]))
            })
            .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(first.id(), second.id());
        assert_eq!(**second.artifact(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_populate_error_stores_nothing() {
        let store: InvalidatingStore<u32> = InvalidatingStore::new();
        let result = store.get_or_add("a.tpl", || Err("compile failed"));
        assert_eq!(result.unwrap_err(), "compile failed");
        assert!(store.get("a.tpl").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_losing_populate_returns_winner() {
        let store = InvalidatingStore::new();
        let loser_token = Arc::new(TriggerToken::new());

        // Another writer inserts while our populate runs
        let result = store
            .get_or_add("a.tpl", || {
                store.set("a.tpl", populated("a.tpl", 1, &[]));
                Ok::<_, Infallible>(populated("a.tpl", 2, &[loser_token.clone()]))
            })
            .unwrap();

        assert_eq!(**result.artifact(), 1);
        assert_eq!(loser_token.pending_callbacks(), 0);
    }

    #[test]
    fn test_token_fire_evicts() {
        let store = InvalidatingStore::new();
        let token = Arc::new(TriggerToken::new());
        store.set("a.tpl", populated("a.tpl", 1, &[token.clone()]));
        assert!(store.contains_key("a.tpl"));

        token.fire();
        assert!(!store.contains_key("a.tpl"));
        assert_eq!(store.evictions(), 1);
    }

    #[test]
    fn test_any_token_evicts() {
        let store = InvalidatingStore::new();
        let own = Arc::new(TriggerToken::new());
        let dependency = Arc::new(TriggerToken::new());
        store.set("a.tpl", populated("a.tpl", 1, &[own.clone(), dependency.clone()]));

        dependency.fire();
        assert!(store.get("a.tpl").is_none());

        own.fire();
        assert_eq!(store.evictions(), 1);
    }

    #[test]
    fn test_already_fired_token_evicts_on_registration() {
        let store = InvalidatingStore::new();
        let token = Arc::new(TriggerToken::new());
        token.fire();

        let entry = store.set("a.tpl", populated("a.tpl", 1, &[token]));
        assert_eq!(**entry.artifact(), 1);
        assert!(store.get("a.tpl").is_none());
    }

    #[test]
    fn test_stale_token_does_not_evict_replacement() {
        let store = InvalidatingStore::new();
        let old_token = Arc::new(TriggerToken::new());
        store.set("a.tpl", populated("a.tpl", 1, &[old_token.clone()]));
        let replacement = store.set("a.tpl", populated("a.tpl", 2, &[]));

        old_token.fire();
        let current = store.get("a.tpl").unwrap();
        assert_eq!(current.id(), replacement.id());
        assert_eq!(store.evictions(), 0);
    }

    #[test]
    fn test_replace_if_current_replaces() {
        let store = InvalidatingStore::new();
        let stale = store.set("a.tpl", populated("a.tpl", 1, &[]));
        let token = Arc::new(TriggerToken::new());

        let replacement = populated("a.tpl", 2, &[token.clone()]);
        let current = store.replace_if("a.tpl", stale.id(), replacement);
        assert_eq!(**current.artifact(), 2);
        assert_eq!(store.get("a.tpl").unwrap().id(), current.id());
        assert_eq!(token.pending_callbacks(), 1);
    }

    #[test]
    fn test_replace_if_already_replaced_keeps_current() {
        let store = InvalidatingStore::new();
        let stale = store.set("a.tpl", populated("a.tpl", 1, &[]));
        let first = store.replace_if("a.tpl", stale.id(), populated("a.tpl", 2, &[]));

        // A second validator of the same stale entry loses
        let late_token = Arc::new(TriggerToken::new());
        let second =
            store.replace_if("a.tpl", stale.id(), populated("a.tpl", 3, &[late_token.clone()]));

        assert_eq!(second.id(), first.id());
        assert_eq!(**second.artifact(), 2);
        assert_eq!(late_token.pending_callbacks(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_replace_if_vacant_inserts() {
        let store = InvalidatingStore::new();
        let token = Arc::new(TriggerToken::new());
        store.set("a.tpl", populated("a.tpl", 1, &[token.clone()]));
        let stale = store.get("a.tpl").unwrap().id();
        token.fire();
        assert!(store.is_empty());

        let current = store.replace_if("a.tpl", stale, populated("a.tpl", 2, &[]));
        assert_eq!(**current.artifact(), 2);
        assert!(store.contains_key("a.tpl"));
    }

    #[test]
    fn test_eviction_after_store_dropped() {
        let token = Arc::new(TriggerToken::new());
        {
            let store = InvalidatingStore::new();
            store.set("a.tpl", populated("a.tpl", 1, &[token.clone()]));
        }
        assert!(token.fire());
    }
}
