//! Compilation cache orchestrating lookups, revalidation and recompilation
//!
//! Lookup flow for a normalized path:
//!
//! - no entry: check the file exists, compile it, store the result
//! - runtime entry or validated precompiled entry: return it, no I/O
//! - precompiled entry not validated yet: compare the live file against the
//!   snapshot recorded at precompilation time, cheapest check first, and
//!   either mark the entry validated or replace it with a fresh compilation

use crate::bundle::PrecompiledBundle;
use crate::change_token::ChangeToken;
use crate::config::CacheConfig;
use crate::dependency::DependencyResolver;
use crate::entry::CacheEntry;
use crate::file_provider::FileProvider;
use crate::path::normalize_path;
use crate::result::{CacheLookupResult, CompilationResult, Diagnostic};
use crate::store::{InvalidatingStore, PopulatedEntry};
use crate::types::{CacheStats, EntryId, StatsCounters};
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of an internal lookup
enum Lookup<A> {
    NotFound,
    Entry(Arc<CacheEntry<A>>),
    Failed(Vec<Diagnostic>),
}

/// Nearest existing ancestor start file of a template
enum DependencyProbe {
    None,
    Entry(EntryId),
    Failed,
}

/// Cache of compiled templates keyed by relative path.
///
/// Safe to share between threads; wrap it in an `Arc`. Compile functions run
/// on the calling thread with no cache lock held, so concurrent first lookups
/// of the same path may each compile. Only the first result is kept.
pub struct CompilationCache<A> {
    provider: Arc<dyn FileProvider>,
    config: CacheConfig,
    resolver: DependencyResolver,
    store: InvalidatingStore<A>,
    stats: StatsCounters,
}

impl<A> CompilationCache<A>
where
    A: Send + Sync + 'static,
{
    /// Create an empty cache reading files through `provider`
    pub fn new(provider: Arc<dyn FileProvider>, config: CacheConfig) -> Self {
        info!("Initializing compilation cache with config: {:?}", config);

        Self {
            provider,
            resolver: DependencyResolver::new(config.start_file_name.clone()),
            config,
            store: InvalidatingStore::new(),
            stats: StatsCounters::default(),
        }
    }

    /// Create a cache seeded with precompiled artifacts.
    ///
    /// The first item registered for a normalized path wins; later duplicates
    /// are skipped. Each entry is associated with its nearest ancestor start
    /// file that is itself precompiled, and expires when its own file or one
    /// of those start files changes.
    pub fn with_precompiled(
        provider: Arc<dyn FileProvider>,
        config: CacheConfig,
        bundles: impl IntoIterator<Item = PrecompiledBundle<A>>,
    ) -> Self {
        let cache = Self::new(provider, config);

        let mut ids: HashMap<String, EntryId> = HashMap::new();
        let mut pending = Vec::new();
        let mut bundle_count = 0;

        for bundle in bundles {
            bundle_count += 1;
            for item in bundle.items {
                let key = normalize_path(&item.relative_path).into_owned();
                if ids.contains_key(&key) {
                    warn!(
                        "Skipping duplicate precompiled template {} ({}) from bundle '{}'",
                        key, item.type_name, bundle.name
                    );
                    continue;
                }
                let id = EntryId::next();
                ids.insert(key.clone(), id);
                pending.push((key, id, item));
            }
        }

        let registered = pending.len();
        for (key, id, item) in pending {
            let locations = cache.resolver.locations_for(&key);
            let associated = locations
                .iter()
                .find_map(|location| ids.get(location).copied());

            let mut tokens = vec![cache.provider.watch(&key)];
            for location in &locations {
                if cache.config.watch_all_dependency_locations || ids.contains_key(location) {
                    tokens.push(cache.provider.watch(location));
                }
            }

            let entry = Arc::new(CacheEntry::precompiled(
                id,
                key.clone(),
                item.artifact,
                item.snapshot,
                associated,
            ));
            cache.store.set(&key, PopulatedEntry::new(entry, tokens));
        }

        info!(
            "Registered {} precompiled templates from {} bundles",
            registered, bundle_count
        );
        cache
    }

    /// Return the compiled artifact for `relative_path`.
    ///
    /// `compile` receives the normalized path and is only called when no
    /// usable entry exists. It may also be called for ancestor start files
    /// while a precompiled entry is revalidated.
    pub fn get_or_add<F>(&self, relative_path: &str, compile: F) -> CacheLookupResult<A>
    where
        F: Fn(&str) -> CompilationResult<A>,
    {
        let key = normalize_path(relative_path);
        match self.lookup(&key, &compile) {
            Lookup::NotFound => CacheLookupResult::FileNotFound,
            Lookup::Entry(entry) => CacheLookupResult::Found(entry.artifact().clone()),
            Lookup::Failed(diagnostics) => CacheLookupResult::Failed(diagnostics),
        }
    }

    /// Current entry for `relative_path`, without validating it
    pub fn entry(&self, relative_path: &str) -> Option<Arc<CacheEntry<A>>> {
        self.store.get(&normalize_path(relative_path))
    }

    /// Whether an entry exists for `relative_path`
    pub fn contains(&self, relative_path: &str) -> bool {
        self.store.contains_key(&normalize_path(relative_path))
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.store.len(), self.store.evictions())
    }

    fn record(&self, counter: &AtomicU64) {
        if self.config.enable_metrics {
            StatsCounters::increment(counter);
        }
    }

    fn lookup<F>(&self, key: &str, compile: &F) -> Lookup<A>
    where
        F: Fn(&str) -> CompilationResult<A>,
    {
        match self.store.get(key) {
            Some(entry) => {
                self.record(&self.stats.hits);
                if entry.needs_validation() {
                    self.revalidate(key, entry, compile)
                } else {
                    debug!("Cache hit: {}", key);
                    Lookup::Entry(entry)
                }
            }
            None => {
                self.record(&self.stats.misses);
                debug!("Cache miss: {}", key);
                self.on_miss(key, compile)
            }
        }
    }

    fn on_miss<F>(&self, key: &str, compile: &F) -> Lookup<A>
    where
        F: Fn(&str) -> CompilationResult<A>,
    {
        if !self.provider.exists(key) {
            self.record(&self.stats.files_not_found);
            debug!("Template file not found: {}", key);
            return Lookup::NotFound;
        }

        match self.store.get_or_add(key, || self.populate(key, compile)) {
            Ok(entry) => Lookup::Entry(entry),
            Err(diagnostics) => Lookup::Failed(diagnostics),
        }
    }

    /// Check an unvalidated precompiled entry against the live file
    fn revalidate<F>(&self, key: &str, entry: Arc<CacheEntry<A>>, compile: &F) -> Lookup<A>
    where
        F: Fn(&str) -> CompilationResult<A>,
    {
        if !self.provider.exists(key) {
            self.record(&self.stats.files_not_found);
            debug!("Precompiled template no longer exists: {}", key);
            return Lookup::NotFound;
        }

        match self.provider.length(key) {
            Ok(length) if Some(length) == entry.file_length() => {}
            Ok(length) => {
                debug!(
                    "Length of {} changed ({:?} -> {}), recompiling",
                    key,
                    entry.file_length(),
                    length
                );
                return self.recompile(key, entry.id(), compile);
            }
            Err(e) => {
                warn!("Failed to read length of {}: {}", key, e);
                return self.recompile(key, entry.id(), compile);
            }
        }

        let current_dependency = match self.resolve_dependency(key, compile) {
            DependencyProbe::None => None,
            DependencyProbe::Entry(id) => Some(id),
            DependencyProbe::Failed => {
                debug!("Start file of {} failed to compile, recompiling", key);
                return self.recompile(key, entry.id(), compile);
            }
        };
        if current_dependency != entry.associated_dependency() {
            debug!(
                "Start file of {} changed ({:?} -> {:?}), recompiling",
                key,
                entry.associated_dependency(),
                current_dependency
            );
            return self.recompile(key, entry.id(), compile);
        }

        let last_modified = match self.provider.last_modified(key) {
            Ok(timestamp) => timestamp,
            Err(e) => {
                warn!("Failed to read timestamp of {}: {}", key, e);
                return self.recompile(key, entry.id(), compile);
            }
        };
        if entry.last_modified_matches(last_modified) {
            self.mark_validated(&entry, false);
            return Lookup::Entry(entry);
        }

        let (Some(recorded), Some(version)) = (entry.content_hash(), entry.hash_algorithm_version())
        else {
            return self.recompile(key, entry.id(), compile);
        };
        match self.provider.content_hash(key, version) {
            Ok(current) if current.as_slice() == recorded => {
                entry.refresh_last_modified(last_modified);
                self.mark_validated(&entry, true);
                Lookup::Entry(entry)
            }
            Ok(_) => {
                debug!("Content of {} changed, recompiling", key);
                self.recompile(key, entry.id(), compile)
            }
            Err(e) => {
                warn!("Failed to hash {}: {}", key, e);
                self.recompile(key, entry.id(), compile)
            }
        }
    }

    /// Nearest ancestor start file that exists, looked up through the cache
    fn resolve_dependency<F>(&self, key: &str, compile: &F) -> DependencyProbe
    where
        F: Fn(&str) -> CompilationResult<A>,
    {
        for location in self.resolver.locations_for(key) {
            match self.lookup(&location, compile) {
                Lookup::NotFound => continue,
                Lookup::Entry(entry) => return DependencyProbe::Entry(entry.id()),
                Lookup::Failed(_) => return DependencyProbe::Failed,
            }
        }
        DependencyProbe::None
    }

    fn mark_validated(&self, entry: &CacheEntry<A>, by_hash: bool) {
        if entry.mark_validated() {
            self.record(&self.stats.validations);
            if by_hash {
                self.record(&self.stats.hash_validations);
            }
            debug!(
                "Validated precompiled template {}{}",
                entry.relative_path(),
                if by_hash { " by content hash" } else { "" }
            );
        }
    }

    /// Compile `key` and replace entry `stale` with the result.
    ///
    /// Concurrent callers that saw the same stale entry all get whichever
    /// replacement was stored first.
    fn recompile<F>(&self, key: &str, stale: EntryId, compile: &F) -> Lookup<A>
    where
        F: Fn(&str) -> CompilationResult<A>,
    {
        self.record(&self.stats.drift_recompilations);
        match self.populate(key, compile) {
            Ok(populated) => Lookup::Entry(self.store.replace_if(key, stale, populated)),
            Err(diagnostics) => Lookup::Failed(diagnostics),
        }
    }

    /// Compile `key` into a runtime entry.
    ///
    /// Change tokens are taken before compiling so that edits made while the
    /// compiler runs still expire the result.
    fn populate<F>(&self, key: &str, compile: &F) -> Result<PopulatedEntry<A>, Vec<Diagnostic>>
    where
        F: Fn(&str) -> CompilationResult<A>,
    {
        let tokens = self.expiration_tokens(key);

        match compile(key) {
            Ok(artifact) => {
                self.record(&self.stats.compilations);
                let entry = Arc::new(CacheEntry::runtime(key.to_string(), Arc::new(artifact)));
                debug!("Compiled {} as entry {}", key, entry.id());
                Ok(PopulatedEntry::new(entry, tokens))
            }
            Err(diagnostics) => {
                self.record(&self.stats.compilation_failures);
                warn!(
                    "Compilation of {} failed with {} diagnostics",
                    key,
                    diagnostics.len()
                );
                Err(diagnostics)
            }
        }
    }

    /// The file itself plus the start-file locations worth watching
    fn expiration_tokens(&self, key: &str) -> Vec<Arc<dyn ChangeToken>> {
        let mut tokens = vec![self.provider.watch(key)];
        for location in self.resolver.locations_for(key) {
            if self.config.watch_all_dependency_locations || self.store.contains_key(&location) {
                tokens.push(self.provider.watch(&location));
            }
        }
        tokens
    }
}
