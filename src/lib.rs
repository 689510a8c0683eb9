//! # template-cache
//!
//! A cache for compiled templates with dependency-aware invalidation.
//!
//! ## Features
//!
//! - Lazy compilation on first lookup, shared across threads
//! - Precompiled artifacts shipped with the application, revalidated once
//!   against the live file (length, start file, timestamp, content hash)
//! - Automatic eviction when a template or one of its ancestor start files
//!   changes
//! - Pluggable file providers (local disk with polling, in-memory)
//! - Versioned content hashing (SHA-256, XXH3-128)
//! - JSON manifests for precompiled bundles
//!
//! ## Runtime compilation
//!
//! ```rust
//! use std::sync::Arc;
//! use template_cache::{
//!     CacheConfig, CacheLookupResult, CompilationCache, CompilationResult, InMemoryFileProvider,
//! };
//!
//! let provider = Arc::new(InMemoryFileProvider::new());
//! provider.add_file("Views/Home/Index.tpl", "<h1>{{ title }}</h1>");
//!
//! let cache: CompilationCache<String> =
//!     CompilationCache::new(provider.clone(), CacheConfig::default());
//!
//! let compile = |path: &str| -> CompilationResult<String> { Ok(format!("compiled {}", path)) };
//! match cache.get_or_add("Views/Home/Index.tpl", compile) {
//!     CacheLookupResult::Found(artifact) => println!("{}", artifact),
//!     CacheLookupResult::FileNotFound => println!("no such template"),
//!     CacheLookupResult::Failed(diagnostics) => {
//!         for diagnostic in diagnostics {
//!             eprintln!("{}", diagnostic);
//!         }
//!     }
//! }
//!
//! // Editing the file evicts the entry; the next lookup recompiles
//! provider.add_file("Views/Home/Index.tpl", "<h2>{{ title }}</h2>");
//! assert!(!cache.contains("Views/Home/Index.tpl"));
//! ```
//!
//! ## Precompiled bundles
//!
//! ```no_run
//! use std::sync::Arc;
//! use template_cache::{BundleManifest, CacheConfig, CompilationCache, PhysicalFileProvider};
//!
//! fn main() -> anyhow::Result<()> {
//!     let provider = Arc::new(PhysicalFileProvider::new("./templates")?);
//!     let manifest = BundleManifest::load("./templates/views.manifest.json")?;
//!     let bundle = manifest.resolve(|type_name| Some(Arc::new(type_name.to_string())))?;
//!
//!     let config = CacheConfig::from_env()?;
//!     let cache = CompilationCache::with_precompiled(provider, config, vec![bundle]);
//!     let page = cache.get_or_add("Views/Home/Index.tpl", |path: &str| Ok(path.to_string()));
//!     println!("found: {}", page.is_found());
//!     Ok(())
//! }
//! ```

pub mod bundle;
pub mod cache;
pub mod change_token;
pub mod config;
pub mod dependency;
pub mod entry;
pub mod error;
pub mod file_provider;
pub mod hash;
pub mod path;
pub mod result;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use bundle::{BundleManifest, ManifestItem, PrecompiledBundle, PrecompiledItem};
pub use cache::CompilationCache;
pub use change_token::{ChangeCallback, ChangeToken, TriggerToken};
pub use config::{CacheConfig, CacheConfigBuilder};
pub use dependency::{DependencyResolver, DEFAULT_START_FILE_NAME};
pub use entry::{CacheEntry, FileSnapshot};
pub use error::{CacheError, Result};
pub use file_provider::{poll_for_changes, FileProvider, InMemoryFileProvider, PhysicalFileProvider};
pub use hash::{hash_content, HashAlgorithm};
pub use path::normalize_path;
pub use result::{CacheLookupResult, CompilationResult, Diagnostic, DiagnosticSeverity};
pub use store::{InvalidatingStore, PopulatedEntry};
pub use types::{CacheKey, CacheStats, EntryId, EntryOrigin};
