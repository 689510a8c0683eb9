//! Template Cache Demo Application
//!
//! Compiles templates from a temporary directory, precompiles a bundle,
//! edits files on disk and shows the cache reacting to the changes.
//!
//! Usage:
//!   cargo run --example template_cache_demo
//!
//! Environment variables (also read from `.env`):
//!   TEMPLATE_CACHE_START_FILE             - start file name (default: _start.tpl)
//!   TEMPLATE_CACHE_WATCH_ALL_DEPENDENCIES - watch missing start files too (default: false)
//!   TEMPLATE_CACHE_POLL_INTERVAL_MS       - file change poll interval (default: 2000)
//!   RUST_LOG                              - log filter (default: info)

use std::fs;
use std::sync::Arc;
use std::time::Duration;
use template_cache::{
    poll_for_changes, BundleManifest, CacheConfig, CacheLookupResult, CompilationCache,
    CompilationResult, Diagnostic, HashAlgorithm, PhysicalFileProvider, PrecompiledBundle,
    PrecompiledItem,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Stand-in compiler: upper-cases the template and rejects unbalanced braces
fn compile(root: &std::path::Path, path: &str) -> CompilationResult<String> {
    let source = fs::read_to_string(root.join(path))
        .map_err(|e| vec![Diagnostic::error(path, e.to_string())])?;

    if source.matches("{{").count() != source.matches("}}").count() {
        return Err(vec![Diagnostic::error(path, "unbalanced braces").at(1, 1)]);
    }
    Ok(source.to_uppercase())
}

fn show(label: &str, result: &CacheLookupResult<String>) {
    match result {
        CacheLookupResult::Found(artifact) => info!("{}: {}", label, artifact.trim()),
        CacheLookupResult::FileNotFound => info!("{}: file not found", label),
        CacheLookupResult::Failed(diagnostics) => {
            for diagnostic in diagnostics {
                warn!("{}: {}", label, diagnostic);
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== Template Cache Demo ===");

    let config = CacheConfig::from_env()?;
    let dir = tempfile::tempdir()?;
    let root = dir.path().to_path_buf();

    fs::create_dir_all(root.join("Views/Home"))?;
    fs::write(root.join("_start.tpl"), "layout: main")?;
    fs::write(root.join("Views/Home/Index.tpl"), "<h1>{{ title }}</h1>")?;
    fs::write(root.join("Views/Home/About.tpl"), "<p>about</p>")?;

    let provider = Arc::new(PhysicalFileProvider::new(&root)?);
    let poller = tokio::spawn(poll_for_changes(provider.clone(), config.poll_interval));

    info!("\n--- Precompiling bundle ---");
    let mut bundle = PrecompiledBundle::new("views");
    for path in ["_start.tpl", "Views/Home/Index.tpl"] {
        let artifact = compile(&root, path).map_err(|d| anyhow::anyhow!("{:?}", d))?;
        bundle.push(PrecompiledItem::snapshot(
            &*provider,
            path,
            path.replace('/', "_"),
            Arc::new(artifact),
            HashAlgorithm::Xxh3_128,
        )?);
    }
    let manifest = BundleManifest::from_bundle(&bundle);
    info!("Manifest:\n{}", manifest.to_json_string()?);

    let cache = CompilationCache::with_precompiled(provider.clone(), config.clone(), vec![bundle]);
    let compile_at = |path: &str| compile(&root, path);

    info!("\n--- Lookups ---");
    show("Index (precompiled)", &cache.get_or_add("Views/Home/Index.tpl", compile_at));
    show("About (runtime)", &cache.get_or_add("Views/Home/About.tpl", compile_at));
    show("Missing", &cache.get_or_add("Views/Home/Missing.tpl", compile_at));
    info!("{}", cache.stats());

    info!("\n--- Editing the start file ---");
    fs::write(root.join("_start.tpl"), "layout: alternate")?;
    provider.poll_changes();
    info!(
        "Index cached: {}, About cached: {}",
        cache.contains("Views/Home/Index.tpl"),
        cache.contains("Views/Home/About.tpl")
    );
    show("Index (recompiled)", &cache.get_or_add("Views/Home/Index.tpl", compile_at));

    info!("\n--- Breaking a template ---");
    fs::write(root.join("Views/Home/About.tpl"), "<p>{{ broken </p>")?;
    tokio::time::sleep(config.poll_interval + Duration::from_millis(100)).await;
    show("About", &cache.get_or_add("Views/Home/About.tpl", compile_at));

    info!("{}", cache.stats());
    poller.abort();
    Ok(())
}
