//! Error types for template cache operations
//!
//! Lookups through [`CompilationCache`](crate::CompilationCache) never fail with
//! these errors: missing files and compiler diagnostics are ordinary result
//! variants. `CacheError` covers the collaborators around the cache (file
//! providers, bundle manifests, configuration).

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for template cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// I/O error while reading file metadata or content
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The requested file does not exist in the provider
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// The path cannot be mapped inside the provider root
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// No hash algorithm is registered under this version
    #[error("Unsupported hash algorithm version: {0}")]
    UnsupportedHashAlgorithm(u32),

    /// Bundle manifest could not be parsed
    #[error("Manifest parse error: {0}")]
    ManifestParse(String),

    /// A recorded hash is not valid hex text
    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    /// A manifest record names an artifact type the resolver does not know
    #[error("Artifact type '{type_name}' for '{relative_path}' could not be resolved")]
    ArtifactNotResolved {
        relative_path: String,
        type_name: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for template cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl CacheError {
    /// Wrap an I/O error with the path that produced it
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::ManifestParse(e.to_string())
    }
}

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Other(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Other(s.to_string())
    }
}
