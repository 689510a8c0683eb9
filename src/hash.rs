//! Versioned content hashing for deployment drift detection
//!
//! Precompiled bundles record which algorithm produced their hashes, so the
//! same algorithm can be used when the live file is hashed again.

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Content hash algorithm, identified by its version number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum HashAlgorithm {
    /// Version 1: SHA-256, 32 bytes
    Sha256,
    /// Version 2: XXH3-128, 16 bytes
    Xxh3_128,
}

impl HashAlgorithm {
    /// Algorithm used when no version is specified
    pub const DEFAULT: HashAlgorithm = HashAlgorithm::Sha256;

    /// Look up an algorithm by version number
    pub fn from_version(version: u32) -> Result<Self> {
        match version {
            1 => Ok(HashAlgorithm::Sha256),
            2 => Ok(HashAlgorithm::Xxh3_128),
            other => Err(CacheError::UnsupportedHashAlgorithm(other)),
        }
    }

    /// Version number recorded alongside hashes
    pub fn version(self) -> u32 {
        match self {
            HashAlgorithm::Sha256 => 1,
            HashAlgorithm::Xxh3_128 => 2,
        }
    }

    /// Hash `content`
    pub fn digest(self, content: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => Sha256::digest(content).to_vec(),
            HashAlgorithm::Xxh3_128 => xxhash_rust::xxh3::xxh3_128(content)
                .to_le_bytes()
                .to_vec(),
        }
    }
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for HashAlgorithm {
    type Error = CacheError;

    fn try_from(version: u32) -> Result<Self> {
        Self::from_version(version)
    }
}

impl From<HashAlgorithm> for u32 {
    fn from(algorithm: HashAlgorithm) -> Self {
        algorithm.version()
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Sha256 => write!(f, "sha256"),
            HashAlgorithm::Xxh3_128 => write!(f, "xxh3-128"),
        }
    }
}

/// Hash `content` with the algorithm registered under `version`
pub fn hash_content(version: u32, content: &[u8]) -> Result<Vec<u8>> {
    Ok(HashAlgorithm::from_version(version)?.digest(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_round_trip() {
        for algorithm in [HashAlgorithm::Sha256, HashAlgorithm::Xxh3_128] {
            assert_eq!(HashAlgorithm::from_version(algorithm.version()).unwrap(), algorithm);
        }
    }

    #[test]
    fn test_unknown_version() {
        let error = HashAlgorithm::from_version(7).unwrap_err();
        assert!(matches!(error, CacheError::UnsupportedHashAlgorithm(7)));
        assert!(hash_content(0, b"content").is_err());
    }

    #[test]
    fn test_digest_lengths() {
        assert_eq!(HashAlgorithm::Sha256.digest(b"content").len(), 32);
        assert_eq!(HashAlgorithm::Xxh3_128.digest(b"content").len(), 16);
    }

    #[test]
    fn test_sha256_known_value() {
        let digest = HashAlgorithm::Sha256.digest(b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_algorithms_differ() {
        let a = hash_content(1, b"<h1>Hello</h1>").unwrap();
        let b = hash_content(2, b"<h1>Hello</h1>").unwrap();
        assert_ne!(a, b);
        assert_eq!(a, hash_content(1, b"<h1>Hello</h1>").unwrap());
        assert_ne!(a, hash_content(1, b"<h1>Hello!</h1>").unwrap());
    }

    #[test]
    fn test_serde_as_version_number() {
        let json = serde_json::to_string(&HashAlgorithm::Xxh3_128).unwrap();
        assert_eq!(json, "2");
        let parsed: HashAlgorithm = serde_json::from_str("1").unwrap();
        assert_eq!(parsed, HashAlgorithm::Sha256);
        assert!(serde_json::from_str::<HashAlgorithm>("5").is_err());
    }
}
