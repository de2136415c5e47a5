//! Cache path utilities - uses ~/.cache/gitvelocity/ by default

use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Base directory for cached API responses.
/// Uses ~/.cache/gitvelocity/ on Unix, %LOCALAPPDATA%/gitvelocity/ on Windows.
pub fn default_cache_dir() -> PathBuf {
    let base = if cfg!(windows) {
        std::env::var("LOCALAPPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".")))
    } else {
        dirs::cache_dir().unwrap_or_else(|| {
            // Fallback to ~/.cache
            dirs::home_dir()
                .map(|h| h.join(".cache"))
                .unwrap_or_else(|| PathBuf::from("."))
        })
    };

    base.join("gitvelocity")
}

/// Where local clones live when the config does not say.
pub fn default_clone_dir() -> PathBuf {
    default_cache_dir().join("repos")
}

/// Storage identifier for a logical cache key: the first 8 bytes of its
/// SHA-256 digest, hex encoded. Collisions are not handled.
pub fn hash_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}
