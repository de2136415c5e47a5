//! Unified result-cache trait
//!
//! The fetch engine talks to every cache through [`ResultCache`], so
//! callers can disable caching by handing it a [`NoopCache`](super::NoopCache)
//! instead of branching on a flag.

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Key/value store with TTL expiry.
///
/// Values are opaque strings; [`get_json`] and [`set_json`] layer typed
/// access on top. Implementations must be safe to share across threads.
pub trait ResultCache: Send + Sync {
    /// Name of this cache layer (for logging)
    fn name(&self) -> &str;

    /// Look up a live entry. Expired entries are removed and reported missing.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value`, expiring `ttl` after now.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;

    /// Drop every entry.
    fn clear(&self) -> Result<()>;
}

/// Typed read. A value that no longer deserializes counts as a miss.
pub fn get_json<T: DeserializeOwned>(cache: &dyn ResultCache, key: &str) -> Option<T> {
    let raw = cache.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Discarding undecodable {} entry for {}: {}", cache.name(), key, e);
            None
        }
    }
}

/// Typed write.
pub fn set_json<T: Serialize + ?Sized>(cache: &dyn ResultCache, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    cache.set(key, &raw)
}

impl<T: ResultCache + ?Sized> ResultCache for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}
