//! Result caching for API responses
//!
//! Three layers share the [`ResultCache`] trait:
//!
//! - [`DiskCache`]: persistent, one JSON file per entry, survives runs
//! - [`MemoryCache`]: same TTL rules, process-local (user profiles)
//! - [`NoopCache`]: always misses; used when caching is disabled
//!
//! Entries carry an absolute expiry computed at write time and are only
//! invalidated lazily on `get`. There is no background sweep.

mod disk;
pub mod paths;
pub mod traits;

pub use disk::DiskCache;
pub use paths::{default_cache_dir, default_clone_dir, hash_key};
pub use traits::{get_json, set_json, ResultCache};

use anyhow::Result;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A stored value and when it stops being valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Unix milliseconds
    pub expires_at: i64,
    pub value: String,
}

impl CacheEntry {
    pub fn new(value: &str, ttl: Duration) -> Self {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        Self {
            expires_at: Utc::now().timestamp_millis().saturating_add(ttl_ms),
            value: value.to_string(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp_millis() >= self.expires_at
    }
}

/// Thread-safe in-memory cache with TTL expiry.
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResultCache for MemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&self, key: &str) -> Option<String> {
        let id = hash_key(key);
        let expired = match self.entries.get(&id) {
            Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(&id);
        }
        None
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .insert(hash_key(key), CacheEntry::new(value, self.ttl));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(&hash_key(key));
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}

/// Cache that never stores anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl ResultCache for NoopCache {
    fn name(&self) -> &str {
        "noop"
    }

    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }
}

/// Reads through a fast layer before a slow one; writes go to both.
pub struct LayeredCache<F, S> {
    fast: F,
    slow: S,
}

impl<F: ResultCache, S: ResultCache> LayeredCache<F, S> {
    pub fn new(fast: F, slow: S) -> Self {
        Self { fast, slow }
    }
}

impl<F: ResultCache, S: ResultCache> ResultCache for LayeredCache<F, S> {
    fn name(&self) -> &str {
        "layered"
    }

    fn get(&self, key: &str) -> Option<String> {
        if let Some(hit) = self.fast.get(key) {
            return Some(hit);
        }
        let hit = self.slow.get(key)?;
        if let Err(e) = self.fast.set(key, &hit) {
            tracing::debug!("Failed to promote {} into {}: {}", key, self.fast.name(), e);
        }
        Some(hit)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.fast.set(key, value)?;
        self.slow.set(key, value)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.fast.delete(key)?;
        self.slow.delete(key)
    }

    fn clear(&self) -> Result<()> {
        self.fast.clear()?;
        self.slow.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_memory_cache_roundtrip() -> Result<()> {
        let cache = MemoryCache::new(Duration::from_secs(60));
        assert!(cache.get("k").is_none());
        cache.set("k", "v")?;
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        cache.delete("k")?;
        assert!(cache.get("k").is_none());
        Ok(())
    }

    #[test]
    fn test_memory_cache_expiry_is_lazy() -> Result<()> {
        let cache = MemoryCache::new(Duration::ZERO);
        cache.set("k", "v")?;
        assert_eq!(cache.len(), 1);
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
        Ok(())
    }

    #[test]
    fn test_noop_cache_always_misses() -> Result<()> {
        let cache = NoopCache;
        cache.set("k", "v")?;
        assert!(cache.get("k").is_none());
        cache.clear()?;
        Ok(())
    }

    #[test]
    fn test_typed_helpers() -> Result<()> {
        let cache = MemoryCache::new(Duration::from_secs(60));
        set_json(&cache, "nums", &vec![1u32, 2, 3])?;
        let back: Option<Vec<u32>> = get_json(&cache, "nums");
        assert_eq!(back, Some(vec![1, 2, 3]));
        cache.set("bad", "not json")?;
        let bad: Option<Vec<u32>> = get_json(&cache, "bad");
        assert!(bad.is_none());
        Ok(())
    }

    #[test]
    fn test_layered_cache_promotes() -> Result<()> {
        let slow = MemoryCache::new(Duration::from_secs(60));
        slow.set("k", "v")?;
        let layered = LayeredCache::new(MemoryCache::new(Duration::from_secs(60)), slow);
        assert_eq!(layered.get("k").as_deref(), Some("v"));
        assert_eq!(layered.fast.get("k").as_deref(), Some("v"));
        Ok(())
    }

    #[test]
    fn test_memory_cache_concurrent_access() {
        let cache = Arc::new(MemoryCache::new(Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    let key = format!("k{}", i);
                    cache.set(&key, "v").unwrap();
                    cache.get(&key)
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().as_deref(), Some("v"));
        }
        assert_eq!(cache.len(), 8);
    }
}
