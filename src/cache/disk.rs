//! Persistent TTL cache: one JSON file per entry

use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, warn};

use super::{hash_key, CacheEntry, ResultCache};

/// File-backed result cache under `<dir>/<hash>.json`.
///
/// Readers share the lock; writers (including lazy expiry on read) take it
/// exclusively.
pub struct DiskCache {
    dir: PathBuf,
    ttl: Duration,
    lock: RwLock<()>,
}

impl DiskCache {
    /// Open (creating if needed) a cache directory.
    pub fn open(dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;
        debug!("Opened result cache at {}", dir.display());
        Ok(Self {
            dir,
            ttl,
            lock: RwLock::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hash_key(key)))
    }

    fn read_entry(path: &Path) -> Option<CacheEntry> {
        let data = fs::read_to_string(path).ok()?;
        serde_json::from_str(&data).ok()
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

impl ResultCache for DiskCache {
    fn name(&self) -> &str {
        "disk"
    }

    fn get(&self, key: &str) -> Option<String> {
        let path = self.entry_path(key);
        {
            let _read = self.lock.read().ok()?;
            match Self::read_entry(&path) {
                Some(entry) if !entry.is_expired() => return Some(entry.value),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: drop it under the write lock, re-checking in case a
        // writer refreshed it in between.
        let _write = self.lock.write().ok()?;
        match Self::read_entry(&path) {
            Some(entry) if !entry.is_expired() => Some(entry.value),
            _ => {
                if let Err(e) = remove_if_exists(&path) {
                    warn!("{}", e);
                }
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let entry = CacheEntry::new(value, self.ttl);
        let data = serde_json::to_string(&entry)?;
        let path = self.entry_path(key);
        let tmp = path.with_extension("json.tmp");

        let _write = self
            .lock
            .write()
            .map_err(|_| anyhow::anyhow!("cache lock poisoned"))?;
        fs::write(&tmp, data).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let _write = self
            .lock
            .write()
            .map_err(|_| anyhow::anyhow!("cache lock poisoned"))?;
        remove_if_exists(&self.entry_path(key))
    }

    fn clear(&self) -> Result<()> {
        let _write = self
            .lock
            .write()
            .map_err(|_| anyhow::anyhow!("cache lock poisoned"))?;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                remove_if_exists(&path)?;
            }
        }
        Ok(())
    }
}
