//! Cache command - inspect or clear the API result cache

use anyhow::Result;
use console::style;
use std::path::{Path, PathBuf};

use gitvelocity::cache::{default_cache_dir, DiskCache, ResultCache};
use gitvelocity::config::load_config;

fn cache_dir(config: Option<&Path>) -> Result<PathBuf> {
    Ok(match config {
        Some(path) => load_config(path)?.cache.dir(),
        None => default_cache_dir(),
    })
}

pub fn clear(config: Option<&Path>) -> Result<()> {
    let dir = cache_dir(config)?;
    if !dir.exists() {
        println!("No cache at {}", dir.display());
        return Ok(());
    }
    // TTL is irrelevant when only clearing
    let cache = DiskCache::open(&dir, std::time::Duration::ZERO)?;
    cache.clear()?;
    println!("{} Cleared {}", style("✓").green(), style(dir.display()).cyan());
    Ok(())
}

pub fn path(config: Option<&Path>) -> Result<()> {
    println!("{}", cache_dir(config)?.display());
    Ok(())
}
