//! Generic paginated fetch with caching and date-based early termination
//!
//! A [`PageFetcher`] knows how to get one page of raw items and how to
//! judge and convert each item; [`FetchEngine`] owns the paging loop, the
//! cache, and the decision to stop. The engine assumes the provider returns
//! items newest-first, so once whole pages are older than the window it
//! stops asking for more.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::GitHubResult;
use crate::cache::{get_json, set_json, ResultCache};
use crate::cancel::CancellationToken;
use crate::progress::ProgressReporter;

/// Where an item falls relative to the requested window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    Include,
    TooNew,
    TooOld,
}

/// One page of raw items.
#[derive(Debug, Clone)]
pub struct Page<I> {
    pub items: Vec<I>,
    pub has_next: bool,
    /// Cursor (GraphQL) or next URL (REST) for the following page
    pub next_cursor: Option<String>,
}

/// Which page to fetch: 1-based number plus the token from the previous page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub number: u32,
    pub cursor: Option<String>,
}

impl PageRequest {
    pub fn first() -> Self {
        Self {
            number: 1,
            cursor: None,
        }
    }
}

/// Resource-specific half of a paginated fetch.
pub trait PageFetcher {
    type Item;
    type Output: Serialize + DeserializeOwned;

    fn fetch_page(&self, request: &PageRequest) -> GitHubResult<Page<Self::Item>>;

    fn convert(&self, item: Self::Item) -> Self::Output;

    fn filter(&self, item: &Self::Item) -> DateFilter;

    /// Items the resource lists but the caller does not want at all.
    fn should_skip(&self, _item: &Self::Item) -> bool {
        false
    }
}

/// Paging limits.
#[derive(Debug, Clone, Copy)]
pub struct FetchConfig {
    /// Consecutive all-too-old pages after which paging stops
    pub early_termination_threshold: u32,
    /// Hard page cap (0 = unlimited)
    pub max_pages: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            early_termination_threshold: 2,
            max_pages: 0,
        }
    }
}

/// Runs paginated fetches against a shared result cache.
pub struct FetchEngine<'a> {
    cache: &'a dyn ResultCache,
    config: FetchConfig,
    cancel: &'a CancellationToken,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> FetchEngine<'a> {
    pub fn new(
        cache: &'a dyn ResultCache,
        config: FetchConfig,
        cancel: &'a CancellationToken,
        reporter: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            cache,
            config,
            cancel,
            reporter,
        }
    }

    pub fn cache(&self) -> &dyn ResultCache {
        self.cache
    }

    pub fn reporter(&self) -> &dyn ProgressReporter {
        self.reporter
    }

    /// Fetch every in-window item, serving from cache when possible.
    pub fn fetch_all<F: PageFetcher>(
        &self,
        cache_key: Option<&str>,
        fetcher: &F,
    ) -> GitHubResult<Vec<F::Output>> {
        self.run(cache_key, fetcher, |item| Ok(Some(item)))
    }

    /// Like [`fetch_all`](Self::fetch_all), but each included item first goes
    /// through `enrich` (a per-item detail call). Items whose enrichment
    /// fails are logged and dropped; cancellation still aborts the fetch.
    pub fn fetch_all_with_enrichment<F, E>(
        &self,
        cache_key: Option<&str>,
        fetcher: &F,
        enrich: E,
    ) -> GitHubResult<Vec<F::Output>>
    where
        F: PageFetcher,
        E: Fn(F::Item) -> GitHubResult<F::Item>,
    {
        self.run(cache_key, fetcher, |item| match enrich(item) {
            Ok(enriched) => Ok(Some(enriched)),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!("Dropping item after failed enrichment: {}", e);
                self.reporter.warn(&format!("skipped an item: {}", e));
                Ok(None)
            }
        })
    }

    fn run<F, A>(
        &self,
        cache_key: Option<&str>,
        fetcher: &F,
        mut accept: A,
    ) -> GitHubResult<Vec<F::Output>>
    where
        F: PageFetcher,
        A: FnMut(F::Item) -> GitHubResult<Option<F::Item>>,
    {
        if let Some(key) = cache_key {
            if let Some(hit) = get_json::<Vec<F::Output>>(self.cache, key) {
                debug!("Cache hit for {} ({} items)", key, hit.len());
                return Ok(hit);
            }
        }

        let mut results = Vec::new();
        let mut request = PageRequest::first();
        let mut old_pages = 0u32;

        loop {
            self.cancel.check()?;
            let page = fetcher.fetch_page(&request)?;

            let mut eligible = 0usize;
            let mut too_old = 0usize;
            for item in page.items {
                if fetcher.should_skip(&item) {
                    continue;
                }
                eligible += 1;
                match fetcher.filter(&item) {
                    DateFilter::TooOld => too_old += 1,
                    DateFilter::TooNew => {}
                    DateFilter::Include => {
                        if let Some(item) = accept(item)? {
                            results.push(fetcher.convert(item));
                        }
                    }
                }
            }

            // A page with nothing eligible says nothing about age.
            if eligible > 0 {
                if too_old == eligible {
                    old_pages += 1;
                } else {
                    old_pages = 0;
                }
            }

            if old_pages >= self.config.early_termination_threshold.max(1) {
                debug!(
                    "Stopping after page {}: {} consecutive pages older than the window",
                    request.number, old_pages
                );
                break;
            }
            if !page.has_next {
                break;
            }
            if self.config.max_pages > 0 && request.number >= self.config.max_pages {
                warn!("Stopping at page cap ({})", self.config.max_pages);
                break;
            }
            request = PageRequest {
                number: request.number + 1,
                cursor: page.next_cursor,
            };
        }

        if let Some(key) = cache_key {
            if let Err(e) = set_json(self.cache, key, &results) {
                warn!("Failed to cache {}: {}", key, e);
            }
        }
        Ok(results)
    }
}
