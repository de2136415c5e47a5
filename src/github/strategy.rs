//! Interchangeable fetch strategies with whole-operation fallback

use tracing::warn;

use super::fetch::FetchEngine;
use super::GitHubResult;
use crate::models::{DateRange, RepoRef};

/// One way of fetching a resource for a repository.
pub trait FetchStrategy {
    type Output;

    fn name(&self) -> &'static str;

    fn fetch(
        &self,
        engine: &FetchEngine<'_>,
        repo: &RepoRef,
        range: &DateRange,
    ) -> GitHubResult<Self::Output>;
}

/// Try `preferred` (when available), then re-fetch everything with
/// `fallback` if it fails. Partial results are never merged.
pub fn fetch_with_fallback<P, F>(
    preferred: Option<&P>,
    fallback: &F,
    engine: &FetchEngine<'_>,
    repo: &RepoRef,
    range: &DateRange,
) -> GitHubResult<F::Output>
where
    P: FetchStrategy<Output = F::Output>,
    F: FetchStrategy,
{
    if let Some(strategy) = preferred {
        match strategy.fetch(engine, repo, range) {
            Ok(output) => return Ok(output),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(
                    "{} fetch for {} failed ({}), retrying with {}",
                    strategy.name(),
                    repo,
                    e,
                    fallback.name()
                );
                engine.reporter().warn(&format!(
                    "{}: {} failed, falling back to {}",
                    repo,
                    strategy.name(),
                    fallback.name()
                ));
            }
        }
    }
    fallback.fetch(engine, repo, range)
}
