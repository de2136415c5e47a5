//! Repository selection by owner + name pattern

use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};

use super::client::GitHubClient;
use super::fetch::{DateFilter, FetchEngine, Page, PageFetcher, PageRequest};
use super::{GitHubError, GitHubResult};
use crate::models::RepoRef;

/// A repository as listed for its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoListing {
    pub name: String,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub archived: bool,
}

/// `owner` plus a case-insensitive glob over repository names.
#[derive(Debug, Clone)]
pub struct RepoPattern {
    pub owner: String,
    matcher: GlobMatcher,
    pub include_forks: bool,
    pub include_archived: bool,
}

impl RepoPattern {
    pub fn new(owner: &str, pattern: &str) -> GitHubResult<Self> {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .literal_separator(true)
            .build()
            .map_err(|e| GitHubError::Decode(format!("invalid repository pattern {:?}: {}", pattern, e)))?;
        Ok(Self {
            owner: owner.to_string(),
            matcher: glob.compile_matcher(),
            include_forks: false,
            include_archived: false,
        })
    }

    pub fn matches(&self, listing: &RepoListing) -> bool {
        (self.include_forks || !listing.fork)
            && (self.include_archived || !listing.archived)
            && self.matcher.is_match(&listing.name)
    }

    /// Matching repositories, sorted by name.
    pub fn select(&self, listings: &[RepoListing]) -> Vec<RepoRef> {
        let mut selected: Vec<RepoRef> = listings
            .iter()
            .filter(|l| self.matches(l))
            .map(|l| RepoRef::new(self.owner.clone(), l.name.clone()))
            .collect();
        selected.sort();
        selected
    }
}

struct OwnerRepoFetcher<'a> {
    client: &'a GitHubClient,
    owner: &'a str,
}

impl PageFetcher for OwnerRepoFetcher<'_> {
    type Item = RepoListing;
    type Output = RepoListing;

    fn fetch_page(&self, request: &PageRequest) -> GitHubResult<Page<RepoListing>> {
        let path = match &request.cursor {
            Some(next) => next.clone(),
            None => format!(
                "/users/{}/repos?type=owner&sort=full_name&per_page={}",
                self.owner,
                self.client.per_page()
            ),
        };
        let (items, next): (Vec<RepoListing>, _) = self.client.get_json(&path)?;
        Ok(Page {
            items,
            has_next: next.is_some(),
            next_cursor: next,
        })
    }

    fn convert(&self, item: RepoListing) -> RepoListing {
        item
    }

    // Listings are alphabetical, not dated
    fn filter(&self, _item: &RepoListing) -> DateFilter {
        DateFilter::Include
    }
}

/// Every repository owned by `owner`.
pub fn list_owner_repos(
    client: &GitHubClient,
    engine: &FetchEngine<'_>,
    owner: &str,
) -> GitHubResult<Vec<RepoListing>> {
    let key = format!("repos:{}", owner.to_lowercase());
    engine.fetch_all(Some(&key), &OwnerRepoFetcher { client, owner })
}
