//! User profiles
//!
//! Profiles are looked up once per login per run: an in-memory layer sits
//! in front of the persistent result cache.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, warn};

use super::client::GitHubClient;
use super::{GitHubError, GitHubResult};
use crate::cache::{get_json, set_json, LayeredCache, MemoryCache, ResultCache};
use crate::progress::ProgressReporter;

/// Public profile of a platform account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub login: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Cached profile lookups.
pub struct UserDirectory<'a> {
    client: &'a GitHubClient,
    cache: LayeredCache<MemoryCache, &'a dyn ResultCache>,
}

impl<'a> UserDirectory<'a> {
    pub fn new(client: &'a GitHubClient, persistent: &'a dyn ResultCache, ttl: Duration) -> Self {
        Self {
            client,
            cache: LayeredCache::new(MemoryCache::new(ttl), persistent),
        }
    }

    /// Profile for `login`; `None` if the account does not exist.
    pub fn profile(&self, login: &str) -> GitHubResult<Option<UserProfile>> {
        let key = format!("user:{}", login.to_lowercase());
        if let Some(hit) = get_json::<Option<UserProfile>>(&self.cache, &key) {
            return Ok(hit);
        }

        let profile = match self.client.get_json::<UserProfile>(&format!("/users/{}", login)) {
            Ok((profile, _)) => Some(profile),
            Err(GitHubError::Http { status: 404, .. }) => {
                debug!("No such user: {}", login);
                None
            }
            Err(e) => return Err(e),
        };
        if let Err(e) = set_json(&self.cache, &key, &profile) {
            warn!("Failed to cache profile {}: {}", login, e);
        }
        Ok(profile)
    }

    /// Profiles for every login that resolves. Lookup failures are
    /// reported and skipped; cancellation aborts.
    pub fn profiles<'l>(
        &self,
        logins: impl IntoIterator<Item = &'l str>,
        reporter: &dyn ProgressReporter,
    ) -> GitHubResult<BTreeMap<String, UserProfile>> {
        let unique: BTreeSet<String> = logins
            .into_iter()
            .filter(|l| !l.is_empty())
            .map(str::to_lowercase)
            .collect();

        let mut profiles = BTreeMap::new();
        for login in unique {
            match self.profile(&login) {
                Ok(Some(profile)) => {
                    profiles.insert(login, profile);
                }
                Ok(None) => {}
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("Failed to fetch profile for {}: {}", login, e);
                    reporter.warn(&format!("profile for {} unavailable: {}", login, e));
                }
            }
        }
        Ok(profiles)
    }
}
