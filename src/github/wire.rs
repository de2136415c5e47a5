//! Response shapes shared by the REST and GraphQL fetchers

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use super::fetch::DateFilter;
use crate::models::{DateRange, Identity, RepoRef};

/// REST `user` object.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RestUser {
    pub login: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl RestUser {
    pub fn identity(&self) -> Identity {
        Identity {
            avatar_url: self.avatar_url.clone(),
            id: self.id,
            ..Identity::from_login(self.login.clone())
        }
    }
}

/// GraphQL `Actor` (with the `User` fragment fields when present).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GqlActor {
    pub login: String,
    #[serde(default)]
    pub database_id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl GqlActor {
    pub fn identity(&self) -> Identity {
        Identity {
            name: self.name.clone().unwrap_or_default(),
            email: self.email.clone().unwrap_or_default(),
            avatar_url: self.avatar_url.clone(),
            id: self.database_id,
            ..Identity::from_login(self.login.clone())
        }
    }
}

/// Deleted accounts come back as a null author.
pub(crate) fn ghost() -> Identity {
    Identity::from_login("ghost")
}

pub(crate) fn rest_identity(user: Option<&RestUser>) -> Identity {
    user.map(RestUser::identity).unwrap_or_else(ghost)
}

pub(crate) fn gql_identity(actor: Option<&GqlActor>) -> Identity {
    actor.map(GqlActor::identity).unwrap_or_else(ghost)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PageInfo {
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Connection<T> {
    #[serde(default = "Vec::new")]
    pub nodes: Vec<T>,
    pub page_info: PageInfo,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TotalCount {
    pub total_count: u64,
}

/// Classify a creation timestamp against the requested window.
pub(crate) fn date_filter(range: &DateRange, created_at: DateTime<Utc>) -> DateFilter {
    if range.is_before(created_at) {
        DateFilter::TooOld
    } else if range.is_after(created_at) {
        DateFilter::TooNew
    } else {
        DateFilter::Include
    }
}

/// Nested GraphQL connections are read in a single page; say so when
/// the server reports more than came back.
pub(crate) fn warn_if_truncated(what: &str, repo: &RepoRef, number: u64, total: u64, seen: usize) -> bool {
    let truncated = total > seen as u64;
    if truncated {
        warn!(
            "{}#{}: only {} of {} {} fetched",
            repo, number, seen, total, what
        );
    }
    truncated
}

/// Cache key for one resource of one repository over one window.
pub(crate) fn cache_key(kind: &str, repo: &RepoRef, range: &DateRange) -> String {
    let bound = |ts: Option<DateTime<Utc>>| {
        ts.map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string())
            .unwrap_or_else(|| "open".to_string())
    };
    format!("{}:{}:{}..{}", kind, repo, bound(range.since), bound(range.until))
}
