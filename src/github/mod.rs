//! GitHub data acquisition
//!
//! A sync ureq client wrapped in retry/backoff, a generic paginated
//! [`FetchEngine`], and the per-resource fetchers built on it. Pull
//! requests and issues each have a GraphQL strategy and a REST strategy;
//! callers prefer GraphQL when a GraphQL endpoint is configured and fall
//! back to a full REST re-fetch if it fails.
//!
//! # Environment Variables
//!
//! - `GITHUB_TOKEN` / `GH_TOKEN`: API token (read by the config layer)

mod client;
mod fetch;
mod issues;
mod pulls;
mod repos;
mod retry;
mod strategy;
mod users;
mod wire;

pub use client::{ClientConfig, GitHubClient};
pub use fetch::{DateFilter, FetchConfig, FetchEngine, Page, PageFetcher, PageRequest};
pub use issues::{fetch_issues, GraphQlIssues, IssueActivity, RestIssues};
pub use pulls::{fetch_pull_requests, fetch_reviews_concurrently, GraphQlPulls, RestPulls};
pub use repos::{list_owner_repos, RepoListing, RepoPattern};
pub use retry::RetryPolicy;
pub use strategy::{fetch_with_fallback, FetchStrategy};
pub use users::{UserDirectory, UserProfile};

use std::time::Duration;
use thiserror::Error;

use crate::cancel::Cancelled;

/// Errors that can occur talking to the GitHub API
#[derive(Error, Debug)]
pub enum GitHubError {
    #[error("GitHub API error: {status} - {message}")]
    Http { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Failed to parse API response: {0}")]
    Decode(String),

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("GraphQL endpoint not configured")]
    GraphQlUnavailable,

    #[error("Rate limited by GitHub")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Giving up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<GitHubError> },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl GitHubError {
    /// Worth another attempt: rate limits, server errors, network failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            GitHubError::Http { status, .. } => *status == 429 || *status >= 500,
            GitHubError::Transport(_) | GitHubError::RateLimited { .. } => true,
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            GitHubError::Cancelled(_) => true,
            GitHubError::RetriesExhausted { last, .. } => last.is_cancelled(),
            _ => false,
        }
    }
}

pub type GitHubResult<T> = Result<T, GitHubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        let http = |status| GitHubError::Http {
            status,
            message: String::new(),
        };
        assert!(http(429).is_retryable());
        assert!(http(502).is_retryable());
        assert!(!http(404).is_retryable());
        assert!(!http(401).is_retryable());
        assert!(GitHubError::Transport("reset".into()).is_retryable());
        assert!(GitHubError::RateLimited { retry_after: None }.is_retryable());
        assert!(!GitHubError::Decode("bad".into()).is_retryable());
        assert!(!GitHubError::Cancelled(Cancelled).is_retryable());
    }
}
