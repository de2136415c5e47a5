//! Pull requests and their reviews
//!
//! The GraphQL strategy gets pull requests with reviews inline, 50 per
//! round trip. The REST strategy lists pull requests, enriches each with a
//! detail call (the list endpoint omits size fields), then fetches reviews
//! for all of them through a bounded worker pool.

use chrono::{DateTime, Utc};
use crossbeam_channel::bounded;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::client::GitHubClient;
use super::fetch::{DateFilter, FetchEngine, Page, PageFetcher, PageRequest};
use super::strategy::{fetch_with_fallback, FetchStrategy};
use super::wire::{
    cache_key, date_filter, gql_identity, rest_identity, warn_if_truncated, Connection, GqlActor,
    RestUser, TotalCount,
};
use super::{GitHubError, GitHubResult};
use crate::models::{DateRange, PrState, PullRequest, RepoRef, Review, ReviewState};

const GRAPHQL_PAGE_SIZE: u32 = 50;

const PULLS_QUERY: &str = r#"
query($owner: String!, $name: String!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    pullRequests(first: $first, after: $after, orderBy: {field: CREATED_AT, direction: DESC}) {
      nodes {
        number
        title
        state
        author { login avatarUrl ... on User { databaseId name email } }
        baseRefName
        headRefName
        createdAt
        mergedAt
        closedAt
        additions
        deletions
        changedFiles
        commits { totalCount }
        reviews(first: 100) {
          totalCount
          nodes {
            databaseId
            author { login avatarUrl ... on User { databaseId name email } }
            state
            submittedAt
            body
            comments { totalCount }
          }
        }
      }
      pageInfo { hasNextPage endCursor }
    }
  }
}
"#;

// ---------------------------------------------------------------------------
// GraphQL
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PullsData {
    repository: Option<PullsRepository>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullsRepository {
    pull_requests: Connection<GqlPull>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlPull {
    number: u64,
    title: String,
    state: String,
    author: Option<GqlActor>,
    base_ref_name: String,
    head_ref_name: String,
    created_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    #[serde(default)]
    changed_files: u64,
    #[serde(default)]
    commits: TotalCount,
    reviews: Option<GqlReviews>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlReviews {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    nodes: Vec<GqlReview>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlReview {
    database_id: Option<u64>,
    author: Option<GqlActor>,
    state: String,
    submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    comments: TotalCount,
}

struct GraphQlPullFetcher<'a> {
    client: &'a GitHubClient,
    repo: &'a RepoRef,
    range: &'a DateRange,
}

impl PageFetcher for GraphQlPullFetcher<'_> {
    type Item = GqlPull;
    type Output = PullRequest;

    fn fetch_page(&self, request: &PageRequest) -> GitHubResult<Page<GqlPull>> {
        let data: PullsData = self.client.graphql(
            PULLS_QUERY,
            json!({
                "owner": self.repo.owner,
                "name": self.repo.name,
                "first": GRAPHQL_PAGE_SIZE,
                "after": request.cursor,
            }),
        )?;
        let connection = data
            .repository
            .ok_or_else(|| GitHubError::GraphQl(format!("repository {} not found", self.repo)))?
            .pull_requests;
        Ok(Page {
            items: connection.nodes,
            has_next: connection.page_info.has_next_page,
            next_cursor: connection.page_info.end_cursor,
        })
    }

    fn convert(&self, pr: GqlPull) -> PullRequest {
        let nodes = match pr.reviews {
            Some(reviews) => {
                warn_if_truncated("reviews", self.repo, pr.number, reviews.total_count, reviews.nodes.len());
                reviews.nodes
            }
            None => Vec::new(),
        };
        let reviews = nodes
            .into_iter()
            .map(|review| Review {
                id: review.database_id.unwrap_or_default(),
                pr_number: pr.number,
                author: gql_identity(review.author.as_ref()),
                state: ReviewState::parse(&review.state),
                submitted_at: review.submitted_at,
                body: review.body,
                comment_count: review.comments.total_count as u32,
                response_time_hours: None,
            })
            .collect();

        let mut out = PullRequest {
            number: pr.number,
            repository: self.repo.key(),
            title: pr.title,
            state: pull_state(&pr.state, pr.merged_at.is_some()),
            author: gql_identity(pr.author.as_ref()),
            base_branch: pr.base_ref_name,
            head_branch: pr.head_ref_name,
            created_at: pr.created_at,
            merged_at: pr.merged_at,
            closed_at: pr.closed_at,
            additions: pr.additions,
            deletions: pr.deletions,
            files_changed: pr.changed_files,
            commit_count: pr.commits.total_count,
            reviews,
            time_to_merge_hours: None,
            time_to_first_review_hours: None,
        };
        out.compute_derived();
        out
    }

    fn filter(&self, pr: &GqlPull) -> DateFilter {
        date_filter(self.range, pr.created_at)
    }
}

/// Pull requests with inline reviews over GraphQL.
pub struct GraphQlPulls<'a> {
    pub client: &'a GitHubClient,
}

impl FetchStrategy for GraphQlPulls<'_> {
    type Output = Vec<PullRequest>;

    fn name(&self) -> &'static str {
        "GraphQL"
    }

    fn fetch(
        &self,
        engine: &FetchEngine<'_>,
        repo: &RepoRef,
        range: &DateRange,
    ) -> GitHubResult<Vec<PullRequest>> {
        let fetcher = GraphQlPullFetcher {
            client: self.client,
            repo,
            range,
        };
        let key = cache_key("pulls-graphql", repo, range);
        engine.fetch_all(Some(&key), &fetcher)
    }
}

// ---------------------------------------------------------------------------
// REST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct RestRef {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RestPull {
    number: u64,
    title: String,
    state: String,
    user: Option<RestUser>,
    base: RestRef,
    head: RestRef,
    created_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    // Only on the detail endpoint
    #[serde(default)]
    additions: Option<u64>,
    #[serde(default)]
    deletions: Option<u64>,
    #[serde(default)]
    changed_files: Option<u64>,
    #[serde(default)]
    commits: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RestReview {
    id: u64,
    user: Option<RestUser>,
    state: String,
    submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    body: Option<String>,
}

struct RestPullFetcher<'a> {
    client: &'a GitHubClient,
    repo: &'a RepoRef,
    range: &'a DateRange,
}

impl PageFetcher for RestPullFetcher<'_> {
    type Item = RestPull;
    type Output = PullRequest;

    fn fetch_page(&self, request: &PageRequest) -> GitHubResult<Page<RestPull>> {
        let path = match &request.cursor {
            Some(next) => next.clone(),
            None => format!(
                "/repos/{}/{}/pulls?state=all&sort=created&direction=desc&per_page={}",
                self.repo.owner,
                self.repo.name,
                self.client.per_page()
            ),
        };
        let (items, next): (Vec<RestPull>, _) = self.client.get_json(&path)?;
        Ok(Page {
            items,
            has_next: next.is_some(),
            next_cursor: next,
        })
    }

    fn convert(&self, pr: RestPull) -> PullRequest {
        let mut out = PullRequest {
            number: pr.number,
            repository: self.repo.key(),
            title: pr.title,
            state: pull_state(&pr.state, pr.merged_at.is_some()),
            author: rest_identity(pr.user.as_ref()),
            base_branch: pr.base.name,
            head_branch: pr.head.name,
            created_at: pr.created_at,
            merged_at: pr.merged_at,
            closed_at: pr.closed_at,
            additions: pr.additions.unwrap_or_default(),
            deletions: pr.deletions.unwrap_or_default(),
            files_changed: pr.changed_files.unwrap_or_default(),
            commit_count: pr.commits.unwrap_or_default(),
            reviews: Vec::new(),
            time_to_merge_hours: None,
            time_to_first_review_hours: None,
        };
        out.compute_derived();
        out
    }

    fn filter(&self, pr: &RestPull) -> DateFilter {
        date_filter(self.range, pr.created_at)
    }
}

struct RestReviewFetcher<'a> {
    client: &'a GitHubClient,
    repo: &'a RepoRef,
    number: u64,
}

impl PageFetcher for RestReviewFetcher<'_> {
    type Item = RestReview;
    type Output = Review;

    fn fetch_page(&self, request: &PageRequest) -> GitHubResult<Page<RestReview>> {
        let path = match &request.cursor {
            Some(next) => next.clone(),
            None => format!(
                "/repos/{}/{}/pulls/{}/reviews?per_page={}",
                self.repo.owner,
                self.repo.name,
                self.number,
                self.client.per_page()
            ),
        };
        let (items, next): (Vec<RestReview>, _) = self.client.get_json(&path)?;
        Ok(Page {
            items,
            has_next: next.is_some(),
            next_cursor: next,
        })
    }

    fn convert(&self, review: RestReview) -> Review {
        Review {
            id: review.id,
            pr_number: self.number,
            author: rest_identity(review.user.as_ref()),
            state: ReviewState::parse(&review.state),
            submitted_at: review.submitted_at,
            body: review.body.unwrap_or_default(),
            comment_count: 0,
            response_time_hours: None,
        }
    }

    // Reviews belong to an already-accepted pull request
    fn filter(&self, _review: &RestReview) -> DateFilter {
        DateFilter::Include
    }
}

/// Fetch reviews for many pull requests with at most `width` in flight.
///
/// A failure for one pull request is logged and leaves it without reviews;
/// cancellation fails the whole call.
pub fn fetch_reviews_concurrently(
    client: &GitHubClient,
    engine: &FetchEngine<'_>,
    repo: &RepoRef,
    numbers: &[u64],
    width: usize,
) -> GitHubResult<HashMap<u64, Vec<Review>>> {
    fetch_reviews_with(engine, repo, numbers, width, |number| {
        let fetcher = RestReviewFetcher {
            client,
            repo,
            number,
        };
        let key = format!("reviews:{}#{}", repo, number);
        engine.fetch_all(Some(&key), &fetcher)
    })
}

/// Worker pool behind [`fetch_reviews_concurrently`], generic over the
/// per-PR fetch.
///
/// The result channel holds one slot per pull request, so workers never
/// block handing results back while the pool is still running.
fn fetch_reviews_with<F>(
    engine: &FetchEngine<'_>,
    repo: &RepoRef,
    numbers: &[u64],
    width: usize,
    fetch: F,
) -> GitHubResult<HashMap<u64, Vec<Review>>>
where
    F: Fn(u64) -> GitHubResult<Vec<Review>> + Sync,
{
    let mut reviews = HashMap::with_capacity(numbers.len());
    if numbers.is_empty() {
        return Ok(reviews);
    }

    let (job_tx, job_rx) = bounded::<u64>(numbers.len());
    let (result_tx, result_rx) = bounded::<(u64, GitHubResult<Vec<Review>>)>(numbers.len());
    for &number in numbers {
        if job_tx.send(number).is_err() {
            break;
        }
    }
    drop(job_tx);

    let workers = width.clamp(1, numbers.len());
    debug!("Fetching reviews for {} PRs with {} workers", numbers.len(), workers);
    let fetch = &fetch;
    std::thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for number in job_rx.iter() {
                    if result_tx.send((number, fetch(number))).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);

    for (number, result) in result_rx.try_iter() {
        match result {
            Ok(list) => {
                reviews.insert(number, list);
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!("Failed to fetch reviews for {}#{}: {}", repo, number, e);
                engine
                    .reporter()
                    .warn(&format!("{}#{}: reviews unavailable ({})", repo, number, e));
            }
        }
    }
    Ok(reviews)
}

/// Pull requests over REST: list, per-PR detail, then concurrent reviews.
pub struct RestPulls<'a> {
    pub client: &'a GitHubClient,
    /// Concurrent review requests
    pub concurrency: usize,
}

impl FetchStrategy for RestPulls<'_> {
    type Output = Vec<PullRequest>;

    fn name(&self) -> &'static str {
        "REST"
    }

    fn fetch(
        &self,
        engine: &FetchEngine<'_>,
        repo: &RepoRef,
        range: &DateRange,
    ) -> GitHubResult<Vec<PullRequest>> {
        let fetcher = RestPullFetcher {
            client: self.client,
            repo,
            range,
        };
        let key = cache_key("pulls-rest", repo, range);
        let mut pulls = engine.fetch_all_with_enrichment(Some(&key), &fetcher, |pr| {
            let path = format!("/repos/{}/{}/pulls/{}", repo.owner, repo.name, pr.number);
            let (detail, _): (RestPull, _) = self.client.get_json(&path)?;
            Ok(detail)
        })?;

        let numbers: Vec<u64> = pulls.iter().map(|pr| pr.number).collect();
        let mut reviews =
            fetch_reviews_concurrently(self.client, engine, repo, &numbers, self.concurrency)?;
        for pr in &mut pulls {
            pr.reviews = reviews.remove(&pr.number).unwrap_or_default();
            pr.compute_derived();
        }
        Ok(pulls)
    }
}

/// Fetch pull requests, preferring GraphQL and falling back to REST.
pub fn fetch_pull_requests(
    client: &GitHubClient,
    engine: &FetchEngine<'_>,
    repo: &RepoRef,
    range: &DateRange,
    concurrency: usize,
) -> GitHubResult<Vec<PullRequest>> {
    let graphql = GraphQlPulls { client };
    let rest = RestPulls {
        client,
        concurrency,
    };
    let preferred = client.has_graphql().then_some(&graphql);
    fetch_with_fallback(preferred, &rest, engine, repo, range)
}

fn pull_state(raw: &str, merged: bool) -> PrState {
    if merged || raw.eq_ignore_ascii_case("merged") {
        PrState::Merged
    } else if raw.eq_ignore_ascii_case("closed") {
        PrState::Closed
    } else {
        PrState::Open
    }
}
