//! Issues and issue comments
//!
//! GraphQL gets issues with their comments inline. REST lists issues
//! (skipping the pull requests GitHub mixes into that endpoint) and pages
//! the repository-wide comment feed separately.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;

use super::client::GitHubClient;
use super::fetch::{DateFilter, FetchEngine, Page, PageFetcher, PageRequest};
use super::strategy::{fetch_with_fallback, FetchStrategy};
use super::wire::{
    cache_key, date_filter, gql_identity, rest_identity, warn_if_truncated, Connection, GqlActor,
    RestUser,
};
use super::{GitHubError, GitHubResult};
use crate::models::{DateRange, Issue, IssueComment, IssueState, RepoRef};

const GRAPHQL_PAGE_SIZE: u32 = 50;

const ISSUES_QUERY: &str = r#"
query($owner: String!, $name: String!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    issues(first: $first, after: $after, orderBy: {field: CREATED_AT, direction: DESC}) {
      nodes {
        number
        title
        state
        author { login avatarUrl ... on User { databaseId name email } }
        createdAt
        closedAt
        comments(first: 100) {
          totalCount
          nodes {
            databaseId
            author { login avatarUrl ... on User { databaseId name email } }
            createdAt
          }
        }
      }
      pageInfo { hasNextPage endCursor }
    }
  }
}
"#;

/// Issues opened and comments written within the window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueActivity {
    pub issues: Vec<Issue>,
    pub comments: Vec<IssueComment>,
}

impl IssueActivity {
    /// Pair issues with a repository-wide comment feed.
    ///
    /// The feed also carries pull request conversations and threads on
    /// issues opened before the window; only comments on the given issues
    /// are kept, matching what the inline GraphQL comments cover.
    fn from_feed(issues: Vec<Issue>, mut comments: Vec<IssueComment>) -> Self {
        let numbers: HashSet<u64> = issues.iter().map(|i| i.number).collect();
        comments.retain(|c| numbers.contains(&c.issue_number));
        Self { issues, comments }
    }
}

fn issue_state(raw: &str) -> IssueState {
    if raw.eq_ignore_ascii_case("closed") {
        IssueState::Closed
    } else {
        IssueState::Open
    }
}

// ---------------------------------------------------------------------------
// GraphQL
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct IssuesData {
    repository: Option<IssuesRepository>,
}

#[derive(Debug, Deserialize)]
struct IssuesRepository {
    issues: Connection<GqlIssue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlIssue {
    number: u64,
    title: String,
    state: String,
    author: Option<GqlActor>,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    comments: GqlComments,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlComments {
    total_count: u64,
    #[serde(default)]
    nodes: Vec<GqlComment>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlComment {
    database_id: Option<u64>,
    author: Option<GqlActor>,
    created_at: DateTime<Utc>,
}

/// One issue with the in-window comments on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IssueWithComments {
    issue: Issue,
    comments: Vec<IssueComment>,
}

struct GraphQlIssueFetcher<'a> {
    client: &'a GitHubClient,
    repo: &'a RepoRef,
    range: &'a DateRange,
}

impl PageFetcher for GraphQlIssueFetcher<'_> {
    type Item = GqlIssue;
    type Output = IssueWithComments;

    fn fetch_page(&self, request: &PageRequest) -> GitHubResult<Page<GqlIssue>> {
        let data: IssuesData = self.client.graphql(
            ISSUES_QUERY,
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
            .issues;
        Ok(Page {
            items: connection.nodes,
            has_next: connection.page_info.has_next_page,
            next_cursor: connection.page_info.end_cursor,
        })
    }

    fn convert(&self, item: GqlIssue) -> IssueWithComments {
        let repository = self.repo.key();
        warn_if_truncated(
            "comments",
            self.repo,
            item.number,
            item.comments.total_count,
            item.comments.nodes.len(),
        );
        let comments = item
            .comments
            .nodes
            .iter()
            .filter(|c| self.range.contains(c.created_at))
            .map(|c| IssueComment {
                id: c.database_id.unwrap_or_default(),
                repository: repository.clone(),
                issue_number: item.number,
                author: gql_identity(c.author.as_ref()),
                created_at: c.created_at,
            })
            .collect();

        IssueWithComments {
            issue: Issue {
                number: item.number,
                repository,
                title: item.title,
                state: issue_state(&item.state),
                author: gql_identity(item.author.as_ref()),
                created_at: item.created_at,
                closed_at: item.closed_at,
                comment_count: item.comments.total_count as u32,
            },
            comments,
        }
    }

    fn filter(&self, item: &GqlIssue) -> DateFilter {
        date_filter(self.range, item.created_at)
    }
}

/// Issues with inline comments over GraphQL.
///
/// Only comments on issues opened inside the window are seen.
pub struct GraphQlIssues<'a> {
    pub client: &'a GitHubClient,
}

impl FetchStrategy for GraphQlIssues<'_> {
    type Output = IssueActivity;

    fn name(&self) -> &'static str {
        "GraphQL"
    }

    fn fetch(
        &self,
        engine: &FetchEngine<'_>,
        repo: &RepoRef,
        range: &DateRange,
    ) -> GitHubResult<IssueActivity> {
        let fetcher = GraphQlIssueFetcher {
            client: self.client,
            repo,
            range,
        };
        let key = cache_key("issues-graphql", repo, range);
        let mut activity = IssueActivity::default();
        for entry in engine.fetch_all(Some(&key), &fetcher)? {
            activity.issues.push(entry.issue);
            activity.comments.extend(entry.comments);
        }
        Ok(activity)
    }
}

// ---------------------------------------------------------------------------
// REST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct RestIssue {
    number: u64,
    title: String,
    state: String,
    user: Option<RestUser>,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    comments: u64,
    /// Present when the "issue" is really a pull request
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct RestComment {
    id: u64,
    user: Option<RestUser>,
    created_at: DateTime<Utc>,
    issue_url: String,
}

impl RestComment {
    fn issue_number(&self) -> u64 {
        self.issue_url
            .rsplit('/')
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or_default()
    }
}

struct RestIssueFetcher<'a> {
    client: &'a GitHubClient,
    repo: &'a RepoRef,
    range: &'a DateRange,
}

impl PageFetcher for RestIssueFetcher<'_> {
    type Item = RestIssue;
    type Output = Issue;

    fn fetch_page(&self, request: &PageRequest) -> GitHubResult<Page<RestIssue>> {
        let path = match &request.cursor {
            Some(next) => next.clone(),
            None => format!(
                "/repos/{}/{}/issues?state=all&sort=created&direction=desc&per_page={}",
                self.repo.owner,
                self.repo.name,
                self.client.per_page()
            ),
        };
        let (items, next): (Vec<RestIssue>, _) = self.client.get_json(&path)?;
        Ok(Page {
            items,
            has_next: next.is_some(),
            next_cursor: next,
        })
    }

    fn convert(&self, item: RestIssue) -> Issue {
        Issue {
            number: item.number,
            repository: self.repo.key(),
            title: item.title,
            state: issue_state(&item.state),
            author: rest_identity(item.user.as_ref()),
            created_at: item.created_at,
            closed_at: item.closed_at,
            comment_count: item.comments as u32,
        }
    }

    fn filter(&self, item: &RestIssue) -> DateFilter {
        date_filter(self.range, item.created_at)
    }

    fn should_skip(&self, item: &RestIssue) -> bool {
        item.pull_request.is_some()
    }
}

struct RestCommentFetcher<'a> {
    client: &'a GitHubClient,
    repo: &'a RepoRef,
    range: &'a DateRange,
}

impl PageFetcher for RestCommentFetcher<'_> {
    type Item = RestComment;
    type Output = IssueComment;

    fn fetch_page(&self, request: &PageRequest) -> GitHubResult<Page<RestComment>> {
        let path = match &request.cursor {
            Some(next) => next.clone(),
            None => format!(
                "/repos/{}/{}/issues/comments?sort=created&direction=desc&per_page={}",
                self.repo.owner,
                self.repo.name,
                self.client.per_page()
            ),
        };
        let (items, next): (Vec<RestComment>, _) = self.client.get_json(&path)?;
        Ok(Page {
            items,
            has_next: next.is_some(),
            next_cursor: next,
        })
    }

    fn convert(&self, item: RestComment) -> IssueComment {
        IssueComment {
            id: item.id,
            repository: self.repo.key(),
            issue_number: item.issue_number(),
            author: rest_identity(item.user.as_ref()),
            created_at: item.created_at,
        }
    }

    fn filter(&self, item: &RestComment) -> DateFilter {
        date_filter(self.range, item.created_at)
    }
}

/// Issues and the repository comment feed over REST.
pub struct RestIssues<'a> {
    pub client: &'a GitHubClient,
}

impl FetchStrategy for RestIssues<'_> {
    type Output = IssueActivity;

    fn name(&self) -> &'static str {
        "REST"
    }

    fn fetch(
        &self,
        engine: &FetchEngine<'_>,
        repo: &RepoRef,
        range: &DateRange,
    ) -> GitHubResult<IssueActivity> {
        let issues = engine.fetch_all(
            Some(&cache_key("issues-rest", repo, range)),
            &RestIssueFetcher {
                client: self.client,
                repo,
                range,
            },
        )?;
        let comments = engine.fetch_all(
            Some(&cache_key("issue-comments-rest", repo, range)),
            &RestCommentFetcher {
                client: self.client,
                repo,
                range,
            },
        )?;
        Ok(IssueActivity::from_feed(issues, comments))
    }
}

/// Fetch issues and comments, preferring GraphQL and falling back to REST.
pub fn fetch_issues(
    client: &GitHubClient,
    engine: &FetchEngine<'_>,
    repo: &RepoRef,
    range: &DateRange,
) -> GitHubResult<IssueActivity> {
    let graphql = GraphQlIssues { client };
    let rest = RestIssues { client };
    let preferred = client.has_graphql().then_some(&graphql);
    fetch_with_fallback(preferred, &rest, engine, repo, range)
}
