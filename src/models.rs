//! Core data models for gitvelocity
//!
//! Raw event records produced by the local history extractor and the
//! GitHub fetchers. These are never mutated after they are produced
//! (apart from derived-field computation right after fetch); every later
//! stage only reads and projects them.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::classifier::LineStats;

/// A repository on the hosted provider, addressed as `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `owner/name` (a trailing `.git` is tolerated).
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim().trim_end_matches('/').trim_end_matches(".git");
        let (owner, name) = spec.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(owner, name))
    }

    /// Key used to bucket metrics per repository.
    pub fn key(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Where an identity's `login` came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginSource {
    /// Reported by the platform API
    #[default]
    Platform,
    /// Parsed from a `users.noreply` commit email
    Noreply,
    /// Slug of the display name; only a fallback key, not a real login
    NameSlug,
}

/// A raw author identity as seen by one data source.
///
/// Identities from git history usually lack a `login`; the identity
/// reconciler attaches one wherever it can.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub login_source: LoginSource,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub id: Option<u64>,
}

impl Identity {
    /// Identity known only by its platform login.
    pub fn from_login(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            ..Default::default()
        }
    }

    /// Identity as recorded in a git signature.
    pub fn from_signature(
        name: impl Into<String>,
        email: impl Into<String>,
        login: String,
        login_source: LoginSource,
    ) -> Self {
        Self {
            login,
            login_source,
            name: name.into(),
            email: email.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.login.is_empty() && self.name.is_empty() && self.email.is_empty()
    }

    /// A login that names a real platform account (not a name slug).
    pub fn platform_login(&self) -> Option<&str> {
        if self.login.is_empty() || self.login_source == LoginSource::NameSlug {
            None
        } else {
            Some(&self.login)
        }
    }
}

/// A commit extracted from local history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    /// Full commit hash
    pub hash: String,
    /// Repository key (`owner/name`)
    pub repository: String,
    pub author: Identity,
    pub committer: Identity,
    /// Author timestamp, in the author's own UTC offset
    pub timestamp: DateTime<FixedOffset>,
    /// Commit message (first line)
    pub message: String,
    /// Per-line change counts against the first parent
    pub stats: LineStats,
    /// Number of non-documentation files touched
    pub files_changed: usize,
    pub has_tests: bool,
    pub is_merge: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Pending,
    Dismissed,
}

impl ReviewState {
    /// Parse the provider's review state (`APPROVED`, `changes_requested`, ...).
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "APPROVED" => ReviewState::Approved,
            "CHANGES_REQUESTED" => ReviewState::ChangesRequested,
            "PENDING" => ReviewState::Pending,
            "DISMISSED" => ReviewState::Dismissed,
            _ => ReviewState::Commented,
        }
    }
}

/// A pull request review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    pub pr_number: u64,
    pub author: Identity,
    pub state: ReviewState,
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub body: String,
    pub comment_count: u32,
    /// Hours between PR creation and this review
    pub response_time_hours: Option<f64>,
}

/// A pull request with its reviews attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub repository: String,
    pub title: String,
    pub state: PrState,
    pub author: Identity,
    pub base_branch: String,
    pub head_branch: String,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub additions: u64,
    pub deletions: u64,
    pub files_changed: u64,
    pub commit_count: u64,
    #[serde(default)]
    pub reviews: Vec<Review>,
    pub time_to_merge_hours: Option<f64>,
    pub time_to_first_review_hours: Option<f64>,
}

impl PullRequest {
    /// Fill in the derived timing fields from timestamps and reviews.
    ///
    /// Called once right after fetch; nothing else mutates a pull request.
    pub fn compute_derived(&mut self) {
        self.time_to_merge_hours = self.merged_at.map(|m| hours_between(self.created_at, m));

        for review in &mut self.reviews {
            review.response_time_hours = review
                .submitted_at
                .map(|s| hours_between(self.created_at, s));
        }

        let author = self.author.login.to_lowercase();
        self.time_to_first_review_hours = self
            .reviews
            .iter()
            .filter(|r| r.author.login.to_lowercase() != author)
            .filter_map(|r| r.submitted_at)
            .min()
            .map(|first| hours_between(self.created_at, first));
    }

    pub fn is_merged(&self) -> bool {
        self.state == PrState::Merged || self.merged_at.is_some()
    }

    pub fn size(&self) -> u64 {
        self.additions + self.deletions
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub repository: String,
    pub title: String,
    pub state: IssueState,
    pub author: Identity,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub comment_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    pub repository: String,
    pub issue_number: u64,
    pub author: Identity,
    pub created_at: DateTime<Utc>,
}

/// Everything collected for a run, before identity reconciliation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawData {
    pub commits: Vec<Commit>,
    pub pull_requests: Vec<PullRequest>,
    pub issues: Vec<Issue>,
    pub issue_comments: Vec<IssueComment>,
}

impl RawData {
    /// Append another repository's data.
    pub fn merge(&mut self, other: RawData) {
        self.commits.extend(other.commits);
        self.pull_requests.extend(other.pull_requests);
        self.issues.extend(other.issues);
        self.issue_comments.extend(other.issue_comments);
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
            && self.pull_requests.is_empty()
            && self.issues.is_empty()
            && self.issue_comments.is_empty()
    }
}

/// Inclusive date window; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        Self { since, until }
    }

    /// Build a range from calendar dates: `since` at 00:00:00 UTC,
    /// `until` at the end of that day.
    pub fn from_dates(since: Option<NaiveDate>, until: Option<NaiveDate>) -> Self {
        let since = since.map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)));
        let until = until.and_then(|d| {
            NaiveTime::from_hms_opt(23, 59, 59).map(|t| Utc.from_utc_datetime(&d.and_time(t)))
        });
        Self { since, until }
    }

    pub fn is_valid(&self) -> bool {
        match (self.since, self.until) {
            (Some(s), Some(u)) => s <= u,
            _ => true,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        !self.is_before(ts) && !self.is_after(ts)
    }

    /// True if `ts` predates the start of the window.
    pub fn is_before(&self, ts: DateTime<Utc>) -> bool {
        self.since.is_some_and(|s| ts < s)
    }

    /// True if `ts` is later than the end of the window.
    pub fn is_after(&self, ts: DateTime<Utc>) -> bool {
        self.until.is_some_and(|u| ts > u)
    }
}

pub(crate) fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds() as f64 / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_repo_ref_parse() {
        assert_eq!(RepoRef::parse("acme/widgets"), Some(RepoRef::new("acme", "widgets")));
        assert_eq!(RepoRef::parse("acme/widgets.git"), Some(RepoRef::new("acme", "widgets")));
        assert!(RepoRef::parse("widgets").is_none());
        assert!(RepoRef::parse("a/b/c").is_none());
        assert!(RepoRef::parse("/b").is_none());
    }

    #[test]
    fn test_date_range_bounds() {
        let range = DateRange::from_dates(
            NaiveDate::from_ymd_opt(2024, 3, 1),
            NaiveDate::from_ymd_opt(2024, 3, 31),
        );
        assert!(range.is_valid());
        assert!(range.contains(ts("2024-03-01T00:00:00Z")));
        assert!(range.contains(ts("2024-03-31T23:00:00Z")));
        assert!(range.is_before(ts("2024-02-29T23:59:59Z")));
        assert!(range.is_after(ts("2024-04-01T00:00:00Z")));

        let open = DateRange::default();
        assert!(open.contains(ts("1999-01-01T00:00:00Z")));
    }

    #[test]
    fn test_invalid_range() {
        let range = DateRange::from_dates(
            NaiveDate::from_ymd_opt(2024, 4, 1),
            NaiveDate::from_ymd_opt(2024, 3, 1),
        );
        assert!(!range.is_valid());
    }

    #[test]
    fn test_pull_request_derived_fields() {
        let created = ts("2024-03-01T10:00:00Z");
        let review = |login: &str, hours: i64| Review {
            id: hours as u64,
            pr_number: 7,
            author: Identity::from_login(login),
            state: ReviewState::Approved,
            submitted_at: Some(created + Duration::hours(hours)),
            body: String::new(),
            comment_count: 0,
            response_time_hours: None,
        };
        let mut pr = PullRequest {
            number: 7,
            repository: "acme/widgets".into(),
            title: "Add widget".into(),
            state: PrState::Merged,
            author: Identity::from_login("alice"),
            base_branch: "main".into(),
            head_branch: "feature".into(),
            created_at: created,
            merged_at: Some(created + Duration::hours(30)),
            closed_at: Some(created + Duration::hours(30)),
            additions: 10,
            deletions: 2,
            files_changed: 1,
            commit_count: 1,
            // The author's own comment does not count as a first review
            reviews: vec![review("alice", 1), review("bob", 5), review("carol", 3)],
            time_to_merge_hours: None,
            time_to_first_review_hours: None,
        };
        pr.compute_derived();
        assert_eq!(pr.time_to_merge_hours, Some(30.0));
        assert_eq!(pr.time_to_first_review_hours, Some(3.0));
        assert_eq!(pr.reviews[1].response_time_hours, Some(5.0));
        assert!(pr.is_merged());
        assert_eq!(pr.size(), 12);
    }

    #[test]
    fn test_review_state_parse() {
        assert_eq!(ReviewState::parse("APPROVED"), ReviewState::Approved);
        assert_eq!(ReviewState::parse("changes_requested"), ReviewState::ChangesRequested);
        assert_eq!(ReviewState::parse("COMMENTED"), ReviewState::Commented);
        assert_eq!(ReviewState::parse("DISMISSED"), ReviewState::Dismissed);
    }
}
