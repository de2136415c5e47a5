//! Event bucketing and roll-ups

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use super::{
    range_label, ContributorMetrics, Counters, GlobalMetrics, Granularity, Period,
    PeriodMetrics, RepositoryMetrics, Team, TeamMetrics,
};
use crate::identity::IdentityMap;
use crate::models::{hours_between, DateRange, PrState, PullRequest, RawData, ReviewState};

/// A pull request with fewer changed lines than this is "small".
pub const SMALL_PR_LINES: u64 = 100;

const FAST_REVIEW_TIERS: [f64; 3] = [1.0, 4.0, 24.0];

#[derive(Debug, Clone, Default)]
pub struct AggregateOptions {
    pub range: DateRange,
    pub granularity: Granularity,
    pub teams: Vec<Team>,
}

/// (login, repository, period label)
type CellKey = (String, String, String);

struct Cube<'a> {
    options: &'a AggregateOptions,
    cells: BTreeMap<CellKey, Counters>,
}

impl<'a> Cube<'a> {
    fn new(options: &'a AggregateOptions) -> Self {
        Self {
            options,
            cells: BTreeMap::new(),
        }
    }

    fn in_range(&self, ts: DateTime<Utc>) -> bool {
        self.options.range.contains(ts)
    }

    fn cell(&mut self, login: &str, repository: &str, date: NaiveDate) -> &mut Counters {
        let period = self.options.granularity.label(date, &self.options.range);
        self.cells
            .entry((login.to_string(), repository.to_string(), period))
            .or_insert_with(|| Counters {
                repositories: [repository.to_string()].into_iter().collect(),
                ..Default::default()
            })
    }
}

/// Bucket every in-range event and build all roll-ups.
pub fn aggregate(raw: &RawData, identities: &IdentityMap, options: &AggregateOptions) -> GlobalMetrics {
    let mut cube = Cube::new(options);

    let mut seen = HashSet::new();
    for commit in &raw.commits {
        if !seen.insert((commit.repository.as_str(), commit.hash.as_str())) {
            continue;
        }
        if !cube.in_range(commit.timestamp.with_timezone(&Utc)) {
            continue;
        }
        let login = identities.canonical(&commit.author);
        // Local calendar date, matching the activity pattern
        let date = commit.timestamp.date_naive();
        let cell = cube.cell(&login, &commit.repository, date);
        cell.commits += 1;
        if commit.is_merge {
            cell.merge_commits += 1;
        }
        cell.lines += commit.stats;
        cell.files_changed += commit.files_changed as u64;
        if commit.has_tests {
            cell.commits_with_tests += 1;
        }
        cell.activity.record(commit.timestamp);
        cell.mark_active(date);
    }

    for pr in &raw.pull_requests {
        add_pull_request(&mut cube, identities, pr);
    }

    for issue in &raw.issues {
        if !cube.in_range(issue.created_at) {
            continue;
        }
        let login = identities.canonical(&issue.author);
        let date = issue.created_at.date_naive();
        let cell = cube.cell(&login, &issue.repository, date);
        cell.issues_opened += 1;
        cell.mark_active(date);
    }

    for comment in &raw.issue_comments {
        if !cube.in_range(comment.created_at) {
            continue;
        }
        let login = identities.canonical(&comment.author);
        cube.cell(&login, &comment.repository, comment.created_at.date_naive())
            .issue_comments += 1;
    }

    debug!("Aggregated {} contributor buckets", cube.cells.len());
    roll_up(cube.cells, identities, options)
}

fn add_pull_request(cube: &mut Cube<'_>, identities: &IdentityMap, pr: &PullRequest) {
    let author = identities.canonical(&pr.author);
    let repo = pr.repository.as_str();

    if cube.in_range(pr.created_at) {
        let date = pr.created_at.date_naive();
        let cell = cube.cell(&author, repo, date);
        cell.prs_opened += 1;
        cell.pr_size_total += pr.size();
        if pr.size() < SMALL_PR_LINES {
            cell.small_prs += 1;
        }
        cell.mark_active(date);
    }

    match pr.merged_at {
        Some(merged_at) if cube.in_range(merged_at) => {
            let cell = cube.cell(&author, repo, merged_at.date_naive());
            cell.prs_merged += 1;
            cell.merge_hours_total += pr
                .time_to_merge_hours
                .unwrap_or_else(|| hours_between(pr.created_at, merged_at));
            if !pr
                .reviews
                .iter()
                .any(|r| r.state == ReviewState::ChangesRequested)
            {
                cell.perfect_prs += 1;
            }
        }
        Some(_) => {}
        None => {
            if let Some(closed_at) = pr.closed_at.filter(|_| pr.state == PrState::Closed) {
                if cube.in_range(closed_at) {
                    cube.cell(&author, repo, closed_at.date_naive()).prs_closed += 1;
                }
            }
        }
    }

    // Earliest counted review per reviewer, for the fast-review tiers
    let mut first_review: BTreeMap<String, (f64, NaiveDate)> = BTreeMap::new();
    for review in &pr.reviews {
        let Some(submitted_at) = review.submitted_at else {
            continue;
        };
        if review.state == ReviewState::Pending || !cube.in_range(submitted_at) {
            continue;
        }
        let reviewer = identities.canonical(&review.author);
        if reviewer == author {
            continue;
        }
        let date = submitted_at.date_naive();
        let hours = review
            .response_time_hours
            .unwrap_or_else(|| hours_between(pr.created_at, submitted_at));

        let cell = cube.cell(&reviewer, repo, date);
        cell.reviews += 1;
        match review.state {
            ReviewState::Approved => cell.approvals += 1,
            ReviewState::ChangesRequested => cell.changes_requested += 1,
            _ => {}
        }
        cell.review_comments += review.comment_count as u64;
        cell.review_hours_total += hours;
        cell.review_hours_count += 1;
        cell.mark_active(date);

        first_review
            .entry(reviewer)
            .and_modify(|best| {
                if hours < best.0 {
                    *best = (hours, date);
                }
            })
            .or_insert((hours, date));
    }

    for (reviewer, (hours, date)) in first_review {
        let cell = cube.cell(&reviewer, repo, date);
        if hours < FAST_REVIEW_TIERS[0] {
            cell.fast_reviews_1h += 1;
        } else if hours < FAST_REVIEW_TIERS[1] {
            cell.fast_reviews_4h += 1;
        } else if hours < FAST_REVIEW_TIERS[2] {
            cell.fast_reviews_24h += 1;
        }
    }
}

fn contributor(identities: &IdentityMap, login: &str, counters: Counters) -> ContributorMetrics {
    let display = identities.display(login);
    ContributorMetrics {
        login: login.to_string(),
        name: display.name,
        avatar_url: display.avatar_url,
        counters,
        ..Default::default()
    }
}

fn finalize_all(
    sums: BTreeMap<String, Counters>,
    identities: &IdentityMap,
) -> BTreeMap<String, ContributorMetrics> {
    sums.into_iter()
        .map(|(login, mut counters)| {
            counters.finalize();
            let metrics = contributor(identities, &login, counters);
            (login, metrics)
        })
        .collect()
}

fn total_of(contributors: &BTreeMap<String, ContributorMetrics>) -> Counters {
    let mut totals = Counters::default();
    for metrics in contributors.values() {
        totals.add(&metrics.counters);
    }
    totals.finalize();
    totals
}

fn roll_up(
    cells: BTreeMap<CellKey, Counters>,
    identities: &IdentityMap,
    options: &AggregateOptions,
) -> GlobalMetrics {
    let mut by_login: BTreeMap<String, Counters> = BTreeMap::new();
    let mut by_repo: BTreeMap<String, BTreeMap<String, Counters>> = BTreeMap::new();
    let mut by_period: BTreeMap<String, BTreeMap<String, Counters>> = BTreeMap::new();

    for ((login, repo, period), counters) in &cells {
        by_login.entry(login.clone()).or_default().add(counters);
        by_repo
            .entry(repo.clone())
            .or_default()
            .entry(login.clone())
            .or_default()
            .add(counters);
        by_period
            .entry(period.clone())
            .or_default()
            .entry(login.clone())
            .or_default()
            .add(counters);
    }

    let contributors = finalize_all(by_login, identities);

    let repositories = by_repo
        .into_iter()
        .map(|(repo, logins)| {
            let contributors = finalize_all(logins, identities);
            let metrics = RepositoryMetrics {
                repository: repo.clone(),
                totals: total_of(&contributors),
                contributors,
            };
            (repo, metrics)
        })
        .collect();

    let timeline = by_period
        .into_iter()
        .map(|(label, logins)| {
            let contributors = finalize_all(logins, identities);
            let metrics = PeriodMetrics {
                label: label.clone(),
                totals: total_of(&contributors),
                contributors,
            };
            (label, metrics)
        })
        .collect();

    let teams = options
        .teams
        .iter()
        .map(|team| (team.name.clone(), team_metrics(team, &contributors)))
        .collect();

    GlobalMetrics {
        period: Period {
            since: options.range.since,
            until: options.range.until,
            granularity: options.granularity,
            label: range_label(&options.range),
        },
        totals: total_of(&contributors),
        contributors,
        repositories,
        teams,
        timeline,
        leaderboard: Vec::new(),
        achievements: BTreeMap::new(),
    }
}

fn team_metrics(team: &Team, contributors: &BTreeMap<String, ContributorMetrics>) -> TeamMetrics {
    let mut members: Vec<String> = team
        .members
        .iter()
        .map(|m| m.trim().to_lowercase())
        .filter(|m| !m.is_empty())
        .collect();
    members.sort();
    members.dedup();

    let mut totals = Counters::default();
    let mut active_members = Vec::new();
    for member in &members {
        if let Some(metrics) = contributors.get(member) {
            totals.add(&metrics.counters);
            active_members.push(member.clone());
        }
    }
    totals.finalize();

    TeamMetrics {
        name: team.name.clone(),
        color: team.color.clone(),
        members,
        active_members,
        totals,
        score: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::LineStats;
    use crate::identity::{reconcile, Alias};
    use crate::models::{Commit, Identity, Issue, IssueComment, IssueState, LoginSource, Review};
    use chrono::{DateTime, FixedOffset};

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn local(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn commit(hash: &str, repo: &str, name: &str, email: &str, at: &str) -> Commit {
        let author = Identity::from_signature(
            name,
            email,
            crate::git::slugify(name),
            LoginSource::NameSlug,
        );
        Commit {
            hash: hash.into(),
            repository: repo.into(),
            committer: author.clone(),
            author,
            timestamp: local(at),
            message: "change".into(),
            stats: LineStats {
                additions: 3,
                meaningful_additions: 2,
                comment_additions: 1,
                ..Default::default()
            },
            files_changed: 1,
            has_tests: false,
            is_merge: false,
        }
    }

    fn review(id: u64, login: &str, state: ReviewState, at: &str) -> Review {
        Review {
            id,
            pr_number: 1,
            author: Identity::from_login(login),
            state,
            submitted_at: Some(utc(at)),
            body: String::new(),
            comment_count: 1,
            response_time_hours: None,
        }
    }

    fn pull(number: u64, login: &str, created: &str, merged: Option<&str>, reviews: Vec<Review>) -> PullRequest {
        let mut pr = PullRequest {
            number,
            repository: "acme/widgets".into(),
            title: format!("PR {}", number),
            state: if merged.is_some() { PrState::Merged } else { PrState::Open },
            author: Identity::from_login(login),
            base_branch: "main".into(),
            head_branch: "topic".into(),
            created_at: utc(created),
            merged_at: merged.map(utc),
            closed_at: merged.map(utc),
            additions: 30,
            deletions: 20,
            files_changed: 2,
            commit_count: 1,
            reviews,
            time_to_merge_hours: None,
            time_to_first_review_hours: None,
        };
        pr.compute_derived();
        pr
    }

    fn march() -> AggregateOptions {
        AggregateOptions {
            range: DateRange::from_dates(
                NaiveDate::from_ymd_opt(2024, 3, 1),
                NaiveDate::from_ymd_opt(2024, 3, 31),
            ),
            granularity: Granularity::Weekly,
            teams: Vec::new(),
        }
    }

    #[test]
    fn test_alias_combines_commits_and_pull_requests() {
        let raw = RawData {
            commits: vec![
                commit("c1", "acme/widgets", "J. Doe", "jdoe@company.com", "2024-03-04T10:00:00+00:00"),
                commit("c2", "acme/widgets", "J. Doe", "jdoe@company.com", "2024-03-05T10:00:00+00:00"),
            ],
            pull_requests: vec![pull(1, "johndoe", "2024-03-05T12:00:00Z", None, Vec::new())],
            ..Default::default()
        };
        let aliases = vec![Alias {
            login: "johndoe".into(),
            emails: vec!["jdoe@company.com".into()],
            names: Vec::new(),
        }];
        let reviews = raw.pull_requests.iter().flat_map(|pr| &pr.reviews);
        let identities = reconcile(&raw.commits, &raw.pull_requests, reviews, &Default::default(), &aliases);
        let metrics = aggregate(&raw, &identities, &march());

        assert_eq!(metrics.contributors.len(), 1);
        let john = &metrics.contributors["johndoe"].counters;
        assert_eq!(john.commits, 2);
        assert_eq!(john.prs_opened, 1);
        assert_eq!(john.small_prs, 1);
        assert_eq!(john.active_days, 2);
    }

    #[test]
    fn test_commit_counts_are_not_double_counted() {
        let raw = RawData {
            commits: vec![
                commit("c1", "acme/widgets", "Ann", "ann@x.io", "2024-03-04T10:00:00+00:00"),
                commit("c1", "acme/widgets", "Ann", "ann@x.io", "2024-03-04T10:00:00+00:00"),
                // Same hash in another repository is another commit
                commit("c1", "acme/gadgets", "Ann", "ann@x.io", "2024-03-04T10:00:00+00:00"),
                commit("c2", "acme/widgets", "Bob", "bob@x.io", "2024-03-11T10:00:00+00:00"),
                // Out of range
                commit("c3", "acme/widgets", "Bob", "bob@x.io", "2024-04-02T10:00:00+00:00"),
            ],
            ..Default::default()
        };
        let identities = IdentityMap::default();
        let metrics = aggregate(&raw, &identities, &march());

        let total: u64 = metrics.contributors.values().map(|c| c.counters.commits).sum();
        assert_eq!(total, 3);
        assert_eq!(metrics.totals.commits, 3);
        assert_eq!(metrics.contributors["ann"].counters.repositories.len(), 2);
        assert_eq!(metrics.repositories["acme/widgets"].totals.commits, 2);
        assert_eq!(metrics.totals.lines.meaningful_additions, 6);

        // Timeline buckets sum to the same totals
        let timeline_total: u64 = metrics.timeline.values().map(|p| p.totals.commits).sum();
        assert_eq!(timeline_total, 3);
        assert_eq!(
            metrics.timeline.keys().cloned().collect::<Vec<_>>(),
            vec!["2024-W10".to_string(), "2024-W11".to_string()]
        );
    }

    #[test]
    fn test_pull_request_stats() {
        let reviews = vec![
            // Author's own review is ignored
            review(1, "alice", ReviewState::Commented, "2024-03-04T10:10:00Z"),
            review(2, "bob", ReviewState::Commented, "2024-03-04T10:30:00Z"),
            review(3, "bob", ReviewState::Approved, "2024-03-04T15:00:00Z"),
            review(4, "carol", ReviewState::Approved, "2024-03-04T13:00:00Z"),
        ];
        let raw = RawData {
            pull_requests: vec![
                pull(1, "alice", "2024-03-04T10:00:00Z", Some("2024-03-05T10:00:00Z"), reviews),
                pull(
                    2,
                    "alice",
                    "2024-03-06T10:00:00Z",
                    Some("2024-03-06T12:00:00Z"),
                    vec![review(5, "bob", ReviewState::ChangesRequested, "2024-03-06T11:00:00Z")],
                ),
            ],
            ..Default::default()
        };
        let metrics = aggregate(&raw, &IdentityMap::default(), &march());

        let alice = &metrics.contributors["alice"].counters;
        assert_eq!(alice.prs_opened, 2);
        assert_eq!(alice.prs_merged, 2);
        assert_eq!(alice.perfect_prs, 1);
        assert_eq!(alice.avg_pr_size, 50.0);
        assert_eq!(alice.avg_time_to_merge_hours, Some(13.0));
        assert_eq!(alice.reviews, 0);

        let bob = &metrics.contributors["bob"].counters;
        assert_eq!(bob.reviews, 3);
        assert_eq!(bob.approvals, 1);
        assert_eq!(bob.changes_requested, 1);
        assert_eq!(bob.review_comments, 3);
        // One pair per pull request: 0.5h on #1, 1h on #2
        assert_eq!(bob.fast_reviews_1h, 1);
        assert_eq!(bob.fast_reviews_4h, 1);
        assert_eq!(bob.fast_reviews(), 2);

        let carol = &metrics.contributors["carol"].counters;
        assert_eq!(carol.fast_reviews_24h, 0);
        assert_eq!(carol.fast_reviews_4h, 1);
    }

    #[test]
    fn test_issues_and_teams() {
        let raw = RawData {
            issues: vec![Issue {
                number: 9,
                repository: "acme/widgets".into(),
                title: "Bug".into(),
                state: IssueState::Open,
                author: Identity::from_login("Dana"),
                created_at: utc("2024-03-08T09:00:00Z"),
                closed_at: None,
                comment_count: 1,
            }],
            issue_comments: vec![IssueComment {
                id: 1,
                repository: "acme/widgets".into(),
                issue_number: 9,
                author: Identity::from_login("eve"),
                created_at: utc("2024-03-09T09:00:00Z"),
            }],
            ..Default::default()
        };
        let mut options = march();
        options.teams = vec![Team {
            name: "core".into(),
            members: vec!["DANA".into(), "frank".into()],
            color: Some("#ff0000".into()),
        }];
        let metrics = aggregate(&raw, &IdentityMap::default(), &options);

        assert_eq!(metrics.contributors["dana"].counters.issues_opened, 1);
        assert_eq!(metrics.contributors["eve"].counters.issue_comments, 1);
        let core = &metrics.teams["core"];
        assert_eq!(core.members, vec!["dana".to_string(), "frank".to_string()]);
        assert_eq!(core.active_members, vec!["dana".to_string()]);
        assert_eq!(core.totals.issues_opened, 1);
        // eve belongs to no team and is simply left out
        assert_eq!(core.totals.issue_comments, 0);
        assert_eq!(metrics.period.label, "2024-03-01..2024-03-31");
    }
}
