//! Contribution metrics
//!
//! [`aggregate`] turns reconciled raw data into a [`GlobalMetrics`] value:
//! counters per contributor, per repository, per team and per timeline
//! period. Every event is first bucketed by canonical login × repository ×
//! period label; all roll-ups are sums over those buckets, so a
//! contributor's totals always equal the sum of their repository and
//! timeline entries.
//!
//! Nothing here performs I/O or reads the clock. Scores, the leaderboard
//! and the achievement index are filled in afterwards by
//! [`crate::scoring::score_all`].

mod aggregate;
mod patterns;
mod period;

pub use aggregate::{aggregate, AggregateOptions, SMALL_PR_LINES};
pub use patterns::{is_weekend, longest_streak, work_week_streak, ActivityPattern};
pub use period::{range_label, Granularity};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::classifier::LineStats;
use crate::scoring::{Achievements, LeaderboardEntry, Score};

/// Additive activity counters.
///
/// Averages and streaks are derived from private accumulators by
/// [`Counters::finalize`]; they are not summed directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Counters {
    pub commits: u64,
    pub merge_commits: u64,
    pub lines: LineStats,
    pub files_changed: u64,
    pub commits_with_tests: u64,

    pub prs_opened: u64,
    pub prs_merged: u64,
    /// Closed without being merged
    pub prs_closed: u64,
    /// Merged with no "changes requested" review
    pub perfect_prs: u64,
    /// Opened with fewer than [`SMALL_PR_LINES`] changed lines
    pub small_prs: u64,
    pub avg_pr_size: f64,
    pub avg_time_to_merge_hours: Option<f64>,

    pub reviews: u64,
    pub approvals: u64,
    pub changes_requested: u64,
    pub review_comments: u64,
    /// Fast-review tiers count each (reviewer, pull request) pair once, in
    /// the best tier reached.
    pub fast_reviews_1h: u64,
    pub fast_reviews_4h: u64,
    pub fast_reviews_24h: u64,
    pub avg_review_response_hours: Option<f64>,

    pub issues_opened: u64,
    pub issue_comments: u64,

    pub activity: ActivityPattern,
    pub active_days: u32,
    pub longest_streak: u32,
    pub work_week_streak: u32,
    pub repositories: BTreeSet<String>,

    #[serde(skip)]
    pub(crate) days: BTreeSet<NaiveDate>,
    #[serde(skip)]
    pub(crate) pr_size_total: u64,
    #[serde(skip)]
    pub(crate) merge_hours_total: f64,
    #[serde(skip)]
    pub(crate) review_hours_total: f64,
    #[serde(skip)]
    pub(crate) review_hours_count: u64,
}

impl Counters {
    /// Review plus issue comments.
    pub fn comments(&self) -> u64 {
        self.review_comments + self.issue_comments
    }

    pub fn fast_reviews(&self) -> u64 {
        self.fast_reviews_1h + self.fast_reviews_4h + self.fast_reviews_24h
    }

    /// Mark `date` as a day with qualifying activity.
    pub fn mark_active(&mut self, date: NaiveDate) {
        self.days.insert(date);
    }

    /// Fold another bucket into this one. Call [`Counters::finalize`]
    /// once all buckets are in.
    pub fn add(&mut self, other: &Counters) {
        self.commits += other.commits;
        self.merge_commits += other.merge_commits;
        self.lines += other.lines;
        self.files_changed += other.files_changed;
        self.commits_with_tests += other.commits_with_tests;
        self.prs_opened += other.prs_opened;
        self.prs_merged += other.prs_merged;
        self.prs_closed += other.prs_closed;
        self.perfect_prs += other.perfect_prs;
        self.small_prs += other.small_prs;
        self.reviews += other.reviews;
        self.approvals += other.approvals;
        self.changes_requested += other.changes_requested;
        self.review_comments += other.review_comments;
        self.fast_reviews_1h += other.fast_reviews_1h;
        self.fast_reviews_4h += other.fast_reviews_4h;
        self.fast_reviews_24h += other.fast_reviews_24h;
        self.issues_opened += other.issues_opened;
        self.issue_comments += other.issue_comments;
        self.activity.add(&other.activity);
        self.repositories.extend(other.repositories.iter().cloned());
        self.days.extend(other.days.iter().copied());
        self.pr_size_total += other.pr_size_total;
        self.merge_hours_total += other.merge_hours_total;
        self.review_hours_total += other.review_hours_total;
        self.review_hours_count += other.review_hours_count;
    }

    /// Derive averages and streaks from the accumulated totals.
    pub fn finalize(&mut self) {
        self.avg_pr_size = if self.prs_opened > 0 {
            self.pr_size_total as f64 / self.prs_opened as f64
        } else {
            0.0
        };
        self.avg_time_to_merge_hours = average(self.merge_hours_total, self.prs_merged);
        self.avg_review_response_hours = average(self.review_hours_total, self.review_hours_count);
        self.active_days = self.days.len() as u32;
        self.longest_streak = longest_streak(&self.days);
        self.work_week_streak = work_week_streak(&self.days);
    }
}

fn average(total: f64, count: u64) -> Option<f64> {
    if count == 0 {
        None
    } else {
        Some(total / count as f64)
    }
}

/// One canonical contributor's metrics, with score once scored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContributorMetrics {
    pub login: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(flatten)]
    pub counters: Counters,
    #[serde(default)]
    pub score: Score,
    #[serde(default)]
    pub achievements: Achievements,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryMetrics {
    pub repository: String,
    pub totals: Counters,
    pub contributors: BTreeMap<String, ContributorMetrics>,
}

/// A configured group of canonical logins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamMetrics {
    pub name: String,
    pub color: Option<String>,
    /// Configured members, lower-cased and sorted
    pub members: Vec<String>,
    /// Members with any activity in the period
    pub active_members: Vec<String>,
    pub totals: Counters,
    /// Sum of active members' scores
    pub score: i64,
}

/// One timeline bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodMetrics {
    pub label: String,
    pub totals: Counters,
    pub contributors: BTreeMap<String, ContributorMetrics>,
}

/// The reporting window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub granularity: Granularity,
    pub label: String,
}

/// Everything the rendering layer needs for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalMetrics {
    pub period: Period,
    pub totals: Counters,
    pub contributors: BTreeMap<String, ContributorMetrics>,
    pub repositories: BTreeMap<String, RepositoryMetrics>,
    pub teams: BTreeMap<String, TeamMetrics>,
    pub timeline: BTreeMap<String, PeriodMetrics>,
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Achievement id to the sorted logins that earned it
    pub achievements: BTreeMap<String, Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_add_then_finalize() {
        let mut a = Counters {
            commits: 2,
            prs_opened: 1,
            pr_size_total: 40,
            prs_merged: 1,
            merge_hours_total: 10.0,
            ..Default::default()
        };
        a.mark_active(day(4));
        a.mark_active(day(5));
        a.repositories.insert("acme/a".into());

        let mut b = Counters {
            commits: 3,
            prs_opened: 1,
            pr_size_total: 160,
            review_hours_total: 6.0,
            review_hours_count: 2,
            ..Default::default()
        };
        b.mark_active(day(5));
        b.mark_active(day(6));
        b.repositories.insert("acme/b".into());

        let mut total = Counters::default();
        total.add(&a);
        total.add(&b);
        total.finalize();

        assert_eq!(total.commits, 5);
        assert_eq!(total.avg_pr_size, 100.0);
        assert_eq!(total.avg_time_to_merge_hours, Some(10.0));
        assert_eq!(total.avg_review_response_hours, Some(3.0));
        assert_eq!(total.active_days, 3);
        assert_eq!(total.longest_streak, 3);
        assert_eq!(total.repositories.len(), 2);
    }

    #[test]
    fn test_empty_averages() {
        let mut counters = Counters::default();
        counters.finalize();
        assert_eq!(counters.avg_pr_size, 0.0);
        assert_eq!(counters.avg_time_to_merge_hours, None);
        assert_eq!(counters.longest_streak, 0);
    }
}
