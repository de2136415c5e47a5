//! Contribution scoring
//!
//! Scores are purely additive:
//!
//! ```text
//! total = commits × commit
//!       + PRs opened × pr_opened + PRs merged × pr_merged
//!       + reviews × review + comments × comment
//!       + lines × per_line            (meaningful lines only by default)
//!       + fast reviews × tier bonus   (one tier per reviewer per PR)
//!       + out-of-hours commits × out_of_hours
//! ```
//!
//! Achievements come from a fixed table (see [`ACHIEVEMENT_TABLE`]). Nothing
//! here does I/O; identical metrics always give identical results.

mod achievements;

pub use achievements::{
    catalog, evaluate, Achievement, AchievementCategory, AchievementRarity, Achievements, Metric,
    ACHIEVEMENT_TABLE,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::metrics::{ContributorMetrics, Counters, GlobalMetrics};

/// Points per event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointConfig {
    #[serde(default = "default_commit")]
    pub commit: i64,
    #[serde(default = "default_pr_opened")]
    pub pr_opened: i64,
    #[serde(default = "default_pr_merged")]
    pub pr_merged: i64,
    #[serde(default = "default_review")]
    pub review: i64,
    #[serde(default = "default_comment")]
    pub comment: i64,
    #[serde(default = "default_per_line")]
    pub per_line: f64,
    /// Count only meaningful lines (not comments or blank lines)
    #[serde(default = "default_true")]
    pub meaningful_lines_only: bool,
    #[serde(default = "default_fast_review_1h")]
    pub fast_review_1h: i64,
    #[serde(default = "default_fast_review_4h")]
    pub fast_review_4h: i64,
    #[serde(default = "default_fast_review_24h")]
    pub fast_review_24h: i64,
    #[serde(default = "default_out_of_hours")]
    pub out_of_hours: i64,
}

fn default_commit() -> i64 {
    10
}
fn default_pr_opened() -> i64 {
    25
}
fn default_pr_merged() -> i64 {
    50
}
fn default_review() -> i64 {
    30
}
fn default_comment() -> i64 {
    5
}
fn default_per_line() -> f64 {
    0.1
}
fn default_true() -> bool {
    true
}
fn default_fast_review_1h() -> i64 {
    50
}
fn default_fast_review_4h() -> i64 {
    25
}
fn default_fast_review_24h() -> i64 {
    10
}
fn default_out_of_hours() -> i64 {
    5
}

impl Default for PointConfig {
    fn default() -> Self {
        Self {
            commit: default_commit(),
            pr_opened: default_pr_opened(),
            pr_merged: default_pr_merged(),
            review: default_review(),
            comment: default_comment(),
            per_line: default_per_line(),
            meaningful_lines_only: true,
            fast_review_1h: default_fast_review_1h(),
            fast_review_4h: default_fast_review_4h(),
            fast_review_24h: default_fast_review_24h(),
            out_of_hours: default_out_of_hours(),
        }
    }
}

/// Points per source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub commits: i64,
    pub prs_opened: i64,
    pub prs_merged: i64,
    pub reviews: i64,
    pub comments: i64,
    pub lines: i64,
    pub fast_reviews: i64,
    pub out_of_hours: i64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> i64 {
        self.commits
            + self.prs_opened
            + self.prs_merged
            + self.reviews
            + self.comments
            + self.lines
            + self.fast_reviews
            + self.out_of_hours
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub total: i64,
    pub breakdown: ScoreBreakdown,
    /// Leaderboard position; only set for run-wide contributor metrics
    pub rank: Option<u32>,
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub login: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub score: i64,
    pub commits: u64,
    pub prs_merged: u64,
    pub reviews: u64,
    pub achievements: usize,
}

fn count(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Score one set of counters.
pub fn score(counters: &Counters, points: &PointConfig) -> (ScoreBreakdown, Achievements) {
    let lines = if points.meaningful_lines_only {
        counters.lines.meaningful_changes()
    } else {
        counters.lines.total_changes()
    };

    let breakdown = ScoreBreakdown {
        commits: count(counters.commits) * points.commit,
        prs_opened: count(counters.prs_opened) * points.pr_opened,
        prs_merged: count(counters.prs_merged) * points.pr_merged,
        reviews: count(counters.reviews) * points.review,
        comments: count(counters.comments()) * points.comment,
        lines: (lines as f64 * points.per_line).round() as i64,
        fast_reviews: count(counters.fast_reviews_1h) * points.fast_review_1h
            + count(counters.fast_reviews_4h) * points.fast_review_4h
            + count(counters.fast_reviews_24h) * points.fast_review_24h,
        out_of_hours: count(counters.activity.out_of_hours) * points.out_of_hours,
    };
    (breakdown, evaluate(counters))
}

fn annotate(metrics: &mut ContributorMetrics, points: &PointConfig) {
    let (breakdown, achievements) = score(&metrics.counters, points);
    metrics.score = Score {
        total: breakdown.total(),
        breakdown,
        rank: None,
    };
    metrics.achievements = achievements;
}

/// Score every contributor entry in `global`, then build the leaderboard,
/// team scores and the achievement index.
pub fn score_all(global: &mut GlobalMetrics, points: &PointConfig) {
    for metrics in global.contributors.values_mut() {
        annotate(metrics, points);
    }
    for repo in global.repositories.values_mut() {
        for metrics in repo.contributors.values_mut() {
            annotate(metrics, points);
        }
    }
    for period in global.timeline.values_mut() {
        for metrics in period.contributors.values_mut() {
            annotate(metrics, points);
        }
    }

    global.leaderboard = leaderboard(&global.contributors);
    for entry in &global.leaderboard {
        if let Some(metrics) = global.contributors.get_mut(&entry.login) {
            metrics.score.rank = Some(entry.rank);
        }
    }

    for team in global.teams.values_mut() {
        team.score = team
            .active_members
            .iter()
            .filter_map(|m| global.contributors.get(m))
            .map(|m| m.score.total)
            .sum();
    }

    let mut index: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (login, metrics) in &global.contributors {
        for id in &metrics.achievements.earned {
            index.entry(id.clone()).or_default().push(login.clone());
        }
    }
    global.achievements = index;
    debug!(
        "Scored {} contributors, {} achievements unlocked",
        global.contributors.len(),
        global.achievements.len()
    );
}

/// Sorted by score descending, then login; tied scores share a rank.
pub fn leaderboard(contributors: &BTreeMap<String, ContributorMetrics>) -> Vec<LeaderboardEntry> {
    let mut sorted: Vec<&ContributorMetrics> = contributors.values().collect();
    sorted.sort_by(|a, b| {
        b.score
            .total
            .cmp(&a.score.total)
            .then_with(|| a.login.cmp(&b.login))
    });

    let mut entries: Vec<LeaderboardEntry> = Vec::with_capacity(sorted.len());
    for (i, metrics) in sorted.into_iter().enumerate() {
        let rank = match entries.last() {
            Some(prev) if prev.score == metrics.score.total => prev.rank,
            _ => i as u32 + 1,
        };
        entries.push(LeaderboardEntry {
            rank,
            login: metrics.login.clone(),
            name: metrics.name.clone(),
            avatar_url: metrics.avatar_url.clone(),
            score: metrics.score.total,
            commits: metrics.counters.commits,
            prs_merged: metrics.counters.prs_merged,
            reviews: metrics.counters.reviews,
            achievements: metrics.achievements.earned.len(),
        });
    }
    entries
}
