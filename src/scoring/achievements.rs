//! Fixed achievement table

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::metrics::Counters;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AchievementRarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

const RARITIES: [AchievementRarity; 5] = [
    AchievementRarity::Common,
    AchievementRarity::Uncommon,
    AchievementRarity::Rare,
    AchievementRarity::Epic,
    AchievementRarity::Legendary,
];

/// Counter an achievement category is measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Commits,
    PrsMerged,
    PerfectPrs,
    SmallPrs,
    Reviews,
    FastReviews,
    Comments,
    IssuesOpened,
    EarlyBird,
    NightOwl,
    Midnight,
    Weekend,
    LongestStreak,
    WorkWeekStreak,
    MeaningfulLines,
    CommitsWithTests,
    Repositories,
}

impl Metric {
    pub fn value(&self, c: &Counters) -> u64 {
        match self {
            Metric::Commits => c.commits,
            Metric::PrsMerged => c.prs_merged,
            Metric::PerfectPrs => c.perfect_prs,
            Metric::SmallPrs => c.small_prs,
            Metric::Reviews => c.reviews,
            Metric::FastReviews => c.fast_reviews(),
            Metric::Comments => c.comments(),
            Metric::IssuesOpened => c.issues_opened,
            Metric::EarlyBird => c.activity.early_bird,
            Metric::NightOwl => c.activity.night_owl,
            Metric::Midnight => c.activity.midnight,
            Metric::Weekend => c.activity.weekend,
            Metric::LongestStreak => c.longest_streak as u64,
            Metric::WorkWeekStreak => c.work_week_streak as u64,
            Metric::MeaningfulLines => c.lines.meaningful_changes(),
            Metric::CommitsWithTests => c.commits_with_tests,
            Metric::Repositories => c.repositories.len() as u64,
        }
    }
}

/// One category: a counter and ascending tier thresholds.
#[derive(Debug, Clone, Copy)]
pub struct AchievementCategory {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub metric: Metric,
    pub thresholds: &'static [u64],
}

/// Every achievement category. Not configurable.
pub const ACHIEVEMENT_TABLE: &[AchievementCategory] = &[
    AchievementCategory {
        id: "commits",
        name: "Committer",
        description: "Commits authored",
        metric: Metric::Commits,
        thresholds: &[10, 50, 100, 500, 1000],
    },
    AchievementCategory {
        id: "merged-prs",
        name: "Shipper",
        description: "Pull requests merged",
        metric: Metric::PrsMerged,
        thresholds: &[5, 25, 100, 250],
    },
    AchievementCategory {
        id: "perfect-prs",
        name: "Flawless",
        description: "Pull requests merged without requested changes",
        metric: Metric::PerfectPrs,
        thresholds: &[5, 25, 100],
    },
    AchievementCategory {
        id: "small-prs",
        name: "Bite Sized",
        description: "Small pull requests opened",
        metric: Metric::SmallPrs,
        thresholds: &[10, 50, 100],
    },
    AchievementCategory {
        id: "reviews",
        name: "Reviewer",
        description: "Reviews submitted on other people's pull requests",
        metric: Metric::Reviews,
        thresholds: &[10, 50, 200, 500],
    },
    AchievementCategory {
        id: "fast-reviews",
        name: "Quick Draw",
        description: "Pull requests reviewed within a day of opening",
        metric: Metric::FastReviews,
        thresholds: &[5, 25, 100],
    },
    AchievementCategory {
        id: "comments",
        name: "Conversationalist",
        description: "Review and issue comments",
        metric: Metric::Comments,
        thresholds: &[25, 100, 500],
    },
    AchievementCategory {
        id: "issues",
        name: "Bug Hunter",
        description: "Issues opened",
        metric: Metric::IssuesOpened,
        thresholds: &[5, 25, 100],
    },
    AchievementCategory {
        id: "early-bird",
        name: "Early Bird",
        description: "Commits before 09:00",
        metric: Metric::EarlyBird,
        thresholds: &[10, 50, 100],
    },
    AchievementCategory {
        id: "night-owl",
        name: "Night Owl",
        description: "Commits from 21:00",
        metric: Metric::NightOwl,
        thresholds: &[10, 50, 100],
    },
    AchievementCategory {
        id: "midnight",
        name: "Midnight Oil",
        description: "Commits between 00:00 and 04:00",
        metric: Metric::Midnight,
        thresholds: &[5, 25],
    },
    AchievementCategory {
        id: "weekend",
        name: "Weekend Warrior",
        description: "Commits on Saturday or Sunday",
        metric: Metric::Weekend,
        thresholds: &[10, 50, 100],
    },
    AchievementCategory {
        id: "streak",
        name: "On a Roll",
        description: "Consecutive active days",
        metric: Metric::LongestStreak,
        thresholds: &[3, 7, 14, 30],
    },
    AchievementCategory {
        id: "work-week-streak",
        name: "Steady",
        description: "Consecutive active weekdays",
        metric: Metric::WorkWeekStreak,
        thresholds: &[5, 10, 20],
    },
    AchievementCategory {
        id: "meaningful-lines",
        name: "Wordsmith",
        description: "Meaningful lines changed",
        metric: Metric::MeaningfulLines,
        thresholds: &[1000, 10000, 50000],
    },
    AchievementCategory {
        id: "tested-commits",
        name: "Test Pilot",
        description: "Commits touching tests",
        metric: Metric::CommitsWithTests,
        thresholds: &[10, 50, 100],
    },
    AchievementCategory {
        id: "repositories",
        name: "Explorer",
        description: "Repositories contributed to",
        metric: Metric::Repositories,
        thresholds: &[3, 5, 10],
    },
];

/// A single unlockable tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub threshold: u64,
    pub rarity: AchievementRarity,
}

impl AchievementCategory {
    pub fn tier_id(&self, threshold: u64) -> String {
        format!("{}-{}", self.id, threshold)
    }

    pub fn tiers(&self) -> impl Iterator<Item = Achievement> + '_ {
        self.thresholds.iter().enumerate().map(move |(i, &threshold)| Achievement {
            id: self.tier_id(threshold),
            name: format!("{} {}", self.name, i + 1),
            description: format!("{}: {}", self.description, threshold),
            category: self.id.to_string(),
            threshold,
            rarity: RARITIES[i.min(RARITIES.len() - 1)],
        })
    }
}

/// Every tier of every category, in table order.
pub fn catalog() -> Vec<Achievement> {
    ACHIEVEMENT_TABLE.iter().flat_map(|c| c.tiers()).collect()
}

/// Tiers a contributor has unlocked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievements {
    /// Every tier met so far
    pub earned: BTreeSet<String>,
    /// Category id to its highest tier met
    pub current: BTreeMap<String, String>,
}

/// Evaluate the fixed table against `counters`.
pub fn evaluate(counters: &Counters) -> Achievements {
    let mut achievements = Achievements::default();
    for category in ACHIEVEMENT_TABLE {
        let value = category.metric.value(counters);
        for &threshold in category.thresholds.iter().filter(|&&t| value >= t) {
            let id = category.tier_id(threshold);
            achievements.earned.insert(id.clone());
            // Thresholds ascend, so the last one met wins
            achievements.current.insert(category.id.to_string(), id);
        }
    }
    achievements
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters_with(metric: Metric, value: u64) -> Counters {
        let mut c = Counters::default();
        match metric {
            Metric::Commits => c.commits = value,
            Metric::PrsMerged => c.prs_merged = value,
            Metric::PerfectPrs => c.perfect_prs = value,
            Metric::SmallPrs => c.small_prs = value,
            Metric::Reviews => c.reviews = value,
            Metric::FastReviews => c.fast_reviews_24h = value,
            Metric::Comments => c.issue_comments = value,
            Metric::IssuesOpened => c.issues_opened = value,
            Metric::EarlyBird => c.activity.early_bird = value,
            Metric::NightOwl => c.activity.night_owl = value,
            Metric::Midnight => c.activity.midnight = value,
            Metric::Weekend => c.activity.weekend = value,
            Metric::LongestStreak => c.longest_streak = value as u32,
            Metric::WorkWeekStreak => c.work_week_streak = value as u32,
            Metric::MeaningfulLines => c.lines.meaningful_additions = value,
            Metric::CommitsWithTests => c.commits_with_tests = value,
            Metric::Repositories => {
                c.repositories = (0..value).map(|i| format!("acme/repo-{}", i)).collect()
            }
        }
        c
    }

    #[test]
    fn test_every_threshold_is_exact() {
        for category in ACHIEVEMENT_TABLE {
            for &threshold in category.thresholds {
                let id = category.tier_id(threshold);
                let below = evaluate(&counters_with(category.metric, threshold - 1));
                let at = evaluate(&counters_with(category.metric, threshold));
                assert!(!below.earned.contains(&id), "{} unlocked below threshold", id);
                assert!(at.earned.contains(&id), "{} locked at threshold", id);
            }
        }
    }

    #[test]
    fn test_lower_tiers_stay_earned() {
        let achievements = evaluate(&counters_with(Metric::Commits, 120));
        let earned: Vec<&str> = achievements.earned.iter().map(String::as_str).collect();
        assert_eq!(earned, vec!["commits-10", "commits-100", "commits-50"]);
        assert_eq!(achievements.current["commits"], "commits-100");
    }

    #[test]
    fn test_thresholds_ascend_and_ids_are_unique() {
        let mut ids = BTreeSet::new();
        for category in ACHIEVEMENT_TABLE {
            assert!(category.thresholds.windows(2).all(|w| w[0] < w[1]), "{}", category.id);
            for achievement in category.tiers() {
                assert!(ids.insert(achievement.id.clone()), "duplicate {}", achievement.id);
            }
        }
        assert_eq!(ids.len(), catalog().len());
    }

    #[test]
    fn test_rarity_follows_tier() {
        let commits: Vec<Achievement> = ACHIEVEMENT_TABLE[0].tiers().collect();
        assert_eq!(commits[0].rarity, AchievementRarity::Common);
        assert_eq!(commits[4].rarity, AchievementRarity::Legendary);
        assert_eq!(commits[4].name, "Committer 5");
    }

    #[test]
    fn test_nothing_earned_from_zero() {
        assert_eq!(evaluate(&Counters::default()), Achievements::default());
    }
}
