//! Working-time patterns and activity streaks

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const EARLY_BIRD_BEFORE: u32 = 9;
const NIGHT_OWL_FROM: u32 = 21;
const MIDNIGHT_BEFORE: u32 = 4;
const WORKDAY_START: u32 = 9;
const WORKDAY_END: u32 = 17;

/// Commit counts by time of day, in the author's local time.
///
/// Buckets overlap: a 02:00 Saturday commit is early bird, midnight,
/// weekend and out of hours at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityPattern {
    pub early_bird: u64,
    pub night_owl: u64,
    pub midnight: u64,
    pub weekend: u64,
    pub out_of_hours: u64,
}

impl ActivityPattern {
    pub fn record(&mut self, timestamp: DateTime<FixedOffset>) {
        let hour = timestamp.hour();
        if hour < EARLY_BIRD_BEFORE {
            self.early_bird += 1;
        }
        if hour >= NIGHT_OWL_FROM {
            self.night_owl += 1;
        }
        if hour < MIDNIGHT_BEFORE {
            self.midnight += 1;
        }
        if is_weekend(timestamp.date_naive()) {
            self.weekend += 1;
        }
        if !(WORKDAY_START..WORKDAY_END).contains(&hour) {
            self.out_of_hours += 1;
        }
    }

    pub fn add(&mut self, other: &ActivityPattern) {
        self.early_bird += other.early_bird;
        self.night_owl += other.night_owl;
        self.midnight += other.midnight;
        self.weekend += other.weekend;
        self.out_of_hours += other.out_of_hours;
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Longest run of consecutive calendar days.
pub fn longest_streak(days: &BTreeSet<NaiveDate>) -> u32 {
    longest_run(days.iter().copied(), |d| d.succ_opt())
}

/// Longest run of consecutive weekdays. Weekends neither extend nor break
/// the run, so Friday followed by Monday is consecutive.
pub fn work_week_streak(days: &BTreeSet<NaiveDate>) -> u32 {
    longest_run(
        days.iter().copied().filter(|d| !is_weekend(*d)),
        next_weekday,
    )
}

fn next_weekday(date: NaiveDate) -> Option<NaiveDate> {
    let skip = match date.weekday() {
        Weekday::Fri => 3,
        Weekday::Sat => 2,
        _ => 1,
    };
    date.checked_add_signed(Duration::days(skip))
}

fn longest_run(
    days: impl Iterator<Item = NaiveDate>,
    next: impl Fn(NaiveDate) -> Option<NaiveDate>,
) -> u32 {
    let mut best = 0;
    let mut current = 0;
    let mut expected: Option<NaiveDate> = None;
    for day in days {
        current = if expected == Some(day) { current + 1 } else { 1 };
        best = best.max(current);
        expected = next(day);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn days(list: &[(i32, u32, u32)]) -> BTreeSet<NaiveDate> {
        list.iter()
            .map(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
            .collect()
    }

    #[test]
    fn test_buckets_overlap() {
        let mut pattern = ActivityPattern::default();
        // Saturday 02:30
        pattern.record(at("2024-03-02T02:30:00+00:00"));
        assert_eq!(
            pattern,
            ActivityPattern {
                early_bird: 1,
                night_owl: 0,
                midnight: 1,
                weekend: 1,
                out_of_hours: 1,
            }
        );
    }

    #[test]
    fn test_local_time_is_used() {
        let mut pattern = ActivityPattern::default();
        // 22:00 in UTC-05:00 is 03:00 UTC the next day
        pattern.record(at("2024-03-04T22:00:00-05:00"));
        assert_eq!(pattern.night_owl, 1);
        assert_eq!(pattern.midnight, 0);
        assert_eq!(pattern.out_of_hours, 1);
    }

    #[test]
    fn test_office_hours_boundaries() {
        let mut pattern = ActivityPattern::default();
        pattern.record(at("2024-03-04T09:00:00+00:00"));
        pattern.record(at("2024-03-04T16:59:00+00:00"));
        assert_eq!(pattern.out_of_hours, 0);
        pattern.record(at("2024-03-04T17:00:00+00:00"));
        assert_eq!(pattern.out_of_hours, 1);
        assert_eq!(pattern.early_bird, 0);
    }

    #[test]
    fn test_longest_streak() {
        // Mar 1-3 then a gap, then Mar 5-6
        let set = days(&[(2024, 3, 1), (2024, 3, 2), (2024, 3, 3), (2024, 3, 5), (2024, 3, 6)]);
        assert_eq!(longest_streak(&set), 3);
        assert_eq!(longest_streak(&BTreeSet::new()), 0);
    }

    #[test]
    fn test_work_week_streak_skips_weekend() {
        // Thu Feb 29, Fri Mar 1, Mon Mar 4, Tue Mar 5
        let set = days(&[(2024, 2, 29), (2024, 3, 1), (2024, 3, 4), (2024, 3, 5)]);
        assert_eq!(work_week_streak(&set), 4);
        assert_eq!(longest_streak(&set), 2);
    }

    #[test]
    fn test_work_week_streak_breaks_on_missed_weekday() {
        // Fri Mar 1, Tue Mar 5: Monday was missed
        let set = days(&[(2024, 3, 1), (2024, 3, 2), (2024, 3, 5)]);
        assert_eq!(work_week_streak(&set), 1);
    }
}
