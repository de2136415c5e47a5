//! Period labels for timeline bucketing

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::DateRange;

/// How events are grouped on the timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
    /// One bucket covering the whole date range
    #[default]
    Range,
}

impl Granularity {
    /// Label of the bucket containing `date`.
    ///
    /// Daily is `YYYY-MM-DD`, weekly is the ISO week `YYYY-Www`, monthly is
    /// `YYYY-MM`, and range mode labels everything after the range itself.
    pub fn label(&self, date: NaiveDate, range: &DateRange) -> String {
        match self {
            Granularity::Daily => date.format("%Y-%m-%d").to_string(),
            Granularity::Weekly => {
                let week = date.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Granularity::Monthly => date.format("%Y-%m").to_string(),
            Granularity::Range => range_label(range),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
            Granularity::Range => "range",
        };
        f.write_str(s)
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" | "day" => Ok(Granularity::Daily),
            "weekly" | "week" => Ok(Granularity::Weekly),
            "monthly" | "month" => Ok(Granularity::Monthly),
            "range" | "custom" => Ok(Granularity::Range),
            other => Err(format!("unknown granularity: {}", other)),
        }
    }
}

/// `since..until` as calendar dates; open ends are written `open`.
pub fn range_label(range: &DateRange) -> String {
    let side = |d: Option<chrono::DateTime<chrono::Utc>>| {
        d.map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "open".to_string())
    };
    format!("{}..{}", side(range.since), side(range.until))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_labels() {
        let range = DateRange::from_dates(Some(date(2024, 1, 1)), None);
        let day = date(2024, 12, 30);
        assert_eq!(Granularity::Daily.label(day, &range), "2024-12-30");
        // ISO week 1 of 2025 starts on Monday 2024-12-30
        assert_eq!(Granularity::Weekly.label(day, &range), "2025-W01");
        assert_eq!(Granularity::Monthly.label(day, &range), "2024-12");
        assert_eq!(Granularity::Range.label(day, &range), "2024-01-01..open");
    }

    #[test]
    fn test_parse() {
        assert_eq!("Weekly".parse::<Granularity>(), Ok(Granularity::Weekly));
        assert_eq!("custom".parse::<Granularity>(), Ok(Granularity::Range));
        assert!("hourly".parse::<Granularity>().is_err());
    }
}
