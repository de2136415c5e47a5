//! Per-line tallies for a diff

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

use super::lines::{classify, is_commented_out_code, LineKind};

/// Which side of the diff a line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSide {
    Addition,
    Deletion,
}

/// Line counts for a diff, split by classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineStats {
    pub additions: u64,
    pub deletions: u64,
    pub meaningful_additions: u64,
    pub meaningful_deletions: u64,
    pub comment_additions: u64,
    pub comment_deletions: u64,
    pub whitespace_additions: u64,
    pub whitespace_deletions: u64,
    /// Added comment lines that look like disabled code
    pub commented_out_additions: u64,
}

impl LineStats {
    /// Classify and count one changed line.
    pub fn record(&mut self, side: ChangeSide, line: &str) {
        let kind = classify(line);
        match side {
            ChangeSide::Addition => {
                self.additions += 1;
                match kind {
                    LineKind::Meaningful => self.meaningful_additions += 1,
                    LineKind::Comment => {
                        self.comment_additions += 1;
                        if is_commented_out_code(line) {
                            self.commented_out_additions += 1;
                        }
                    }
                    LineKind::Whitespace => self.whitespace_additions += 1,
                }
            }
            ChangeSide::Deletion => {
                self.deletions += 1;
                match kind {
                    LineKind::Meaningful => self.meaningful_deletions += 1,
                    LineKind::Comment => self.comment_deletions += 1,
                    LineKind::Whitespace => self.whitespace_deletions += 1,
                }
            }
        }
    }

    pub fn total_changes(&self) -> u64 {
        self.additions + self.deletions
    }

    pub fn meaningful_changes(&self) -> u64 {
        self.meaningful_additions + self.meaningful_deletions
    }
}

impl AddAssign for LineStats {
    fn add_assign(&mut self, other: Self) {
        self.additions += other.additions;
        self.deletions += other.deletions;
        self.meaningful_additions += other.meaningful_additions;
        self.meaningful_deletions += other.meaningful_deletions;
        self.comment_additions += other.comment_additions;
        self.comment_deletions += other.comment_deletions;
        self.whitespace_additions += other.whitespace_additions;
        self.whitespace_deletions += other.whitespace_deletions;
        self.commented_out_additions += other.commented_out_additions;
    }
}

/// Classify every changed line of a unified diff.
///
/// Only lines inside a hunk are counted, using the hunk header's line
/// counts to know where the hunk ends. That keeps `--- a/file` headers out
/// of the tally while still counting a deleted `-- sql comment` line.
pub fn classify_patch(patch: &str) -> LineStats {
    let mut stats = LineStats::default();
    let mut old_left = 0u64;
    let mut new_left = 0u64;

    for line in patch.lines() {
        if old_left == 0 && new_left == 0 {
            if let Some((old, new)) = parse_hunk_header(line) {
                old_left = old;
                new_left = new;
            }
            continue;
        }

        if let Some(added) = line.strip_prefix('+') {
            stats.record(ChangeSide::Addition, added);
            new_left = new_left.saturating_sub(1);
        } else if let Some(removed) = line.strip_prefix('-') {
            stats.record(ChangeSide::Deletion, removed);
            old_left = old_left.saturating_sub(1);
        } else if line.starts_with('\\') {
            // "\ No newline at end of file"
        } else {
            old_left = old_left.saturating_sub(1);
            new_left = new_left.saturating_sub(1);
        }
    }

    stats
}

/// Parse `@@ -a,b +c,d @@` into (old line count, new line count).
fn parse_hunk_header(line: &str) -> Option<(u64, u64)> {
    let rest = line.strip_prefix("@@ ")?;
    let end = rest.find(" @@")?;
    let mut ranges = rest[..end].split_whitespace();
    let old = ranges.next()?.strip_prefix('-')?;
    let new = ranges.next()?.strip_prefix('+')?;
    Some((range_len(old)?, range_len(new)?))
}

/// `start,len` or bare `start` (length 1).
fn range_len(range: &str) -> Option<u64> {
    match range.split_once(',') {
        Some((_, len)) => len.parse().ok(),
        None => range.parse::<u64>().ok().map(|_| 1),
    }
}
