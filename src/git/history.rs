//! Git history extraction using libgit2
//!
//! Walks every local ref newest-first, de-duplicates commits across refs,
//! and classifies each commit's diff against its first parent.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, FixedOffset, Offset, TimeZone, Utc};
use git2::{Diff, ErrorCode, Oid, Patch, Repository, Sort};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use super::login::infer_login;
use crate::cancel::CancellationToken;
use crate::classifier::{is_documentation_file, is_test_file, ChangeSide, LineStats};
use crate::models::{Commit, DateRange, Identity, RepoRef};
use crate::progress::ProgressReporter;

/// Traversal bounds for one extraction.
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Days before `since` at which a ref's walk stops outright
    pub cutoff_slack_days: i64,
    /// Consecutive too-old commits after which a ref is abandoned
    pub max_consecutive_old: usize,
    /// Report progress every this many emitted commits
    pub progress_interval: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            cutoff_slack_days: 7,
            max_consecutive_old: 100,
            progress_interval: 100,
        }
    }
}

/// Why a ref's walk ended before its root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    HardCutoff,
    TooManyOld,
    ShallowBoundary,
}

/// Outcome of visiting one commit. Fatal conditions are `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStep {
    Continue,
    StopRef(StopReason),
}

/// Commit ids already emitted during one extraction.
#[derive(Debug, Default)]
pub struct SeenCommits {
    ids: HashSet<Oid>,
}

impl SeenCommits {
    /// Record `id`; false if it was already present.
    pub fn insert(&mut self, id: Oid) -> bool {
        self.ids.insert(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Git history reader for one local clone.
pub struct GitHistory {
    repo: Repository,
}

impl GitHistory {
    /// Open a git repository.
    ///
    /// # Arguments
    /// * `path` - Path to the repository (or any subdirectory)
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)
            .with_context(|| format!("Failed to open git repository at {:?}", path))?;
        debug!("Opened git repository at {:?}", repo.path());
        Ok(Self { repo })
    }

    /// Check if a path is inside a git repository.
    pub fn is_git_repo(path: &Path) -> bool {
        Repository::discover(path).is_ok()
    }

    /// Extract every distinct commit in `range` reachable from any local ref.
    pub fn extract_commits(
        &self,
        repo_ref: &RepoRef,
        range: &DateRange,
        options: &ExtractOptions,
        cancel: &CancellationToken,
        reporter: &dyn ProgressReporter,
    ) -> Result<Vec<Commit>> {
        let mut walk = Extraction {
            repo: &self.repo,
            repo_key: repo_ref.key(),
            range,
            options,
            hard_cutoff: range
                .since
                .map(|since| since - Duration::days(options.cutoff_slack_days)),
            cancel,
            reporter,
            seen: SeenCommits::default(),
            commits: Vec::new(),
        };

        for (name, tip) in self.ref_tips()? {
            cancel.check()?;
            walk.walk_ref(&name, tip)
                .with_context(|| format!("Failed to walk {} in {}", name, repo_ref))?;
        }

        debug!(
            "Extracted {} commits from {} ({} distinct visited)",
            walk.commits.len(),
            repo_ref,
            walk.seen.len()
        );
        reporter.report(&format!("{}: {} commits", repo_ref, walk.commits.len()));
        Ok(walk.commits)
    }

    /// Every ref that peels to a commit, sorted by ref name.
    fn ref_tips(&self) -> Result<Vec<(String, Oid)>> {
        let mut tips = Vec::new();
        for reference in self.repo.references()? {
            let reference = reference?;
            let Some(name) = reference.name().map(str::to_string) else {
                continue;
            };
            match reference.peel_to_commit() {
                Ok(commit) => tips.push((name, commit.id())),
                Err(e) => debug!("Skipping ref {}: {}", name, e.message()),
            }
        }
        tips.sort();
        Ok(tips)
    }
}

/// State for one `extract_commits` call; the seen set dies with it.
struct Extraction<'a> {
    repo: &'a Repository,
    repo_key: String,
    range: &'a DateRange,
    options: &'a ExtractOptions,
    hard_cutoff: Option<DateTime<Utc>>,
    cancel: &'a CancellationToken,
    reporter: &'a dyn ProgressReporter,
    seen: SeenCommits,
    commits: Vec<Commit>,
}

impl Extraction<'_> {
    fn walk_ref(&mut self, name: &str, tip: Oid) -> Result<()> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TIME)?;
        revwalk.push(tip)?;

        let mut consecutive_old = 0usize;
        for oid_result in revwalk {
            self.cancel.check()?;

            let oid = match oid_result {
                Ok(oid) => oid,
                Err(e) if is_shallow_boundary(&e) => {
                    debug!("{}: reached shallow boundary", name);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            match self.visit(oid, &mut consecutive_old)? {
                WalkStep::Continue => {}
                WalkStep::StopRef(reason) => {
                    debug!("{}: stopped walk ({:?})", name, reason);
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn visit(&mut self, oid: Oid, consecutive_old: &mut usize) -> Result<WalkStep> {
        let commit = match self.repo.find_commit(oid) {
            Ok(commit) => commit,
            Err(e) if is_shallow_boundary(&e) => {
                return Ok(WalkStep::StopRef(StopReason::ShallowBoundary))
            }
            Err(e) => return Err(e.into()),
        };

        let timestamp = signature_time(&commit.author().when());
        let when = timestamp.with_timezone(&Utc);

        if self.hard_cutoff.is_some_and(|cutoff| when < cutoff) {
            return Ok(WalkStep::StopRef(StopReason::HardCutoff));
        }
        if self.range.is_after(when) {
            return Ok(WalkStep::Continue);
        }
        if self.range.is_before(when) {
            *consecutive_old += 1;
            if *consecutive_old >= self.options.max_consecutive_old {
                return Ok(WalkStep::StopRef(StopReason::TooManyOld));
            }
            return Ok(WalkStep::Continue);
        }
        *consecutive_old = 0;

        if !self.seen.insert(oid) {
            return Ok(WalkStep::Continue);
        }

        let record = self.build_commit(&commit, timestamp)?;
        self.commits.push(record);

        let interval = self.options.progress_interval.max(1);
        if self.commits.len() % interval == 0 {
            self.reporter.report(&format!(
                "{}: {} commits...",
                self.repo_key,
                self.commits.len()
            ));
        }
        Ok(WalkStep::Continue)
    }

    fn build_commit(
        &self,
        commit: &git2::Commit,
        timestamp: DateTime<FixedOffset>,
    ) -> Result<Commit> {
        // A parent missing from a shallow clone makes this a root commit.
        let parent_tree = if commit.parent_count() > 0 {
            match commit.parent(0) {
                Ok(parent) => Some(parent.tree()?),
                Err(e) if is_shallow_boundary(&e) => None,
                Err(e) => return Err(e.into()),
            }
        } else {
            None
        };
        let tree = commit.tree()?;
        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
        let summary = summarize_diff(&diff)?;

        let author = commit.author();
        let committer = commit.committer();
        let message = commit
            .message()
            .unwrap_or("")
            .lines()
            .next()
            .unwrap_or("")
            .to_string();

        Ok(Commit {
            hash: commit.id().to_string(),
            repository: self.repo_key.clone(),
            author: signature_identity(&author),
            committer: signature_identity(&committer),
            timestamp,
            message,
            stats: summary.stats,
            files_changed: summary.files_changed,
            has_tests: summary.has_tests,
            is_merge: commit.parent_count() > 1,
        })
    }
}

/// Line and file totals for one diff.
#[derive(Debug, Default)]
struct DiffSummary {
    stats: LineStats,
    files_changed: usize,
    has_tests: bool,
}

fn summarize_diff(diff: &Diff) -> Result<DiffSummary> {
    let mut summary = DiffSummary::default();

    for idx in 0..diff.deltas().len() {
        let Some(patch) = Patch::from_diff(diff, idx)? else {
            continue;
        };
        let delta = patch.delta();
        let path = delta
            .new_file()
            .path()
            .or_else(|| delta.old_file().path())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        if is_test_file(&path) {
            summary.has_tests = true;
        }
        if is_documentation_file(&path) {
            continue;
        }
        summary.files_changed += 1;

        for hunk in 0..patch.num_hunks() {
            for line_idx in 0..patch.num_lines_in_hunk(hunk)? {
                let line = patch.line_in_hunk(hunk, line_idx)?;
                let side = match line.origin() {
                    '+' => ChangeSide::Addition,
                    '-' => ChangeSide::Deletion,
                    _ => continue,
                };
                let content = String::from_utf8_lossy(line.content());
                summary
                    .stats
                    .record(side, content.trim_end_matches(['\n', '\r']));
            }
        }
    }

    Ok(summary)
}

fn signature_identity(sig: &git2::Signature) -> Identity {
    let name = sig.name().unwrap_or("Unknown");
    let email = sig.email().unwrap_or("");
    let (login, source) = infer_login(name, email);
    Identity::from_signature(name, email, login, source)
}

/// Convert a git timestamp, keeping the signature's own UTC offset.
fn signature_time(time: &git2::Time) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(time.offset_minutes() * 60).unwrap_or(Utc.fix());
    offset
        .timestamp_opt(time.seconds(), 0)
        .single()
        .unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH.fixed_offset())
}

/// Missing objects past a depth-limited clone's boundary.
fn is_shallow_boundary(err: &git2::Error) -> bool {
    err.code() == ErrorCode::NotFound
}
