//! Run orchestration
//!
//! 1. Validate configuration and resolve the repository list
//! 2. Per repository, in parallel: clone or update, walk history, fetch
//!    pull requests and issues
//! 3. Drop bot activity
//! 4. Fetch user profiles and reconcile identities
//! 5. Aggregate metrics and score them
//!
//! Repository failures abort the run when repositories were listed
//! explicitly. Under a pattern selection they are reported and skipped, and
//! the run carries on with whatever was collected.

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::cache::{DiskCache, NoopCache, ResultCache};
use crate::cancel::{CancellationToken, Cancelled};
use crate::config::{RepoSelection, VelocityConfig};
use crate::git::{clone_path, ensure_local_clone, GitHistory};
use crate::github::{
    fetch_issues, fetch_pull_requests, list_owner_repos, FetchEngine, GitHubClient, GitHubError,
    UserDirectory,
};
use crate::identity::{reconcile, BotFilter};
use crate::metrics::{aggregate, AggregateOptions, GlobalMetrics};
use crate::models::{DateRange, LoginSource, RawData, RepoRef};
use crate::progress::ProgressReporter;
use crate::scoring::score_all;

/// A repository left out of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRepository {
    pub repository: String,
    pub reason: String,
}

/// Result of a full run.
#[derive(Debug)]
pub struct RunReport {
    pub metrics: GlobalMetrics,
    /// Repositories that contributed data
    pub repositories: Vec<String>,
    pub skipped: Vec<SkippedRepository>,
}

/// One configured run.
pub struct Pipeline<'a> {
    config: &'a VelocityConfig,
    cancel: CancellationToken,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a VelocityConfig,
        cancel: CancellationToken,
        reporter: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            config,
            cancel,
            reporter,
        }
    }

    pub fn run(&self) -> Result<RunReport> {
        let config = self.config;
        config.validate()?;
        let selection = config.selection()?;
        let bots = config.bot_filter()?;
        let range = config.date_range();

        let cache: Box<dyn ResultCache> = if config.cache.enabled {
            Box::new(DiskCache::open(config.cache.dir(), config.cache.ttl())?)
        } else {
            Box::new(NoopCache)
        };
        debug!("Using {} result cache", cache.name());

        let client = GitHubClient::new(config.client_config(), self.cancel.clone());
        let engine = FetchEngine::new(cache.as_ref(), config.fetch_config(), &self.cancel, self.reporter);

        let explicit = selection.is_explicit();
        let repos = match selection {
            RepoSelection::Explicit(repos) => repos,
            RepoSelection::Pattern(pattern) => {
                let listings = list_owner_repos(&client, &engine, &pattern.owner)
                    .with_context(|| format!("Failed to list repositories of {}", pattern.owner))?;
                let selected = pattern.select(&listings);
                info!(
                    "{} of {} repositories of {} match",
                    selected.len(),
                    listings.len(),
                    pattern.owner
                );
                selected
            }
        };
        self.reporter
            .report(&format!("Collecting {} repositories", repos.len()));

        let api = config.github.enabled.then_some(&client);
        let review_width = config.review_width(repos.len());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.concurrency)
            .build()?;
        // collect() keeps repository order, so merging is deterministic
        let results: Vec<(RepoRef, Result<RawData>)> = pool.install(|| {
            repos
                .par_iter()
                .map(|repo| (repo.clone(), self.collect_repository(repo, api, &engine, &range, review_width)))
                .collect()
        });
        self.cancel.check()?;

        let (raw, repositories, skipped) = merge_results(results, explicit, self.reporter)?;
        let raw = drop_bots(raw, &bots);

        let profiles = if config.github.enabled {
            let directory = UserDirectory::new(&client, cache.as_ref(), config.cache.ttl());
            directory.profiles(platform_logins(&raw).iter().map(String::as_str), self.reporter)?
        } else {
            Default::default()
        };

        let reviews = raw.pull_requests.iter().flat_map(|pr| &pr.reviews);
        let identities = reconcile(&raw.commits, &raw.pull_requests, reviews, &profiles, &config.aliases);

        let options = AggregateOptions {
            range,
            granularity: config.granularity,
            teams: config.teams.clone(),
        };
        let mut metrics = aggregate(&raw, &identities, &options);
        score_all(&mut metrics, &config.scoring);

        info!(
            "Run complete: {} contributors across {} repositories",
            metrics.contributors.len(),
            repositories.len()
        );
        Ok(RunReport {
            metrics,
            repositories,
            skipped,
        })
    }

    /// Everything one repository contributes to the run.
    fn collect_repository(
        &self,
        repo: &RepoRef,
        client: Option<&GitHubClient>,
        engine: &FetchEngine<'_>,
        range: &DateRange,
        review_width: usize,
    ) -> Result<RawData> {
        self.cancel.check()?;
        let config = self.config;
        let clone_dir = config.clone.dir();

        let path = if config.clone.enabled {
            self.reporter.report(&format!("{}: updating clone", repo));
            ensure_local_clone(&clone_dir, repo, &config.clone_options(), &self.cancel)?
        } else {
            let path = clone_path(&clone_dir, repo);
            if !path.exists() {
                bail!("No local clone of {} at {}", repo, path.display());
            }
            path
        };

        let history = GitHistory::open(&path)?;
        let commits = history
            .extract_commits(repo, range, &config.extract_options(), &self.cancel, self.reporter)
            .with_context(|| format!("Failed to read history of {}", repo))?;
        let mut raw = RawData {
            commits,
            ..Default::default()
        };

        if let Some(client) = client {
            raw.pull_requests = fetch_pull_requests(client, engine, repo, range, review_width)
                .with_context(|| format!("Failed to fetch pull requests of {}", repo))?;
            let activity = fetch_issues(client, engine, repo, range)
                .with_context(|| format!("Failed to fetch issues of {}", repo))?;
            raw.issues = activity.issues;
            raw.issue_comments = activity.comments;
        }

        self.reporter.report(&format!(
            "{}: {} commits, {} pull requests, {} issues",
            repo,
            raw.commits.len(),
            raw.pull_requests.len(),
            raw.issues.len()
        ));
        Ok(raw)
    }
}

/// Merge per-repository results, applying the failure policy.
pub fn merge_results(
    results: Vec<(RepoRef, Result<RawData>)>,
    explicit: bool,
    reporter: &dyn ProgressReporter,
) -> Result<(RawData, Vec<String>, Vec<SkippedRepository>)> {
    let mut merged = RawData::default();
    let mut repositories = Vec::new();
    let mut skipped = Vec::new();

    for (repo, result) in results {
        match result {
            Ok(raw) => {
                merged.merge(raw);
                repositories.push(repo.key());
            }
            Err(e) if is_cancellation(&e) => return Err(e),
            Err(e) if explicit => {
                return Err(e.context(format!("Repository {} failed", repo)));
            }
            Err(e) => {
                warn!("Skipping {}: {:#}", repo, e);
                reporter.warn(&format!("skipping {}: {:#}", repo, e));
                skipped.push(SkippedRepository {
                    repository: repo.key(),
                    reason: format!("{:#}", e),
                });
            }
        }
    }
    Ok((merged, repositories, skipped))
}

/// Cancellation anywhere in the error chain, from git or the API client.
fn is_cancellation(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause.is::<Cancelled>()
            || cause
                .downcast_ref::<GitHubError>()
                .is_some_and(GitHubError::is_cancelled)
    })
}

/// Remove every event authored by a bot. Pull requests opened by bots go
/// with their reviews.
pub fn drop_bots(mut raw: RawData, bots: &BotFilter) -> RawData {
    let before = raw.commits.len() + raw.pull_requests.len();
    raw.commits.retain(|c| !bots.is_bot_identity(&c.author));
    raw.pull_requests.retain(|pr| !bots.is_bot_identity(&pr.author));
    for pr in &mut raw.pull_requests {
        pr.reviews.retain(|r| !bots.is_bot_identity(&r.author));
    }
    raw.issues.retain(|i| !bots.is_bot_identity(&i.author));
    raw.issue_comments.retain(|c| !bots.is_bot_identity(&c.author));
    debug!(
        "Dropped {} bot commits and pull requests",
        before - raw.commits.len() - raw.pull_requests.len()
    );
    raw
}

/// Lower-cased platform logins worth a profile lookup.
fn platform_logins(raw: &RawData) -> BTreeSet<String> {
    let api_authors = raw
        .pull_requests
        .iter()
        .flat_map(|pr| std::iter::once(&pr.author).chain(pr.reviews.iter().map(|r| &r.author)))
        .chain(raw.issues.iter().map(|i| &i.author))
        .chain(raw.issue_comments.iter().map(|c| &c.author));
    let noreply = raw
        .commits
        .iter()
        .map(|c| &c.author)
        .filter(|a| a.login_source == LoginSource::Noreply);

    api_authors
        .chain(noreply)
        .filter_map(|identity| identity.platform_login())
        .filter(|login| *login != "ghost")
        .map(str::to_lowercase)
        .collect()
}
