//! Configuration for gitvelocity
//!
//! A run is described by one TOML file (`velocity.toml` by convention):
//!
//! ```toml
//! repositories = ["acme/widgets"]   # or a [selection] table
//! granularity = "weekly"
//! concurrency = 5
//!
//! [github]
//! # token = "ghp_..."   # GITHUB_TOKEN / GH_TOKEN take priority
//!
//! [range]
//! since = "2024-03-01"
//! until = "2024-03-31"
//!
//! [[teams]]
//! name = "core"
//! members = ["alice", "bob"]
//!
//! [[aliases]]
//! login = "johndoe"
//! emails = ["jdoe@company.com"]
//! ```
//!
//! Every section is optional apart from the repository selection.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::cache::{default_cache_dir, default_clone_dir};
use crate::git::{CloneOptions, ExtractOptions};
use crate::github::{ClientConfig, FetchConfig, RepoPattern, RetryPolicy};
use crate::identity::{Alias, BotFilter};
use crate::metrics::{Granularity, Team};
use crate::models::{DateRange, RepoRef};
use crate::scoring::PointConfig;

/// Environment variables checked for an API token, in priority order.
pub const TOKEN_ENV_VARS: &[&str] = &["GITHUB_TOKEN", "GH_TOKEN"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid date range: since {since} is after until {until}")]
    InvalidRange { since: NaiveDate, until: NaiveDate },

    #[error("No GitHub token: set GITHUB_TOKEN or [github].token")]
    MissingToken,

    #[error("Invalid repository {0:?}: expected owner/name")]
    InvalidRepository(String),

    #[error("No repositories configured: set `repositories` or [selection]")]
    NoRepositories,

    #[error("Set either `repositories` or [selection], not both")]
    ConflictingSelection,

    #[error("Invalid pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("concurrency must be at least 1")]
    InvalidConcurrency,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VelocityConfig {
    /// Explicit `owner/name` list; any failure aborts the run
    #[serde(default)]
    pub repositories: Vec<String>,

    /// Owner + glob selection; failing repositories are skipped
    #[serde(default)]
    pub selection: Option<SelectionConfig>,

    #[serde(default)]
    pub granularity: Granularity,

    /// Repositories processed in parallel, and review-fetch width
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub range: RangeConfig,

    #[serde(default)]
    pub teams: Vec<Team>,

    #[serde(default)]
    pub scoring: PointConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub bots: BotsConfig,

    #[serde(default)]
    pub aliases: Vec<Alias>,

    #[serde(default)]
    pub clone: CloneConfig,

    #[serde(default)]
    pub extractor: ExtractorConfig,

    #[serde(default)]
    pub fetch: FetchSettings,
}

fn default_concurrency() -> usize {
    5
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            repositories: Vec::new(),
            selection: None,
            granularity: Granularity::default(),
            concurrency: default_concurrency(),
            github: GitHubConfig::default(),
            range: RangeConfig::default(),
            teams: Vec::new(),
            scoring: PointConfig::default(),
            cache: CacheConfig::default(),
            bots: BotsConfig::default(),
            aliases: Vec::new(),
            clone: CloneConfig::default(),
            extractor: ExtractorConfig::default(),
            fetch: FetchSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubConfig {
    /// Fetch pull requests, issues and profiles. Off means git history only.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,
    /// Prefer GraphQL over REST when a token is available
    #[serde(default = "default_true")]
    pub use_graphql: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Review requests in flight across all repositories collected at once
    #[serde(default = "default_review_concurrency")]
    pub review_concurrency: usize,
}

fn default_true() -> bool {
    true
}
fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_graphql_url() -> String {
    "https://api.github.com/graphql".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    60_000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_review_concurrency() -> usize {
    5
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token: None,
            api_url: default_api_url(),
            graphql_url: default_graphql_url(),
            use_graphql: true,
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            timeout_secs: default_timeout_secs(),
            review_concurrency: default_review_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SelectionConfig {
    pub owner: String,
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default)]
    pub include_forks: bool,
    #[serde(default)]
    pub include_archived: bool,
}

fn default_pattern() -> String {
    "*".to_string()
}

/// Calendar dates as `"YYYY-MM-DD"`; either side may be left open.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct RangeConfig {
    #[serde(default)]
    pub since: Option<NaiveDate>,
    #[serde(default)]
    pub until: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
}

fn default_ttl_hours() -> u64 {
    24
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            ttl_hours: default_ttl_hours(),
        }
    }
}

impl CacheConfig {
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(default_cache_dir)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours.saturating_mul(3600))
    }
}

/// Extra bot patterns on top of the built-in list.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BotsConfig {
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CloneConfig {
    /// Clone or update repositories before extraction. Off means the
    /// clones must already exist under `dir`.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_clone_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub shallow: bool,
    #[serde(default = "default_depth")]
    pub depth: u32,
}

fn default_clone_base_url() -> String {
    "https://github.com".to_string()
}
fn default_depth() -> u32 {
    500
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            base_url: default_clone_base_url(),
            shallow: false,
            depth: default_depth(),
        }
    }
}

impl CloneConfig {
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(default_clone_dir)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractorConfig {
    #[serde(default = "default_cutoff_slack_days")]
    pub cutoff_slack_days: i64,
    #[serde(default = "default_max_consecutive_old")]
    pub max_consecutive_old: usize,
}

fn default_cutoff_slack_days() -> i64 {
    7
}
fn default_max_consecutive_old() -> usize {
    100
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            cutoff_slack_days: default_cutoff_slack_days(),
            max_consecutive_old: default_max_consecutive_old(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchSettings {
    #[serde(default = "default_early_termination_threshold")]
    pub early_termination_threshold: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// 0 means no page cap
    #[serde(default)]
    pub max_pages: u32,
}

fn default_early_termination_threshold() -> u32 {
    2
}
fn default_per_page() -> u32 {
    100
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            early_termination_threshold: default_early_termination_threshold(),
            per_page: default_per_page(),
            max_pages: 0,
        }
    }
}

/// Which repositories a run covers.
#[derive(Debug, Clone)]
pub enum RepoSelection {
    /// Explicit list: a failing repository aborts the run
    Explicit(Vec<RepoRef>),
    /// Owner + pattern: failing repositories are reported and skipped
    Pattern(RepoPattern),
}

impl RepoSelection {
    pub fn is_explicit(&self) -> bool {
        matches!(self, RepoSelection::Explicit(_))
    }
}

/// Read, parse and apply environment overrides. Call
/// [`VelocityConfig::validate`] before using the result.
pub fn load_config(path: &Path) -> ConfigResult<VelocityConfig> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config: VelocityConfig = toml::from_str(&content)?;
    config.apply_token_override(|key| std::env::var(key).ok());
    debug!("Loaded config from {}", path.display());
    Ok(config)
}

impl VelocityConfig {
    /// Environment tokens win over the file.
    pub fn apply_token_override(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(token) = TOKEN_ENV_VARS
            .iter()
            .filter_map(|key| env(key))
            .find(|t| !t.trim().is_empty())
        {
            self.github.token = Some(token.trim().to_string());
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.github.token.as_deref().filter(|t| !t.is_empty())
    }

    /// Per-repository review worker width when `repo_count` repositories
    /// are collected. The review budget is split across the repository
    /// tasks that can run at once, never below one worker each.
    pub fn review_width(&self, repo_count: usize) -> usize {
        let parallel_repos = self.concurrency.min(repo_count).max(1);
        (self.github.review_concurrency / parallel_repos).max(1)
    }

    /// Reject configurations that cannot produce a run.
    pub fn validate(&self) -> ConfigResult<()> {
        if let RangeConfig {
            since: Some(since),
            until: Some(until),
        } = self.range
        {
            if since > until {
                return Err(ConfigError::InvalidRange { since, until });
            }
        }
        if self.concurrency == 0 || self.github.review_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        let selection = self.selection()?;
        let needs_api = self.github.enabled || !selection.is_explicit();
        if needs_api && self.token().is_none() {
            return Err(ConfigError::MissingToken);
        }
        self.bot_filter()?;
        Ok(())
    }

    pub fn selection(&self) -> ConfigResult<RepoSelection> {
        match (&self.selection, self.repositories.is_empty()) {
            (Some(_), false) => Err(ConfigError::ConflictingSelection),
            (None, true) => Err(ConfigError::NoRepositories),
            (None, false) => self
                .repositories
                .iter()
                .map(|spec| {
                    RepoRef::parse(spec).ok_or_else(|| ConfigError::InvalidRepository(spec.clone()))
                })
                .collect::<ConfigResult<Vec<_>>>()
                .map(RepoSelection::Explicit),
            (Some(sel), true) => {
                let mut pattern = RepoPattern::new(&sel.owner, &sel.pattern).map_err(|e| {
                    ConfigError::InvalidPattern {
                        pattern: sel.pattern.clone(),
                        message: e.to_string(),
                    }
                })?;
                pattern.include_forks = sel.include_forks;
                pattern.include_archived = sel.include_archived;
                Ok(RepoSelection::Pattern(pattern))
            }
        }
    }

    pub fn date_range(&self) -> DateRange {
        DateRange::from_dates(self.range.since, self.range.until)
    }

    pub fn bot_filter(&self) -> ConfigResult<BotFilter> {
        BotFilter::new(&self.bots.patterns).map_err(|e| ConfigError::InvalidPattern {
            pattern: e.glob().unwrap_or_default().to_string(),
            message: e.kind().to_string(),
        })
    }

    pub fn client_config(&self) -> ClientConfig {
        let gh = &self.github;
        let token = self.token().map(str::to_string);
        ClientConfig {
            api_url: gh.api_url.clone(),
            // GraphQL needs authentication; without a token use REST only
            graphql_url: (gh.use_graphql && token.is_some()).then(|| gh.graphql_url.clone()),
            token,
            timeout: Duration::from_secs(gh.timeout_secs),
            retry: RetryPolicy {
                max_retries: gh.max_retries,
                base_delay: Duration::from_millis(gh.base_delay_ms),
                max_delay: Duration::from_millis(gh.max_delay_ms),
            },
            per_page: self.fetch.per_page,
        }
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            early_termination_threshold: self.fetch.early_termination_threshold,
            max_pages: self.fetch.max_pages,
        }
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            cutoff_slack_days: self.extractor.cutoff_slack_days,
            max_consecutive_old: self.extractor.max_consecutive_old,
            ..Default::default()
        }
    }

    pub fn clone_options(&self) -> CloneOptions {
        CloneOptions {
            base_url: self.clone.base_url.clone(),
            shallow: self.clone.shallow,
            depth: self.clone.depth,
            token: self.token().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r##"
repositories = ["acme/widgets", "acme/gadgets.git"]
granularity = "monthly"
concurrency = 3

[github]
token = "file-token"
use_graphql = false
max_retries = 5

[range]
since = "2024-03-01"
until = "2024-03-31"

[[teams]]
name = "core"
members = ["alice", "bob"]
color = "#3366ff"

[scoring]
commit = 20

[cache]
ttl_hours = 2

[bots]
patterns = ["ci-*"]

[[aliases]]
login = "johndoe"
emails = ["jdoe@company.com"]

[clone]
shallow = true
depth = 50

[extractor]
max_consecutive_old = 40

[fetch]
early_termination_threshold = 3
"##;

    #[test]
    fn test_full_config() -> anyhow::Result<()> {
        let config: VelocityConfig = toml::from_str(FULL)?;
        config.validate()?;

        assert_eq!(config.granularity, Granularity::Monthly);
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.scoring.commit, 20);
        assert_eq!(config.scoring.pr_merged, 50);
        assert_eq!(config.cache.ttl(), Duration::from_secs(7200));
        assert_eq!(config.teams[0].color.as_deref(), Some("#3366ff"));
        assert_eq!(config.aliases[0].emails, vec!["jdoe@company.com".to_string()]);
        assert!(config.bot_filter()?.is_bot("CI-runner"));

        let client = config.client_config();
        assert_eq!(client.graphql_url, None);
        assert_eq!(client.retry.max_retries, 5);
        assert_eq!(config.fetch_config().early_termination_threshold, 3);
        assert_eq!(config.extract_options().max_consecutive_old, 40);
        assert_eq!(config.extract_options().cutoff_slack_days, 7);
        assert_eq!(config.clone_options().depth, 50);

        match config.selection()? {
            RepoSelection::Explicit(repos) => assert_eq!(
                repos,
                vec![RepoRef::new("acme", "widgets"), RepoRef::new("acme", "gadgets")]
            ),
            other => panic!("expected explicit selection, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_defaults() -> anyhow::Result<()> {
        let config: VelocityConfig = toml::from_str("repositories = [\"acme/widgets\"]")?;
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.granularity, Granularity::Range);
        assert!(config.cache.enabled);
        assert_eq!(config.extractor.cutoff_slack_days, 7);
        assert_eq!(config.fetch.early_termination_threshold, 2);
        assert!(config.date_range().since.is_none());
        Ok(())
    }

    #[test]
    fn test_review_width_shares_budget() -> anyhow::Result<()> {
        let mut config: VelocityConfig = toml::from_str("repositories = [\"acme/widgets\"]")?;
        assert_eq!(config.github.review_concurrency, 5);
        assert_eq!(config.review_width(1), 5);
        // Five repositories at once get one review worker each
        assert_eq!(config.review_width(12), 1);

        config.concurrency = 2;
        config.github.review_concurrency = 8;
        assert_eq!(config.review_width(3), 4);
        assert!(config.review_width(3) * config.concurrency <= 8);

        config.github.review_concurrency = 0;
        assert!(config.validate().is_err());
        Ok(())
    }

    #[test]
    fn test_env_token_wins() -> anyhow::Result<()> {
        let mut config: VelocityConfig = toml::from_str(FULL)?;
        config.apply_token_override(|key| (key == "GH_TOKEN").then(|| "env-token".to_string()));
        assert_eq!(config.token(), Some("env-token"));

        let mut config: VelocityConfig = toml::from_str(FULL)?;
        config.apply_token_override(|_| Some("  ".to_string()));
        assert_eq!(config.token(), Some("file-token"));
        Ok(())
    }

    #[test]
    fn test_graphql_needs_token() -> anyhow::Result<()> {
        let mut config: VelocityConfig = toml::from_str("repositories = [\"acme/widgets\"]")?;
        assert_eq!(config.client_config().graphql_url, None);
        config.github.token = Some("t".into());
        assert_eq!(
            config.client_config().graphql_url.as_deref(),
            Some("https://api.github.com/graphql")
        );
        Ok(())
    }

    #[test]
    fn test_validation_errors() -> anyhow::Result<()> {
        let mut config: VelocityConfig = toml::from_str(FULL)?;
        config.range.since = NaiveDate::from_ymd_opt(2024, 4, 1);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRange { .. })));

        let mut config: VelocityConfig = toml::from_str(FULL)?;
        config.github.token = None;
        assert!(matches!(config.validate(), Err(ConfigError::MissingToken)));
        // History-only runs over explicit repositories need no token
        config.github.enabled = false;
        assert!(config.validate().is_ok());

        let mut config: VelocityConfig = toml::from_str(FULL)?;
        config.repositories.push("not-a-repo".into());
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRepository(_))));

        let mut config: VelocityConfig = toml::from_str(FULL)?;
        config.repositories.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoRepositories)));

        let mut config: VelocityConfig = toml::from_str(FULL)?;
        config.selection = Some(SelectionConfig {
            owner: "acme".into(),
            pattern: "*".into(),
            include_forks: false,
            include_archived: false,
        });
        assert!(matches!(config.validate(), Err(ConfigError::ConflictingSelection)));

        let mut config: VelocityConfig = toml::from_str(FULL)?;
        config.bots.patterns.push("[oops".into());
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPattern { .. })));

        let mut config: VelocityConfig = toml::from_str(FULL)?;
        config.concurrency = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidConcurrency)));
        Ok(())
    }

    #[test]
    fn test_pattern_selection() -> anyhow::Result<()> {
        let config: VelocityConfig = toml::from_str(
            r#"
[selection]
owner = "acme"
pattern = "widget-*"
include_archived = true
"#,
        )?;
        match config.selection()? {
            RepoSelection::Pattern(pattern) => {
                assert_eq!(pattern.owner, "acme");
                assert!(pattern.include_archived);
                assert!(!pattern.include_forks);
            }
            other => panic!("expected pattern selection, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_load_config_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("velocity.toml");
        std::fs::write(&path, "repositories = [\"acme/widgets\"]\n")?;
        let config = load_config(&path)?;
        assert_eq!(config.repositories, vec!["acme/widgets".to_string()]);

        let missing = load_config(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
        Ok(())
    }
}
