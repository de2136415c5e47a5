//! gitvelocity - contributor velocity metrics from git history and GitHub
//!
//! Collects commits from local clones and pull requests, reviews and issues
//! from the GitHub API, reconciles the many identities one person shows up
//! under, then aggregates everything into per-contributor, per-repository,
//! per-team and per-period metrics with gamification scores.
//!
//! The entry point for a full run is [`pipeline::Pipeline`]. Every stage is
//! also usable on its own:
//!
//! ```no_run
//! use gitvelocity::cancel::CancellationToken;
//! use gitvelocity::config::load_config;
//! use gitvelocity::pipeline::Pipeline;
//! use gitvelocity::progress::TracingReporter;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = load_config("velocity.toml".as_ref())?;
//! let report = Pipeline::new(&config, CancellationToken::new(), &TracingReporter).run()?;
//! println!("{} contributors", report.metrics.contributors.len());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cancel;
pub mod classifier;
pub mod config;
pub mod git;
pub mod github;
pub mod identity;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod scoring;
