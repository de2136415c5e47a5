//! CLI command definitions and handlers

mod cache;
mod init;
mod run;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// gitvelocity - contributor velocity metrics from git history and GitHub
#[derive(Parser, Debug)]
#[command(name = "gitvelocity")]
#[command(
    version,
    about = "Contributor velocity metrics and gamification scores from git history and the GitHub API",
    after_help = "\
Examples:
  gitvelocity init                                 Write an example velocity.toml
  gitvelocity run --config velocity.toml           Print metrics JSON to stdout
  gitvelocity run -c velocity.toml -o metrics.json Write metrics to a file
  gitvelocity cache clear                          Drop cached API responses

GITHUB_TOKEN (or GH_TOKEN) overrides [github].token."
)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace); RUST_LOG takes priority
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write an example velocity.toml
    Init {
        /// Where to write the config
        #[arg(default_value = "velocity.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Collect, aggregate and score; writes the metrics as JSON
    Run {
        /// Config file
        #[arg(long, short = 'c', default_value = "velocity.toml")]
        config: PathBuf,

        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Override the configured parallelism
        #[arg(long, value_parser = parse_concurrency)]
        concurrency: Option<usize>,

        /// Skip the result cache for this run
        #[arg(long)]
        no_cache: bool,
    },

    /// Manage the API result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Remove every cached entry
    Clear {
        /// Config file naming the cache directory (default location otherwise)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
    /// Print the cache directory
    Path {
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

/// Parse and validate a concurrency override (1-64)
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("concurrency must be at least 1".to_string())
    } else if n > 64 {
        Err("concurrency cannot exceed 64".to_string())
    } else {
        Ok(n)
    }
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { path, force } => init::run(&path, force),
        Commands::Run {
            config,
            output,
            concurrency,
            no_cache,
        } => run::run(&config, output.as_deref(), concurrency, no_cache),
        Commands::Cache { action } => match action {
            CacheAction::Clear { config } => cache::clear(config.as_deref()),
            CacheAction::Path { config } => cache::path(config.as_deref()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_flags() {
        let cli = Cli::try_parse_from([
            "gitvelocity",
            "run",
            "-c",
            "team.toml",
            "--output",
            "out.json",
            "--concurrency",
            "8",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                config,
                output,
                concurrency,
                no_cache,
            } => {
                assert_eq!(config, PathBuf::from("team.toml"));
                assert_eq!(output, Some(PathBuf::from("out.json")));
                assert_eq!(concurrency, Some(8));
                assert!(!no_cache);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.log_level, "warn");
    }

    #[test]
    fn test_concurrency_bounds() {
        assert!(Cli::try_parse_from(["gitvelocity", "run", "--concurrency", "0"]).is_err());
        assert!(Cli::try_parse_from(["gitvelocity", "run", "--concurrency", "65"]).is_err());
        assert!(Cli::try_parse_from(["gitvelocity", "run", "--concurrency", "x"]).is_err());
    }

    #[test]
    fn test_cache_clear_and_global_log_level() {
        let cli =
            Cli::try_parse_from(["gitvelocity", "cache", "clear", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(
            cli.command,
            Commands::Cache {
                action: CacheAction::Clear { config: None }
            }
        ));
    }

    #[test]
    fn test_command_required() {
        assert!(Cli::try_parse_from(["gitvelocity"]).is_err());
    }
}
