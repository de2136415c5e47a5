//! Init command - write an example velocity.toml

use anyhow::{bail, Context, Result};
use console::style;
use std::path::Path;

const EXAMPLE_CONFIG: &str = r##"# gitvelocity configuration

# Explicit repositories: any failure aborts the run.
repositories = ["acme/widgets"]

# Or select by owner and glob; failing repositories are skipped.
# [selection]
# owner = "acme"
# pattern = "widget-*"
# include_forks = false
# include_archived = false

# daily, weekly, monthly or range
granularity = "weekly"
concurrency = 5

[github]
# GITHUB_TOKEN / GH_TOKEN take priority over this
# token = "ghp_..."
use_graphql = true
max_retries = 3
# Review requests in flight, shared by repositories collected at once
review_concurrency = 5

[range]
# Either side may be left open
since = "2024-01-01"
# until = "2024-12-31"

[scoring]
commit = 10
pr_opened = 25
pr_merged = 50
review = 30
comment = 5
per_line = 0.1
meaningful_lines_only = true

[cache]
enabled = true
ttl_hours = 24

[clone]
shallow = false

[bots]
# Added to the built-in list (dependabot*, renovate*, *[bot], ...)
patterns = []

# [[teams]]
# name = "core"
# members = ["alice", "bob"]
# color = "#3b82f6"

# [[aliases]]
# login = "johndoe"
# emails = ["jdoe@company.com"]
# names = ["John Doe"]
"##;

pub fn run(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    std::fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{} Created {}", style("✓").green(), style(path.display()).cyan());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitvelocity::config::{RepoSelection, VelocityConfig};
    use gitvelocity::metrics::Granularity;

    #[test]
    fn test_example_config_parses() -> Result<()> {
        let config: VelocityConfig = toml::from_str(EXAMPLE_CONFIG)?;
        assert_eq!(config.granularity, Granularity::Weekly);
        assert_eq!(config.scoring.pr_merged, 50);
        assert!(matches!(config.selection()?, RepoSelection::Explicit(ref r) if r.len() == 1));
        assert!(config.date_range().until.is_none());
        Ok(())
    }

    #[test]
    fn test_refuses_to_overwrite() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("velocity.toml");
        run(&path, false)?;
        assert!(run(&path, false).is_err());
        run(&path, true)?;
        Ok(())
    }
}
