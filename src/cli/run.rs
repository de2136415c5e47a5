//! Run command - collect, aggregate, score, write JSON

use anyhow::{Context, Result};
use console::style;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use gitvelocity::cancel::CancellationToken;
use gitvelocity::config::load_config;
use gitvelocity::metrics::GlobalMetrics;
use gitvelocity::pipeline::{Pipeline, RunReport};
use gitvelocity::progress::SpinnerReporter;
use gitvelocity::scoring::{catalog, AchievementRarity};

pub fn run(
    config_path: &Path,
    output: Option<&Path>,
    concurrency: Option<usize>,
    no_cache: bool,
) -> Result<()> {
    let start = Instant::now();
    let mut config = load_config(config_path)?;
    if let Some(n) = concurrency {
        config.concurrency = n;
    }
    if no_cache {
        config.cache.enabled = false;
    }

    let reporter = SpinnerReporter::new();
    let result = Pipeline::new(&config, CancellationToken::new(), &reporter).run();
    let report = match result {
        Ok(report) => {
            reporter.finish(&format!(
                "Collected {} repositories in {:.1}s",
                report.repositories.len(),
                start.elapsed().as_secs_f64()
            ));
            report
        }
        Err(e) => {
            reporter.finish("Run failed");
            return Err(e);
        }
    };

    write_metrics(&report.metrics, output)?;
    print_summary(&report);
    Ok(())
}

/// Pretty JSON to `output`, or stdout.
fn write_metrics(metrics: &GlobalMetrics, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(metrics)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{} Wrote {}", style("✓").green(), style(path.display()).cyan());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(json.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    for skipped in &report.skipped {
        eprintln!(
            "{} skipped {}: {}",
            style("warning:").yellow().bold(),
            skipped.repository,
            skipped.reason
        );
    }
    let metrics = &report.metrics;
    eprintln!(
        "{} contributors, {} commits, {} pull requests merged",
        style(metrics.contributors.len()).bold(),
        metrics.totals.commits,
        metrics.totals.prs_merged
    );
    for entry in metrics.leaderboard.iter().take(3) {
        eprintln!(
            "  {}. {} {}",
            entry.rank,
            style(&entry.login).cyan(),
            style(entry.score).dim()
        );
    }
    for line in rare_unlocks(metrics) {
        eprintln!("  {} {}", style("★").yellow(), line);
    }
}

/// Rare and better tiers somebody unlocked, in catalog order.
fn rare_unlocks(metrics: &GlobalMetrics) -> Vec<String> {
    catalog()
        .into_iter()
        .filter(|a| a.rarity >= AchievementRarity::Rare)
        .filter_map(|a| {
            let logins = metrics.achievements.get(&a.id).filter(|l| !l.is_empty())?;
            Some(format!("{} ({:?}): {}", a.name, a.rarity, logins.join(", ")))
        })
        .collect()
}
