//! Primary-language distribution of the quantum ecosystem on GitHub.
//!
//! Discovery writes `quantum_language_dist_<timestamp>.json`; this module
//! turns the newest one into a CSV table and a Markdown summary.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub const LANGUAGE_DIST_PREFIX: &str = "quantum_language_dist_";

/// Languages counted as the Python ecosystem.
pub const PYTHON_ECOSYSTEM: [&str; 2] = ["Python", "Jupyter Notebook"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageMeta {
    pub total_repos: u64,
    pub queries: Vec<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageDistribution {
    pub meta: LanguageMeta,
    pub distribution: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageRow {
    pub rank: usize,
    pub language: String,
    pub count: u64,
    pub percentage: f64,
}

fn percent(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

impl LanguageDistribution {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Ranked by count (descending), ties alphabetical.
    pub fn rows(&self) -> Vec<LanguageRow> {
        let mut entries: Vec<(&String, &u64)> = self.distribution.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(a.1));
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (language, &count))| LanguageRow {
                rank: i + 1,
                language: language.clone(),
                count,
                percentage: percent(count, self.meta.total_repos),
            })
            .collect()
    }

    /// Share of Python plus Jupyter Notebook repositories, in percent.
    pub fn python_share(&self) -> f64 {
        let count: u64 = PYTHON_ECOSYSTEM
            .iter()
            .filter_map(|lang| self.distribution.get(*lang))
            .sum();
        percent(count, self.meta.total_repos)
    }
}

/// Newest `quantum_language_dist_*.json` in `dir` by modification time.
pub fn latest_distribution_file(dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(LANGUAGE_DIST_PREFIX) && n.ends_with(".json"))
        })
        .filter_map(|p| {
            let modified = fs::metadata(&p).and_then(|m| m.modified()).ok()?;
            Some((modified, p))
        })
        .max()
        .map(|(_, p)| p)
}

pub fn write_language_csv(dist: &LanguageDistribution, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(["Rank", "Language", "Count", "Percentage"])?;
    for row in dist.rows() {
        writer.write_record([
            row.rank.to_string(),
            row.language,
            row.count.to_string(),
            format!("{:.2}%", row.percentage),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn render_language_markdown(dist: &LanguageDistribution, date: NaiveDate) -> String {
    let share = dist.python_share();
    let mut md = String::new();
    md.push_str("# Quantum Computing Open Source Language Distribution\n\n");
    let _ = writeln!(md, "**Total Repositories Analyzed:** {}\n", dist.meta.total_repos);
    let _ = writeln!(md, "**Date:** {}\n", date.format("%Y-%m-%d"));
    md.push_str("## Python Ecosystem Share\n");
    md.push_str(
        "**Python** and **Jupyter Notebook** repositories belong to the same scientific \
         computing ecosystem. Taken together:\n\n",
    );
    let _ = writeln!(md, "- **Python Ecosystem Share:** {share:.2}%");
    let _ = writeln!(md, "- **Other Languages:** {:.2}%\n", 100.0 - share);
    md.push_str("## Detailed Language Breakdown\n\n");
    md.push_str("| Rank | Language | Count | Percentage |\n");
    md.push_str("| :--- | :--- | :--- | :--- |\n");
    for row in dist.rows() {
        let emphasis = if row.rank <= 3 { "**" } else { "" };
        let _ = writeln!(
            md,
            "| {} | {emphasis}{}{emphasis} | {} | {:.2}% |",
            row.rank, row.language, row.count, row.percentage
        );
    }
    md
}

/// Convert the newest distribution in `data_dir` into
/// `quantum_stats_<timestamp>.{csv,md}` under `out_dir`.
pub fn generate_language_report(
    data_dir: &Path,
    out_dir: &Path,
    date: NaiveDate,
) -> Result<(PathBuf, PathBuf)> {
    let source = latest_distribution_file(data_dir).ok_or_else(|| {
        anyhow!(
            "No {LANGUAGE_DIST_PREFIX}*.json files found in '{}'. Run discovery first.",
            data_dir.display()
        )
    })?;
    let dist = LanguageDistribution::load(&source)?;
    fs::create_dir_all(out_dir)?;
    let base = format!("quantum_stats_{}", dist.meta.timestamp);
    let csv_path = out_dir.join(format!("{base}.csv"));
    let md_path = out_dir.join(format!("{base}.md"));
    write_language_csv(&dist, &csv_path)?;
    fs::write(&md_path, render_language_markdown(&dist, date))
        .with_context(|| format!("Failed to write {}", md_path.display()))?;
    Ok((csv_path, md_path))
}
