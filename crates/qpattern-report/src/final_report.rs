//! The final pattern report in text, Markdown, LaTeX and CSV form.

use crate::matches::{capitalize, load_matches};
use crate::stats::{Statistics, TOP_N_CONCEPTS};
use crate::table::Table;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Markdown,
}

struct ReportWriter {
    format: ReportFormat,
    out: String,
}

impl ReportWriter {
    fn is_md(&self) -> bool {
        self.format == ReportFormat::Markdown
    }

    fn line(&mut self, s: &str) {
        self.out.push_str(s);
        self.out.push('\n');
    }

    /// Markdown text or plain text, depending on the format.
    fn either(&mut self, md: &str, txt: &str) {
        let s = if self.is_md() { md } else { txt };
        self.line(s);
    }

    fn section(&mut self, title: &str) {
        let (md, txt) = (format!("## {title}"), format!("\n--- {title} ---"));
        self.either(&md, &txt);
    }

    fn sub(&mut self, title: &str) {
        let (md, txt) = (format!("\n### {title}\n"), format!("\n{title}:"));
        self.either(&md, &txt);
    }

    /// Table title; `txt_prefix` is the spacing before it in plain text.
    fn sub_raw(&mut self, title: &str, txt_prefix: &str) {
        let (md, txt) = (format!("\n### {title}\n"), format!("{txt_prefix}{title}"));
        self.either(&md, &txt);
    }

    fn table(&mut self, table: &Table) {
        let rendered = if self.is_md() {
            table.to_markdown()
        } else {
            table.to_text()
        };
        self.line(&rendered);
    }

    fn rule(&mut self) {
        let txt = format!("\n{}", "-".repeat(80));
        self.either("\n---\n", &txt);
    }

    fn stat(&mut self, label: &str, value: impl std::fmt::Display) {
        let md = format!("- **{label}:** {value}");
        let txt = format!("{:<30}{value}", format!("{label}:"));
        self.either(&md, &txt);
    }
}

/// Render the seven-section report.
pub fn render_report(stats: &Statistics, format: ReportFormat) -> String {
    let mut w = ReportWriter {
        format,
        out: String::new(),
    };
    let banner = "=".repeat(80);

    if w.is_md() {
        w.line("# QUANTUM CONCEPT ANALYSIS REPORT\n");
    } else {
        w.line(&format!(
            "{banner}\n                      QUANTUM CONCEPT ANALYSIS REPORT\n{banner}"
        ));
    }

    w.section("I. Overall Summary");
    w.stat("Total Matches Found", stats.total_matches);
    w.stat("Unique Files with Matches", stats.unique_files);
    w.stat("Unique Concepts Matched", stats.unique_concepts);
    w.stat("Total Patterns Defined", stats.patterns_defined);
    w.stat("Total Patterns Found", stats.found_patterns.len());
    w.stat("Average Similarity Score", format!("{:.4}", stats.avg_score));

    w.either("\n## II. Match Type Breakdown", "\n--- II. Match Type Breakdown ---");
    w.either("\n### Match Type Counts\n", "");
    w.table(&stats.match_type_table());
    w.sub("Average Score by Match Type");
    if stats.avg_score_by_type.is_empty() {
        w.line("No similarity score data available.");
    } else {
        w.table(&stats.avg_score_by_type_table());
    }
    w.rule();

    w.section("III. Source Framework & Target Project Breakdown");
    w.sub("Matches by Source Framework");
    w.table(&stats.framework_table());
    w.sub("Matches by Target Project");
    w.table(&stats.project_table());
    w.rule();

    if let Some(p) = &stats.patterns {
        w.section("IV. Cross-Framework Pattern Analysis");
        w.sub_raw("Table 4.1: Source Pattern Analysis (Where patterns originate)", "\n");
        w.table(&p.source_analysis_table());
        w.sub_raw("Table 4.2: Adoption Pattern Analysis (Where patterns are used)", "\n\n");
        w.table(&p.adoption_analysis_table());
        w.rule();

        w.section("V. Quantum Pattern Analysis");
        w.sub("Patterns by Match Count (Overall)");
        w.table(&p.pattern_count_table());
        w.sub("Average Score by Pattern");
        w.table(&p.avg_score_by_pattern_table());
        w.sub("All Patterns within each Source Framework (Sorted by Frequency)");
        for (framework, table) in p.framework_pattern_tables() {
            let (md, txt) = (
                format!("\n#### {}\n", capitalize(&framework)),
                format!("\n  -- {framework} --"),
            );
            w.either(&md, &txt);
            w.table(&table);
        }
    }
    w.rule();

    w.section("VI. Top Matched Concepts");
    w.sub(&format!("Top {TOP_N_CONCEPTS} Most Frequently Matched Concepts"));
    w.table(&stats.top_concepts_table());
    w.rule();

    w.section("VII. Unmatched Pattern Analysis");
    if stats.unmatched_patterns.is_empty() {
        w.line("\nAll patterns defined in the source files were found in the analysis.");
    } else {
        let n = stats.unmatched_patterns.len();
        let md = format!(
            "\nThe following **{n}** patterns from the source files were **NOT found** in any project:\n"
        );
        let txt = format!(
            "\nThe following {n} patterns from the source files were NOT found in any project:"
        );
        w.either(&md, &txt);
        for pattern in &stats.unmatched_patterns {
            w.line(&format!("- {pattern}"));
        }
    }

    if !w.is_md() {
        w.line(&format!(
            "\n{banner}\n                              END OF REPORT\n{banner}"
        ));
    }
    w.out
}

// ============================================================================
// LaTeX and CSV tables
// ============================================================================

fn write_latex_table(
    table: &Table,
    dir: &Path,
    caption: &str,
    label: &str,
    file: &str,
    texttt: &[&str],
    written: &mut Vec<PathBuf>,
) -> Result<()> {
    if table.is_empty() {
        tracing::info!(file, "skipping empty table");
        return Ok(());
    }
    let path = dir.join(file);
    fs::write(&path, table.to_latex(caption, label, texttt))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    written.push(path);
    Ok(())
}

/// Write one `.tex` file per non-empty table; returns the files written.
pub fn write_latex_tables(stats: &Statistics, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let mut written = Vec::new();
    let mut emit = |table: Table, caption: &str, label: &str, file: &str, texttt: &[&str]| {
        write_latex_table(&table, dir, caption, label, file, texttt, &mut written)
    };

    emit(
        stats.top_concepts_table(),
        &format!("Top {TOP_N_CONCEPTS} Most Frequently Matched Quantum Concepts"),
        "top-quantum-concepts",
        "top_matched_concepts.tex",
        &["Concept"],
    )?;
    emit(
        stats.match_type_table().renamed(&["Match Type", "Count"]),
        "Count of Matches by Type",
        "match-type-counts",
        "match_type_counts.tex",
        &[],
    )?;
    emit(
        stats.avg_score_by_type_table().renamed(&["Match Type", "Average Score"]),
        "Average Similarity Score by Match Type",
        "avg-score-by-type",
        "avg_score_by_type.tex",
        &[],
    )?;
    emit(
        stats.framework_table().renamed(&["Source Framework", "Matches"]),
        "Total Matches per Source Framework",
        "matches-by-framework",
        "matches_by_framework.tex",
        &[],
    )?;
    emit(
        stats.project_table().renamed(&["Target Project", "Matches"]),
        "Total Matches per Target Project",
        "matches-by-project",
        "matches_by_project.tex",
        &[],
    )?;

    if let Some(p) = &stats.patterns {
        emit(
            p.source_analysis_table()
                .renamed(&["Pattern", "Total Matches", "Source Frameworks"]),
            "Source Pattern Analysis: Origin and Frequency",
            "source-pattern-analysis",
            "source_pattern_analysis.tex",
            &[],
        )?;
        emit(
            p.adoption_analysis_table()
                .renamed(&["Pattern", "Project Coverage", "Found In Projects"]),
            "Adoption Pattern Analysis: Usage Across Target Projects",
            "adoption-pattern-analysis",
            "adoption_pattern_analysis.tex",
            &[],
        )?;
        emit(
            p.pattern_count_table().renamed(&["Pattern", "Total Matches"]),
            "Frequency of Quantum Patterns by Match Count",
            "patterns-by-match-count",
            "patterns_by_match_count.tex",
            &[],
        )?;
        emit(
            p.avg_score_by_pattern_table().renamed(&["Pattern", "Average Score"]),
            "Average Similarity Score by Pattern",
            "avg-score-by-pattern",
            "avg_score_by_pattern.tex",
            &[],
        )?;
        for (framework, table) in p.framework_pattern_tables() {
            let lower = framework.to_lowercase();
            emit(
                table.renamed(&["Pattern", "Matches"]),
                &format!("Pattern Frequency in {}", capitalize(&framework)),
                &format!("patterns-in-{lower}"),
                &format!("patterns_in_{lower}.tex"),
                &[],
            )?;
        }
    }
    Ok(written)
}

/// Export every table as CSV; returns the number of files written.
pub fn export_csv_tables(stats: &Statistics, dir: &Path) -> Result<usize> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let mut tables: Vec<(String, Table)> = vec![
        ("match_type_counts.csv".into(), stats.match_type_table()),
        ("avg_score_by_type.csv".into(), stats.avg_score_by_type_table()),
        ("matches_by_framework.csv".into(), stats.framework_table()),
        ("matches_by_project.csv".into(), stats.project_table()),
    ];
    if let Some(p) = &stats.patterns {
        tables.push(("source_pattern_analysis.csv".into(), p.source_analysis_table()));
        tables.push(("adoption_pattern_analysis.csv".into(), p.adoption_analysis_table()));
        tables.push(("patterns_by_match_count.csv".into(), p.pattern_count_table()));
        tables.push(("avg_score_by_pattern.csv".into(), p.avg_score_by_pattern_table()));
        for (framework, table) in p.framework_pattern_tables() {
            tables.push((format!("patterns_in_{}.csv", framework.to_lowercase()), table));
        }
    }
    tables.push(("top_matched_concepts.csv".into(), stats.top_concepts_table()));
    if !stats.unmatched_patterns.is_empty() {
        tables.push(("unmatched_patterns.csv".into(), stats.unmatched_table()));
    }

    for (file, table) in &tables {
        table.write_csv(&dir.join(file))?;
    }
    Ok(tables.len())
}

// ============================================================================
// Orchestration
// ============================================================================

/// Where the final report reads from and writes to.
#[derive(Debug, Clone)]
pub struct FinalReportPaths {
    pub matches_csv: PathBuf,
    pub pattern_files: Vec<PathBuf>,
    pub text_report: PathBuf,
    pub markdown_report: PathBuf,
    pub latex_dir: PathBuf,
    pub csv_dir: PathBuf,
}

impl FinalReportPaths {
    pub fn standard(results_dir: &Path, docs_dir: &Path, pattern_files: Vec<PathBuf>) -> Self {
        Self {
            matches_csv: results_dir.join("quantum_concept_matches_with_patterns.csv"),
            pattern_files,
            text_report: results_dir.join("final_pattern_report.txt"),
            markdown_report: docs_dir.join("final_pattern_report.md"),
            latex_dir: results_dir.join("latex_report_tables"),
            csv_dir: results_dir.join("report"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalReportSummary {
    pub total_matches: usize,
    pub latex_tables: usize,
    pub csv_tables: usize,
}

/// Load matches and catalog patterns, then write every report artifact.
pub fn generate_final_report(
    paths: &FinalReportPaths,
    all_patterns: &BTreeSet<String>,
) -> Result<FinalReportSummary> {
    let matches = load_matches(&paths.matches_csv)?;
    let stats = Statistics::compute(&matches, all_patterns, TOP_N_CONCEPTS);

    for (path, format) in [
        (&paths.text_report, ReportFormat::Text),
        (&paths.markdown_report, ReportFormat::Markdown),
    ] {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, render_report(&stats, format))
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let latex = write_latex_tables(&stats, &paths.latex_dir)?;
    let csv_tables = export_csv_tables(&stats, &paths.csv_dir)?;
    Ok(FinalReportSummary {
        total_matches: stats.total_matches,
        latex_tables: latex.len(),
        csv_tables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::{extract_framework, extract_project, MatchRow};

    fn row(file: &str, concept: &str, pattern: Option<&str>, score: f64) -> MatchRow {
        MatchRow {
            file_path: file.into(),
            concept_name: concept.into(),
            pattern: pattern.map(str::to_string),
            match_type: "name".into(),
            matched_text: String::new(),
            similarity_score: Some(score),
            framework: extract_framework(concept),
            project: extract_project(file),
        }
    }

    #[test]
    fn text_report_has_banner_sections_and_footer() {
        let rows = vec![row("p/a.py", "/qiskit/q.QFT", Some("QFT"), 0.95)];
        let all: BTreeSet<String> = ["QFT".to_string(), "Oracle".to_string()].into();
        let stats = Statistics::compute(&rows, &all, TOP_N_CONCEPTS);
        let txt = render_report(&stats, ReportFormat::Text);
        assert!(txt.starts_with(&"=".repeat(80)));
        assert!(txt.contains("Total Matches Found:          1\n"));
        assert!(txt.contains("Average Similarity Score:     0.9500\n"));
        assert!(txt.contains("\n--- IV. Cross-Framework Pattern Analysis ---\n"));
        assert!(txt.contains("\n  -- qiskit --\n"));
        assert!(txt.contains("- Oracle\n"));
        assert!(txt.contains("END OF REPORT"));
    }

    #[test]
    fn markdown_report_omits_pattern_sections_without_patterns() {
        let rows = vec![row("p/a.py", "/qiskit/q.QFT", None, 0.95)];
        let stats = Statistics::compute(&rows, &BTreeSet::new(), TOP_N_CONCEPTS);
        let md = render_report(&stats, ReportFormat::Markdown);
        assert!(md.starts_with("# QUANTUM CONCEPT ANALYSIS REPORT\n"));
        assert!(md.contains("- **Total Matches Found:** 1\n"));
        assert!(!md.contains("## IV."));
        assert!(!md.contains("## V."));
        assert!(md.contains("| Qiskit | ...QFT | 1 |"));
        assert!(md.contains("All patterns defined in the source files were found"));
        assert!(!md.contains("END OF REPORT"));
    }

    #[test]
    fn writer_titles_follow_the_format() {
        let mut md = ReportWriter { format: ReportFormat::Markdown, out: String::new() };
        md.sub_raw("Top Concepts", "\n  ");
        md.stat("Files", 3);
        assert_eq!(md.out, "\n### Top Concepts\n\n- **Files:** 3\n");

        let mut txt = ReportWriter { format: ReportFormat::Text, out: String::new() };
        txt.sub_raw("Top Concepts", "\n  ");
        txt.stat("Files", 3);
        assert_eq!(txt.out, format!("\n  Top Concepts\n{:<30}3\n", "Files:"));
    }
}
