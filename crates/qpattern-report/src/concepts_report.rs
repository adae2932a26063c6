//! Markdown summary of the extracted concepts, one table per framework.

use anyhow::{Context, Result};
use qpattern_ingest::Framework;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

pub const CONCEPTS_SUMMARY_FILE: &str = "extracted_concepts_summary.md";

fn display_name(framework: Framework) -> &'static str {
    match framework {
        Framework::Qiskit => "Qiskit",
        Framework::Pennylane => "PennyLane",
        Framework::Classiq => "Classiq",
    }
}

/// `(name, summary)` rows of `<fw>_quantum_concepts.csv`; `None` when the file
/// is missing or unreadable.
pub fn read_concepts_csv(path: &Path, delimiter: u8) -> Option<Vec<(String, String)>> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "concepts file not found");
        return None;
    }
    let rows = (|| -> Result<Vec<(String, String)>> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_path(path)?;
        let headers = reader.headers()?.clone();
        let name_idx = headers.iter().position(|h| h == "name");
        let summary_idx = headers.iter().position(|h| h == "summary");
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let name = name_idx.and_then(|i| record.get(i)).unwrap_or("N/A");
            let summary = summary_idx.and_then(|i| record.get(i)).unwrap_or("");
            rows.push((name.to_string(), summary.to_string()));
        }
        Ok(rows)
    })();
    match rows {
        Ok(rows) => Some(rows),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "could not read concepts file");
            None
        }
    }
}

/// `| Concept Name | Summary |` table; `|` escaped and whitespace collapsed.
pub fn concepts_table(rows: &[(String, String)]) -> String {
    if rows.is_empty() {
        return "*No concepts were extracted for this framework.*\n".to_string();
    }
    let mut md = String::from("| Concept Name | Summary |\n|--------------|---------|\n");
    for (name, summary) in rows {
        let name = name.trim().replace('|', "\\|");
        let summary = summary.split_whitespace().collect::<Vec<_>>().join(" ").replace('|', "\\|");
        let _ = writeln!(md, "| `{name}` | {summary} |");
    }
    md
}

pub fn render_concepts_summary(results_dir: &Path) -> String {
    let mut parts = vec![
        "# Summary of Extracted Quantum Concepts (Pre-Classification)\n".to_string(),
        "This document summarizes the quantum concepts automatically extracted from the source \
         code of the Qiskit, PennyLane, and Classiq frameworks. They are the input of the manual \
         pattern classification step.\n"
            .to_string(),
    ];
    for framework in [Framework::Qiskit, Framework::Pennylane, Framework::Classiq] {
        parts.push(format!("## {} Concepts\n", display_name(framework)));
        let path = results_dir.join(framework.concepts_csv_file());
        match read_concepts_csv(&path, framework.concepts_csv_delimiter()) {
            Some(rows) if !rows.is_empty() => parts.push(concepts_table(&rows)),
            _ => parts.push("*No concepts found or file was missing.*\n".to_string()),
        }
    }
    parts.join("\n")
}

pub fn write_concepts_summary(results_dir: &Path, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, render_concepts_summary(results_dir))
        .with_context(|| format!("Failed to write {}", output.display()))
}
