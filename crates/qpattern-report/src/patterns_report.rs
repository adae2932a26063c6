//! Markdown rendering of the downloaded pattern catalog.

use anyhow::{Context, Result};
use qpattern_ingest::Pattern;
use std::fs;
use std::path::Path;

pub const PATTERNS_REPORT_FILE: &str = "quantum_patterns_report.md";

/// Alias placeholder used by the catalog for "no alias".
const NO_ALIAS: &str = "—";

pub fn render_pattern(pattern: &Pattern) -> String {
    let mut parts = vec![format!("## {}\n", pattern.name)];
    let alias = pattern.alias.trim();
    if !alias.is_empty() && alias != NO_ALIAS {
        parts.push(format!("***Also known as:** {}*\n", pattern.alias));
    }
    let sections = [
        ("Intent", &pattern.intent),
        ("Context", &pattern.context),
        ("Problem & Forces", &pattern.forces),
        ("Solution", &pattern.solution),
        ("Resulting Context", &pattern.result),
    ];
    for (title, content) in sections {
        if !content.is_empty() {
            parts.push(format!("### {title}\n"));
            parts.push(format!("{}\n", content.trim()));
        }
    }
    parts.join("\n")
}

pub fn render_patterns_report(patterns: &[Pattern]) -> String {
    let mut parts = vec![
        "# Quantum Software Patterns Report\n".to_string(),
        "This document is generated from the quantum software patterns of the \
         [PlanQK Pattern Atlas](https://patternatlas.planqk.de/).\n"
            .to_string(),
    ];
    for (i, pattern) in patterns.iter().enumerate() {
        parts.push(render_pattern(pattern));
        if i + 1 < patterns.len() {
            parts.push("\n---\n".to_string());
        }
    }
    parts.join("\n")
}

/// Read `quantum_patterns.json` and write the Markdown report.
pub fn write_patterns_report(patterns_json: &Path, output: &Path) -> Result<usize> {
    let text = fs::read_to_string(patterns_json)
        .with_context(|| format!("Input file not found at '{}'", patterns_json.display()))?;
    let patterns: Vec<Pattern> = serde_json::from_str(&text)
        .with_context(|| format!("Could not parse {}", patterns_json.display()))?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, render_patterns_report(&patterns))
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(patterns.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(name: &str, alias: &str) -> Pattern {
        Pattern {
            name: name.into(),
            intent: "Make states.".into(),
            alias: alias.into(),
            context: String::new(),
            forces: "Forces.".into(),
            solution: " Apply H. ".into(),
            result: String::new(),
        }
    }

    #[test]
    fn pattern_sections_skip_empty_and_placeholder_alias() {
        let md = render_pattern(&pattern("Uniform Superposition", "—"));
        assert_eq!(
            md,
            "## Uniform Superposition\n\n### Intent\n\nMake states.\n\n### Problem & Forces\n\nForces.\n\n### Solution\n\nApply H.\n"
        );
        let md = render_pattern(&pattern("Oracle", "Black Box"));
        assert!(md.contains("***Also known as:** Black Box*\n"));
    }

    #[test]
    fn rules_separate_patterns_but_do_not_trail() {
        let report = render_patterns_report(&[pattern("A", ""), pattern("B", "")]);
        assert_eq!(report.matches("\n---\n").count(), 1);
        assert!(report.trim_end().ends_with("Apply H."));
    }
}
