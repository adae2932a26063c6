//! Summary statistics over the match rows.
//!
//! Counting tables list entries by descending count; ties keep the order in
//! which entries first appear in the match CSV. Grouped tables (averages,
//! per-framework breakdowns) are keyed in sorted order before any re-sort.

use crate::matches::{capitalize, shorten_concept_name, MatchRow};
use crate::table::{Cell, Table};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const TOP_N_CONCEPTS: usize = 20;

/// Counts by key, descending; ties by first appearance.
pub fn value_counts<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in values {
        let n = counts.entry(v).or_insert(0);
        if *n == 0 {
            order.push(v);
        }
        *n += 1;
    }
    let mut out: Vec<(String, usize)> = order
        .into_iter()
        .map(|k| (k.to_string(), counts.get(k).copied().unwrap_or(0)))
        .collect();
    out.sort_by(|a, b| b.1.cmp(&a.1));
    out
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Mean score per key (sorted by key); keys without a usable score are dropped.
fn mean_scores<'a>(rows: impl IntoIterator<Item = (&'a str, Option<f64>)>) -> Vec<(String, f64)> {
    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for (key, score) in rows {
        let entry = sums.entry(key).or_insert((0.0, 0));
        if let Some(s) = score {
            entry.0 += s;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .filter(|(_, (_, n))| *n > 0)
        .map(|(k, (sum, n))| (k.to_string(), round4(sum / n as f64)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternSource {
    pub pattern: String,
    pub total_matches: usize,
    pub frameworks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternAdoption {
    pub pattern: String,
    pub project_coverage: usize,
    pub projects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopConcept {
    /// Capitalized framework name.
    pub framework: String,
    /// `...<symbol>`.
    pub concept: String,
    pub concept_name: String,
    pub matches: usize,
}

/// Statistics over the rows that carry a pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternStatistics {
    pub matches_by_pattern: Vec<(String, usize)>,
    /// Descending by score.
    pub avg_score_by_pattern: Vec<(String, f64)>,
    /// Descending by total matches.
    pub source_table: Vec<PatternSource>,
    /// Descending by project coverage.
    pub adoption_table: Vec<PatternAdoption>,
    /// Framework (sorted) → pattern counts (descending).
    pub patterns_in_frameworks: Vec<(String, Vec<(String, usize)>)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub total_matches: usize,
    pub unique_files: usize,
    pub unique_concepts: usize,
    pub patterns_defined: usize,
    pub found_patterns: BTreeSet<String>,
    pub avg_score: f64,
    pub matches_by_type: Vec<(String, usize)>,
    pub avg_score_by_type: Vec<(String, f64)>,
    pub matches_by_framework: Vec<(String, usize)>,
    pub matches_by_project: Vec<(String, usize)>,
    /// `None` when no row carries a pattern.
    pub patterns: Option<PatternStatistics>,
    pub top_concepts: Vec<TopConcept>,
    pub unmatched_patterns: Vec<String>,
}

impl Statistics {
    pub fn compute(matches: &[MatchRow], all_patterns: &BTreeSet<String>, top_n: usize) -> Self {
        let scores: Vec<f64> = matches.iter().filter_map(|m| m.similarity_score).collect();
        let (avg_score, avg_score_by_type) = if scores.is_empty() {
            (0.0, Vec::new())
        } else {
            (
                scores.iter().sum::<f64>() / scores.len() as f64,
                mean_scores(matches.iter().map(|m| (m.match_type.as_str(), m.similarity_score))),
            )
        };

        let with_patterns: Vec<(&MatchRow, &str)> = matches
            .iter()
            .filter_map(|m| m.pattern.as_deref().map(|p| (m, p)))
            .collect();
        let found_patterns: BTreeSet<String> =
            with_patterns.iter().map(|(_, p)| p.to_string()).collect();

        let patterns = if with_patterns.is_empty() {
            None
        } else {
            Some(pattern_statistics(&with_patterns))
        };

        let framework_of: HashMap<&str, &str> = matches
            .iter()
            .map(|m| (m.concept_name.as_str(), m.framework.as_str()))
            .collect();
        let top_concepts = value_counts(matches.iter().map(|m| m.concept_name.as_str()))
            .into_iter()
            .take(top_n)
            .map(|(name, count)| TopConcept {
                framework: capitalize(framework_of.get(name.as_str()).copied().unwrap_or("unknown")),
                concept: shorten_concept_name(&name),
                concept_name: name,
                matches: count,
            })
            .collect();

        Self {
            total_matches: matches.len(),
            unique_files: matches.iter().map(|m| &m.file_path).collect::<BTreeSet<_>>().len(),
            unique_concepts: matches.iter().map(|m| &m.concept_name).collect::<BTreeSet<_>>().len(),
            patterns_defined: all_patterns.len(),
            unmatched_patterns: all_patterns.difference(&found_patterns).cloned().collect(),
            found_patterns,
            avg_score,
            matches_by_type: value_counts(matches.iter().map(|m| m.match_type.as_str())),
            avg_score_by_type,
            matches_by_framework: value_counts(matches.iter().map(|m| m.framework.as_str())),
            matches_by_project: value_counts(matches.iter().map(|m| m.project.as_str())),
            patterns,
            top_concepts,
        }
    }

    // ------------------------------------------------------------------------
    // Tables (pandas-style column names; LaTeX renames them)
    // ------------------------------------------------------------------------

    pub fn match_type_table(&self) -> Table {
        count_table("match_type", &self.matches_by_type)
    }

    pub fn avg_score_by_type_table(&self) -> Table {
        score_table("match_type", &self.avg_score_by_type)
    }

    pub fn framework_table(&self) -> Table {
        count_table("framework", &self.matches_by_framework)
    }

    pub fn project_table(&self) -> Table {
        count_table("project", &self.matches_by_project)
    }

    pub fn top_concepts_table(&self) -> Table {
        let mut t = Table::new(&["Framework", "Concept", "Matches"]);
        for c in &self.top_concepts {
            t.push(vec![
                Cell::text(c.framework.as_str()),
                Cell::text(c.concept.as_str()),
                Cell::Int(c.matches),
            ]);
        }
        t
    }

    pub fn unmatched_table(&self) -> Table {
        let mut t = Table::new(&["unmatched_patterns"]);
        for p in &self.unmatched_patterns {
            t.push(vec![Cell::text(p.as_str())]);
        }
        t
    }
}

impl PatternStatistics {
    pub fn source_analysis_table(&self) -> Table {
        let mut t = Table::new(&["pattern", "Total Matches", "Source Frameworks"]);
        for s in &self.source_table {
            t.push(vec![
                Cell::text(s.pattern.as_str()),
                Cell::Int(s.total_matches),
                Cell::text(s.frameworks.join(", ")),
            ]);
        }
        t
    }

    pub fn adoption_analysis_table(&self) -> Table {
        let mut t = Table::new(&["pattern", "Project Coverage", "Found In Projects"]);
        for a in &self.adoption_table {
            t.push(vec![
                Cell::text(a.pattern.as_str()),
                Cell::Int(a.project_coverage),
                Cell::text(a.projects.join(", ")),
            ]);
        }
        t
    }

    pub fn pattern_count_table(&self) -> Table {
        count_table("pattern", &self.matches_by_pattern)
    }

    pub fn avg_score_by_pattern_table(&self) -> Table {
        score_table("pattern", &self.avg_score_by_pattern)
    }

    pub fn framework_pattern_tables(&self) -> Vec<(String, Table)> {
        self.patterns_in_frameworks
            .iter()
            .map(|(fw, counts)| (fw.clone(), count_table("pattern", counts)))
            .collect()
    }
}

fn count_table(key: &str, counts: &[(String, usize)]) -> Table {
    let mut t = Table::new(&[key, "count"]);
    for (k, n) in counts {
        t.push(vec![Cell::text(k.as_str()), Cell::Int(*n)]);
    }
    t
}

fn score_table(key: &str, scores: &[(String, f64)]) -> Table {
    let mut t = Table::new(&[key, "similarity_score"]);
    for (k, s) in scores {
        t.push(vec![Cell::text(k.as_str()), Cell::Float(*s)]);
    }
    t
}

fn pattern_statistics(rows: &[(&MatchRow, &str)]) -> PatternStatistics {
    let matches_by_pattern = value_counts(rows.iter().map(|(_, p)| *p));

    let mut avg_score_by_pattern = mean_scores(rows.iter().map(|(m, p)| (*p, m.similarity_score)));
    avg_score_by_pattern.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut grouped: BTreeMap<&str, (usize, BTreeSet<&str>, BTreeSet<&str>)> = BTreeMap::new();
    for (m, p) in rows {
        let entry = grouped.entry(*p).or_default();
        entry.0 += 1;
        entry.1.insert(m.framework.as_str());
        entry.2.insert(m.project.as_str());
    }

    let mut source_table: Vec<PatternSource> = grouped
        .iter()
        .map(|(p, (n, fws, _))| PatternSource {
            pattern: p.to_string(),
            total_matches: *n,
            frameworks: fws.iter().map(|s| s.to_string()).collect(),
        })
        .collect();
    source_table.sort_by(|a, b| b.total_matches.cmp(&a.total_matches));

    let mut adoption_table: Vec<PatternAdoption> = grouped
        .iter()
        .map(|(p, (_, _, projects))| PatternAdoption {
            pattern: p.to_string(),
            project_coverage: projects.len(),
            projects: projects.iter().map(|s| s.to_string()).collect(),
        })
        .collect();
    adoption_table.sort_by(|a, b| b.project_coverage.cmp(&a.project_coverage));

    let mut by_framework: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (m, p) in rows {
        by_framework.entry(m.framework.as_str()).or_default().push(*p);
    }
    let patterns_in_frameworks = by_framework
        .into_iter()
        .map(|(fw, patterns)| (fw.to_string(), value_counts(patterns)))
        .collect();

    PatternStatistics {
        matches_by_pattern,
        avg_score_by_pattern,
        source_table,
        adoption_table,
        patterns_in_frameworks,
    }
}
