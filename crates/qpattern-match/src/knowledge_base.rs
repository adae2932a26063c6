//! Concept ↔ pattern knowledge base.
//!
//! The enriched CSVs (one per framework) map concept names to catalog
//! patterns. Column 0 is the concept name and column 2 the pattern; other
//! columns are carried through consolidation untouched.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Pattern assigned to concepts without a mapping.
pub const UNMAPPED_PATTERN: &str = "N/A";

/// Last `/` segment, then last `.` segment.
pub fn extract_short_name(full_name: &str) -> String {
    let last = full_name.rsplit('/').next().unwrap_or("");
    last.rsplit('.').next().unwrap_or("").to_string()
}

/// Concept name → pattern, remembering first-insertion order of keys.
#[derive(Debug, Clone, Default)]
pub struct PatternMap {
    keys: Vec<String>,
    values: HashMap<String, String>,
}

impl PatternMap {
    /// Later inserts overwrite the value but keep the key's original position.
    pub fn insert(&mut self, concept: &str, pattern: &str) {
        if !self.values.contains_key(concept) {
            self.keys.push(concept.to_string());
        }
        self.values.insert(concept.to_string(), pattern.to_string());
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Exact name, then short name (the last key sharing it wins), then the
    /// first key the name ends with.
    pub fn lookup(&self, full_name: &str) -> Option<&str> {
        if let Some(p) = self.values.get(full_name) {
            return Some(p);
        }
        let short = extract_short_name(full_name);
        if let Some(key) = self.keys.iter().rev().find(|k| extract_short_name(k) == short) {
            return self.values.get(key).map(String::as_str);
        }
        self.keys
            .iter()
            .find(|key| full_name.ends_with(key.as_str()))
            .and_then(|key| self.values.get(key))
            .map(String::as_str)
    }
}

fn read_pattern_rows(path: &Path) -> Result<Vec<(String, String)>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() < 3 {
            continue;
        }
        let concept = record.get(0).unwrap_or("").trim();
        let pattern = record.get(2).unwrap_or("").trim();
        if !concept.is_empty() && !pattern.is_empty() {
            rows.push((concept.to_string(), pattern.to_string()));
        }
    }
    Ok(rows)
}

/// Load mappings from the enriched CSVs; missing or unreadable files are skipped.
pub fn load_patterns_map(files: &[PathBuf]) -> PatternMap {
    let mut map = PatternMap::default();
    for path in files {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "pattern file not found");
            continue;
        }
        match read_pattern_rows(path) {
            Ok(rows) => {
                for (concept, pattern) in rows {
                    map.insert(&concept, &pattern);
                }
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "could not load patterns")
            }
        }
    }
    map
}

/// A concept with its short name and resolved pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedConcept {
    pub name: String,
    pub summary: String,
    pub short_name: String,
    pub pattern: String,
}

impl MappedConcept {
    pub fn is_mapped(&self) -> bool {
        self.pattern != UNMAPPED_PATTERN
    }
}

/// Load the concept JSON files and attach patterns. Missing files are skipped.
pub fn load_quantum_concepts(files: &[PathBuf], map: &PatternMap) -> Vec<MappedConcept> {
    let mut out = Vec::new();
    for path in files {
        if !path.exists() {
            continue;
        }
        let parsed = fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|text| Ok(serde_json::from_str::<Vec<serde_json::Value>>(&text)?));
        let items = match parsed {
            Ok(items) => items,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "could not load concepts");
                continue;
            }
        };
        for item in items {
            let (Some(name), Some(summary)) = (
                item.get("name").and_then(|v| v.as_str()),
                item.get("summary").and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            out.push(MappedConcept {
                name: name.to_string(),
                summary: summary.to_string(),
                short_name: extract_short_name(name),
                pattern: map.lookup(name).unwrap_or(UNMAPPED_PATTERN).to_string(),
            });
        }
    }
    out
}

/// Write `name,summary` of unmapped concepts; with none, remove a stale file.
/// Returns the number of unmapped concepts.
pub fn save_unclassified(concepts: &[MappedConcept], path: &Path) -> Result<usize> {
    let unmapped: Vec<&MappedConcept> = concepts.iter().filter(|c| !c.is_mapped()).collect();
    if unmapped.is_empty() {
        if path.exists() {
            fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        return Ok(0);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(["name", "summary"])?;
    for c in &unmapped {
        writer.write_record([c.name.as_str(), c.summary.as_str()])?;
    }
    writer.flush()?;
    Ok(unmapped.len())
}

/// Every non-empty value of the `pattern` column in the enriched CSVs.
/// Files without that column are skipped.
pub fn load_all_patterns(files: &[PathBuf]) -> BTreeSet<String> {
    let mut patterns = BTreeSet::new();
    for path in files.iter().filter(|p| p.exists()) {
        match read_pattern_column(path) {
            Ok(found) => patterns.extend(found),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "could not read pattern column")
            }
        }
    }
    patterns
}

fn read_pattern_column(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let column = reader
        .headers()?
        .iter()
        .position(|h| h.trim() == "pattern")
        .ok_or_else(|| anyhow!("no `pattern` column in {}", path.display()))?;
    let mut out = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(p) = record.get(column).map(str::trim).filter(|p| !p.is_empty()) {
            out.push(p.to_string());
        }
    }
    Ok(out)
}

/// Concatenate framework CSVs under a leading `framework` column.
///
/// Columns are the union of all headers in first-seen order; cells missing
/// from a file are left empty. Returns the number of data rows written.
pub fn consolidate(inputs: &[(String, PathBuf)], output: &Path) -> Result<usize> {
    let mut columns: Vec<String> = Vec::new();
    let mut tables: Vec<(String, Vec<String>, Vec<csv::StringRecord>)> = Vec::new();

    for (framework, path) in inputs {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "input file not found, skipping");
            continue;
        }
        let loaded = (|| -> Result<(Vec<String>, Vec<csv::StringRecord>)> {
            let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
            let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
            let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
            Ok((headers, rows))
        })();
        match loaded {
            Ok((headers, rows)) => {
                for h in &headers {
                    if h != "framework" && !columns.contains(h) {
                        columns.push(h.clone());
                    }
                }
                tables.push((framework.clone(), headers, rows));
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "could not process input file")
            }
        }
    }

    if tables.is_empty() {
        return Err(anyhow!("No knowledge-base files were loaded"));
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut header = vec!["framework".to_string()];
    header.extend(columns.iter().cloned());
    writer.write_record(&header)?;

    let mut count = 0;
    for (framework, headers, rows) in &tables {
        let index: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.as_str(), i))
            .collect();
        for row in rows {
            let mut out = vec![framework.clone()];
            for col in &columns {
                let cell = index.get(col.as_str()).and_then(|&i| row.get(i)).unwrap_or("");
                out.push(cell.to_string());
            }
            writer.write_record(&out)?;
            count += 1;
        }
    }
    writer.flush()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_takes_last_segment() {
        assert_eq!(extract_short_name("/qiskit/qiskit.circuit.library.QFT"), "QFT");
        assert_eq!(extract_short_name("plain"), "plain");
        assert_eq!(extract_short_name(""), "");
    }

    #[test]
    fn lookup_is_exact_then_short_then_suffix() {
        let mut map = PatternMap::default();
        map.insert("/qiskit/qiskit.a.QFT", "Quantum Fourier Transform");
        map.insert("grover", "Amplitude Amplification");
        map.insert("library.qpe", "Phase Estimation");

        assert_eq!(map.lookup("/qiskit/qiskit.a.QFT"), Some("Quantum Fourier Transform"));
        assert_eq!(map.lookup("/qiskit/other.QFT"), Some("Quantum Fourier Transform"));
        assert_eq!(map.lookup("/classiq/lib.grover"), Some("Amplitude Amplification"));
        assert_eq!(map.lookup("/classiq/open_library.qpe"), Some("Phase Estimation"));
        assert_eq!(map.lookup("/classiq/open.vqe"), None);

        map.insert("Op", "Oracle");
        assert_eq!(map.lookup("/classiq/lib.MyOp"), Some("Oracle"));
    }

    #[test]
    fn all_patterns_follow_the_pattern_header() {
        let dir = tempfile::tempdir().unwrap();
        let reordered = dir.path().join("reordered.csv");
        fs::write(
            &reordered,
            "pattern,concept,summary
Oracle,grover,marks states
 ,empty,blank
",
        )
        .unwrap();
        let wide = dir.path().join("wide.csv");
        fs::write(
            &wide,
            "concept,notes,summary,pattern
qft,n,Fourier,Quantum Fourier Transform
",
        )
        .unwrap();
        let headerless = dir.path().join("headerless.csv");
        fs::write(&headerless, "concept,summary,kind
qpe,phase,Phase Estimation
").unwrap();

        let all: Vec<String> = load_all_patterns(&[reordered, wide, headerless.clone()])
            .into_iter()
            .collect();
        assert_eq!(all, vec!["Oracle", "Quantum Fourier Transform"]);
        assert!(read_pattern_column(&headerless).is_err());
    }

    #[test]
    fn later_insert_overwrites_value_keeps_order() {
        let mut map = PatternMap::default();
        map.insert("a", "P1");
        map.insert("b", "P2");
        map.insert("a", "P3");
        assert_eq!(map.len(), 2);
        assert_eq!(map.lookup("a"), Some("P3"));
    }
}
