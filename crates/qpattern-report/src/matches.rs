//! Loading the match CSV for reporting.

use crate::ReportError;
use std::path::Path;

/// Pattern value that counts as "no pattern".
pub const MISSING_PATTERN: &str = "N/A";

/// One match row, with the derived `framework` and `project` columns.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRow {
    pub file_path: String,
    pub concept_name: String,
    /// `None` for empty cells and `N/A`.
    pub pattern: Option<String>,
    pub match_type: String,
    pub matched_text: String,
    /// `None` when the cell is not a number.
    pub similarity_score: Option<f64>,
    pub framework: String,
    pub project: String,
}

/// First `/` segment of the concept name; `unknown` for an empty name.
pub fn extract_framework(concept_name: &str) -> String {
    if concept_name.trim().is_empty() {
        return "unknown".to_string();
    }
    concept_name
        .trim_matches('/')
        .split('/')
        .next()
        .unwrap_or("unknown")
        .to_string()
}

/// First path component of `file_path`, or the path itself.
pub fn extract_project(file_path: &str) -> String {
    Path::new(file_path)
        .components()
        .next()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .unwrap_or_else(|| file_path.to_string())
}

/// `...<last segment>` where `/` and `.` both separate segments.
pub fn shorten_concept_name(full_name: &str) -> String {
    let last = full_name.rsplit(['/', '.']).next().unwrap_or(full_name);
    format!("...{last}")
}

/// First character upper-cased, the rest lower-cased.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn parse_pattern(cell: &str) -> Option<String> {
    let trimmed = cell.trim();
    if trimmed.is_empty() || trimmed == MISSING_PATTERN {
        None
    } else {
        Some(cell.to_string())
    }
}

/// Read the `;`-delimited match CSV. Columns are located by header name.
pub fn load_matches(path: &Path) -> Result<Vec<MatchRow>, ReportError> {
    if !path.exists() {
        return Err(ReportError::NotFound(path.to_path_buf()));
    }
    if std::fs::metadata(path)?.len() == 0 {
        return Err(ReportError::Empty(path.to_path_buf()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_path(path)?;
    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);
    let required = ["file_path", "concept_name", "pattern", "match_type", "similarity_score"];
    for name in required {
        if column(name).is_none() {
            return Err(ReportError::MissingColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            });
        }
    }
    let idx = |name: &str| column(name).unwrap_or(usize::MAX);
    let (i_file, i_concept, i_pattern, i_type, i_text, i_score) = (
        idx("file_path"),
        idx("concept_name"),
        idx("pattern"),
        idx("match_type"),
        idx("matched_text"),
        idx("similarity_score"),
    );

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let get = |i: usize| record.get(i).unwrap_or("").to_string();
        let file_path = get(i_file);
        let concept_name = get(i_concept);
        rows.push(MatchRow {
            framework: extract_framework(&concept_name),
            project: extract_project(&file_path),
            pattern: parse_pattern(&get(i_pattern)),
            match_type: get(i_type),
            matched_text: get(i_text),
            similarity_score: get(i_score).trim().parse::<f64>().ok().filter(|x| x.is_finite()),
            file_path,
            concept_name,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framework_is_first_segment() {
        assert_eq!(extract_framework("/qiskit/qiskit.circuit.QFT"), "qiskit");
        assert_eq!(extract_framework("pennylane/x"), "pennylane");
        assert_eq!(extract_framework(""), "unknown");
    }

    #[test]
    fn project_is_first_component() {
        assert_eq!(extract_project("proj_a/nested/x.py"), "proj_a");
        assert_eq!(extract_project("x.py"), "x.py");
        assert_eq!(extract_project(""), "");
    }

    #[test]
    fn concept_names_shorten_to_last_segment() {
        assert_eq!(shorten_concept_name("/qiskit/qiskit.circuit.library.QFT"), "...QFT");
        assert_eq!(capitalize("pennylane"), "Pennylane");
        assert_eq!(capitalize("QISKIT"), "Qiskit");
    }

    #[test]
    fn missing_and_empty_files_are_distinct_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.csv");
        assert!(matches!(load_matches(&missing), Err(ReportError::NotFound(_))));
        let empty = dir.path().join("empty.csv");
        std::fs::write(&empty, "").unwrap();
        assert!(matches!(load_matches(&empty), Err(ReportError::Empty(_))));
    }

    #[test]
    fn rows_carry_derived_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        std::fs::write(
            &path,
            "file_path;concept_name;pattern;match_type;matched_text;similarity_score\n\
             proj/a.py;/qiskit/q.QFT;N/A;name;QFT;0.9500\n\
             proj/b.py;/classiq/c.qpe;Phase Estimation;summary;text;oops\n",
        )
        .unwrap();
        let rows = load_matches(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].pattern, None);
        assert_eq!(rows[0].framework, "qiskit");
        assert_eq!(rows[0].project, "proj");
        assert_eq!(rows[0].similarity_score, Some(0.95));
        assert_eq!(rows[1].pattern.as_deref(), Some("Phase Estimation"));
        assert_eq!(rows[1].similarity_score, None);
    }
}
