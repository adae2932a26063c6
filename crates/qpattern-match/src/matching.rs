//! Embedding-similarity matching of notebook scripts against known concepts.
//!
//! Each script contributes two kinds of evidence:
//! - the names of the functions it calls, compared with concept short names;
//! - its comment block, compared with concept summaries.
//!
//! Every (evidence, concept) pair scoring at or above the threshold of its
//! kind becomes one row of the match CSV.

use crate::embeddings::{cosine_similarity_matrix, Embedder};
use crate::knowledge_base::{
    load_patterns_map, load_quantum_concepts, save_unclassified, MappedConcept,
};
use anyhow::{anyhow, Context, Result};
use qpattern_ingest::{collect_files, comment_block, Framework, PySource, WalkOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const MATCHES_FILE: &str = "quantum_concept_matches_with_patterns.csv";
pub const UNCLASSIFIED_FILE: &str = "unclassified_concepts.csv";
pub const MATCH_CSV_HEADER: [&str; 6] = [
    "file_path",
    "concept_name",
    "pattern",
    "match_type",
    "matched_text",
    "similarity_score",
];
pub const MATCH_CSV_DELIMITER: u8 = b';';

/// Comment blocks longer than this are truncated in `matched_text`.
pub const MATCHED_TEXT_LIMIT: usize = 150;

const PROGRESS_EVERY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Name,
    Summary,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Name => "name",
            MatchType::Summary => "summary",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "name" => Ok(MatchType::Name),
            "summary" => Ok(MatchType::Summary),
            other => Err(format!("unknown match type: {other}")),
        }
    }
}

/// Minimum cosine similarity per match type (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub name: f32,
    pub summary: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            name: 0.90,
            summary: 0.65,
        }
    }
}

impl Thresholds {
    pub fn for_type(&self, match_type: MatchType) -> f32 {
        match match_type {
            MatchType::Name => self.name,
            MatchType::Summary => self.summary,
        }
    }
}

/// One row of the match CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub file_path: String,
    pub concept_name: String,
    pub pattern: String,
    pub match_type: MatchType,
    pub matched_text: String,
    pub similarity_score: f32,
}

impl MatchRecord {
    pub fn to_row(&self) -> [String; 6] {
        [
            self.file_path.clone(),
            self.concept_name.clone(),
            self.pattern.clone(),
            self.match_type.to_string(),
            self.matched_text.clone(),
            format!("{:.4}", self.similarity_score),
        ]
    }
}

/// Comment block as stored in `matched_text`.
pub fn summary_match_text(block: &str) -> String {
    let truncated = if block.chars().count() > MATCHED_TEXT_LIMIT {
        let head: String = block.chars().take(MATCHED_TEXT_LIMIT).collect();
        format!("{head}...")
    } else {
        block.to_string()
    };
    truncated.replace(';', ",")
}

/// Called function names of a script; empty when it does not parse.
pub fn code_elements(script: &str) -> Vec<String> {
    match PySource::parse(script) {
        Ok(source) => source.call_names().into_iter().collect(),
        Err(err) => {
            tracing::debug!(error = %err, "script does not parse; no code elements");
            Vec::new()
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Concepts with their name and summary embeddings precomputed.
pub struct MatchingEngine<'a> {
    concepts: &'a [MappedConcept],
    embedder: &'a dyn Embedder,
    thresholds: Thresholds,
    name_vectors: Vec<Vec<f32>>,
    summary_vectors: Vec<Vec<f32>>,
}

impl<'a> MatchingEngine<'a> {
    pub fn new(
        concepts: &'a [MappedConcept],
        embedder: &'a dyn Embedder,
        thresholds: Thresholds,
    ) -> Result<Self> {
        let short_names: Vec<String> = concepts.iter().map(|c| c.short_name.clone()).collect();
        let summaries: Vec<String> = concepts.iter().map(|c| c.summary.clone()).collect();
        let name_vectors = embedder.embed(&short_names)?;
        let summary_vectors = embedder.embed(&summaries)?;
        if name_vectors.len() != concepts.len() || summary_vectors.len() != concepts.len() {
            return Err(anyhow!(
                "embedder {} returned the wrong number of concept vectors",
                embedder.name()
            ));
        }
        Ok(Self {
            concepts,
            embedder,
            thresholds,
            name_vectors,
            summary_vectors,
        })
    }

    /// All matches for one script. `rel_path` is written as `file_path`.
    pub fn match_script(&self, rel_path: &str, script: &str) -> Result<Vec<MatchRecord>> {
        let mut records = Vec::new();

        let elements = code_elements(script);
        if !elements.is_empty() {
            let vectors = self.embedder.embed(&elements)?;
            let scores = cosine_similarity_matrix(&vectors, &self.name_vectors);
            for (element, row) in elements.iter().zip(&scores) {
                for (concept, &score) in self.concepts.iter().zip(row) {
                    if score >= self.thresholds.for_type(MatchType::Name) {
                        records.push(self.record(rel_path, concept, MatchType::Name, element.clone(), score));
                    }
                }
            }
        }

        let block = comment_block(script);
        if !block.is_empty() {
            let vectors = self.embedder.embed(std::slice::from_ref(&block))?;
            let scores = cosine_similarity_matrix(&vectors, &self.summary_vectors);
            if let Some(row) = scores.first() {
                for (concept, &score) in self.concepts.iter().zip(row) {
                    if score >= self.thresholds.for_type(MatchType::Summary) {
                        let text = summary_match_text(&block);
                        records.push(self.record(rel_path, concept, MatchType::Summary, text, score));
                    }
                }
            }
        }

        Ok(records)
    }

    fn record(
        &self,
        rel_path: &str,
        concept: &MappedConcept,
        match_type: MatchType,
        matched_text: String,
        similarity_score: f32,
    ) -> MatchRecord {
        MatchRecord {
            file_path: rel_path.to_string(),
            concept_name: concept.name.clone(),
            pattern: concept.pattern.clone(),
            match_type,
            matched_text,
            similarity_score,
        }
    }

    /// Scan every `*.py` under `notebooks_root` and write the match CSV.
    pub fn run(&self, notebooks_root: &Path, output_csv: &Path) -> Result<MatchRunSummary> {
        let files = collect_files(notebooks_root, &WalkOptions::for_suffix(".py"))?;
        let total = files.len();
        tracing::info!(total, root = %notebooks_root.display(), "python files to analyze");

        if let Some(parent) = output_csv.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::WriterBuilder::new()
            .delimiter(MATCH_CSV_DELIMITER)
            .from_path(output_csv)
            .with_context(|| format!("Failed to create {}", output_csv.display()))?;
        writer.write_record(MATCH_CSV_HEADER)?;

        let mut summary = MatchRunSummary {
            files_total: total,
            ..MatchRunSummary::default()
        };
        for (i, path) in files.iter().enumerate() {
            let processed = i + 1;
            if processed % PROGRESS_EVERY == 0 || processed == total {
                tracing::info!(processed, total, "matching progress");
            }

            let bytes = match fs::read(path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "could not read script");
                    summary.files_unreadable += 1;
                    continue;
                }
            };
            let script = String::from_utf8_lossy(&bytes);
            let rel = path
                .strip_prefix(notebooks_root)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string();

            for record in self.match_script(&rel, &script)? {
                match record.match_type {
                    MatchType::Name => summary.name_matches += 1,
                    MatchType::Summary => summary.summary_matches += 1,
                }
                writer.write_record(record.to_row())?;
            }
        }
        writer.flush()?;
        Ok(summary)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchRunSummary {
    pub files_total: usize,
    pub files_unreadable: usize,
    pub name_matches: usize,
    pub summary_matches: usize,
}

impl MatchRunSummary {
    pub fn total_matches(&self) -> usize {
        self.name_matches + self.summary_matches
    }
}

/// Read a match CSV back into records.
pub fn read_matches(path: &Path) -> Result<Vec<MatchRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(MATCH_CSV_DELIMITER)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let field = |i: usize| row.get(i).unwrap_or("").to_string();
        let match_type = field(3).parse::<MatchType>().map_err(|e| anyhow!(e))?;
        let similarity_score = field(5)
            .trim()
            .parse::<f32>()
            .with_context(|| format!("bad similarity score in {}", path.display()))?;
        records.push(MatchRecord {
            file_path: field(0),
            concept_name: field(1),
            pattern: field(2),
            match_type,
            matched_text: field(4),
            similarity_score,
        });
    }
    Ok(records)
}

// ============================================================================
// Full analysis
// ============================================================================

/// Inputs and outputs of one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisPaths {
    pub concept_files: Vec<PathBuf>,
    pub pattern_files: Vec<PathBuf>,
    pub notebooks_root: PathBuf,
    pub output_csv: PathBuf,
    pub unclassified_csv: PathBuf,
}

impl AnalysisPaths {
    /// Standard file names under `results_dir`, one concept and one enriched
    /// pattern file per framework.
    pub fn standard(results_dir: &Path, notebooks_root: &Path) -> Self {
        Self {
            concept_files: Framework::ALL
                .iter()
                .map(|fw| results_dir.join(fw.concepts_json_file()))
                .collect(),
            pattern_files: Framework::ALL
                .iter()
                .map(|fw| results_dir.join(fw.enriched_patterns_file()))
                .collect(),
            notebooks_root: notebooks_root.to_path_buf(),
            output_csv: results_dir.join(MATCHES_FILE),
            unclassified_csv: results_dir.join(UNCLASSIFIED_FILE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AnalysisOutcome {
    /// No concept files yielded any concept; nothing was written.
    NoConcepts,
    Completed {
        mappings: usize,
        concepts: usize,
        mapped: usize,
        unclassified: usize,
        run: MatchRunSummary,
    },
}

/// Load concepts and mappings, write the unclassified list, then match.
pub fn run_analysis(
    paths: &AnalysisPaths,
    embedder: &dyn Embedder,
    thresholds: Thresholds,
) -> Result<AnalysisOutcome> {
    let map = load_patterns_map(&paths.pattern_files);
    tracing::info!(mappings = map.len(), "loaded concept-to-pattern mappings");

    let concepts = load_quantum_concepts(&paths.concept_files, &map);
    if concepts.is_empty() {
        return Ok(AnalysisOutcome::NoConcepts);
    }

    let unclassified = save_unclassified(&concepts, &paths.unclassified_csv)?;
    let mapped = concepts.iter().filter(|c| c.is_mapped()).count();

    tracing::info!(embedder = %embedder.name(), "embedding concepts");
    let engine = MatchingEngine::new(&concepts, embedder, thresholds)?;
    let run = engine.run(&paths.notebooks_root, &paths.output_csv)?;

    Ok(AnalysisOutcome::Completed {
        mappings: map.len(),
        concepts: concepts.len(),
        mapped,
        unclassified,
        run,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::TokenHashEmbedder;

    fn concept(name: &str, summary: &str, pattern: &str) -> MappedConcept {
        MappedConcept {
            name: name.to_string(),
            summary: summary.to_string(),
            short_name: crate::knowledge_base::extract_short_name(name),
            pattern: pattern.to_string(),
        }
    }

    #[test]
    fn long_comment_blocks_are_truncated_and_semicolons_replaced() {
        assert_eq!(summary_match_text("a; b"), "a, b");
        let long = "x".repeat(MATCHED_TEXT_LIMIT + 10);
        let text = summary_match_text(&long);
        assert_eq!(text.chars().count(), MATCHED_TEXT_LIMIT + 3);
        assert!(text.ends_with("..."));
        let exact = "y".repeat(MATCHED_TEXT_LIMIT);
        assert_eq!(summary_match_text(&exact), exact);
    }

    #[test]
    fn code_elements_are_unique_call_names() {
        let script = "import qiskit\nqc = QuantumCircuit(2)\nqc.h(0)\nqc.h(1)\nqc.measure_all()\n";
        assert_eq!(code_elements(script), vec!["QuantumCircuit", "h", "measure_all"]);
        assert!(code_elements("def broken(:\n").is_empty());
    }

    #[test]
    fn python2_scripts_have_no_code_elements() {
        assert!(code_elements("print \"hello\"\nqc = QuantumCircuit(2)\n").is_empty());
        assert!(code_elements("exec \"x = 1\"\nop = GroverOperator(oracle)\n").is_empty());
    }

    #[test]
    fn script_matches_by_name_and_by_summary() {
        let concepts = vec![
            concept(
                "/qiskit/qiskit.circuit.library.GroverOperator",
                "Amplitude amplification operator for Grover search.",
                "Amplitude Amplification",
            ),
            concept(
                "/qiskit/qiskit.circuit.library.QFT",
                "Quantum Fourier transform circuit.",
                "N/A",
            ),
        ];
        let embedder = TokenHashEmbedder::default();
        let engine = MatchingEngine::new(&concepts, &embedder, Thresholds::default()).unwrap();

        let script = "# Amplitude amplification operator for Grover search\nop = grover_operator(oracle)\nprint(op)\n";
        let records = engine.match_script("proj/grover.py", script).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].match_type, MatchType::Name);
        assert_eq!(records[0].matched_text, "grover_operator");
        assert_eq!(records[0].pattern, "Amplitude Amplification");
        assert_eq!(records[0].to_row()[5], "1.0000");

        assert_eq!(records[1].match_type, MatchType::Summary);
        assert_eq!(
            records[1].matched_text,
            "Amplitude amplification operator for Grover search"
        );
    }

    #[test]
    fn thresholds_are_inclusive() {
        let concepts = vec![concept("/qiskit/a.QFT", "Quantum Fourier transform circuit.", "QFT")];
        let embedder = TokenHashEmbedder::default();
        let strict = Thresholds {
            name: 1.01,
            summary: 1.01,
        };
        let engine = MatchingEngine::new(&concepts, &embedder, strict).unwrap();
        assert!(engine.match_script("a.py", "QFT()\n").unwrap().is_empty());

        let lenient = Thresholds {
            name: -1.0,
            summary: -1.0,
        };
        let engine = MatchingEngine::new(&concepts, &embedder, lenient).unwrap();
        let records = engine.match_script("a.py", "print()\n# plot\n").unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn score_equal_to_threshold_matches() {
        let concepts = vec![concept("/qiskit/a.QFT", "Quantum Fourier transform circuit.", "QFT")];
        let embedder = TokenHashEmbedder::default();
        let script = "QFT()\n# Quantum Fourier transform circuit.\n";
        let lenient = Thresholds {
            name: -1.0,
            summary: -1.0,
        };
        let records = MatchingEngine::new(&concepts, &embedder, lenient)
            .unwrap()
            .match_script("a.py", script)
            .unwrap();
        assert_eq!(records.len(), 2);
        let name_score = records[0].similarity_score;
        let summary_score = records[1].similarity_score;
        assert!(name_score > 0.99 && summary_score > 0.99);

        let exact = Thresholds {
            name: name_score,
            summary: summary_score,
        };
        let records = MatchingEngine::new(&concepts, &embedder, exact)
            .unwrap()
            .match_script("a.py", script)
            .unwrap();
        let types: Vec<MatchType> = records.iter().map(|r| r.match_type).collect();
        assert_eq!(types, vec![MatchType::Name, MatchType::Summary]);

        let above = Thresholds {
            name: f32::from_bits(name_score.to_bits() + 1),
            summary: f32::from_bits(summary_score.to_bits() + 1),
        };
        let records = MatchingEngine::new(&concepts, &embedder, above)
            .unwrap()
            .match_script("a.py", script)
            .unwrap();
        assert!(records.is_empty());
    }
}
