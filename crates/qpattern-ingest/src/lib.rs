//! Ingestion for the qpattern pipeline
//!
//! Turns raw inputs into the pipeline's reference data:
//! - framework SDK sources → documented concepts (`concepts`, `python`)
//! - Jupyter notebooks → analyzable Python scripts (`notebooks`)
//! - the pattern catalog's rendered content → `Pattern` records (`catalog`)
//!
//! Everything here is file/IO glue; matching and reporting live in
//! `qpattern-match` and `qpattern-report`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod catalog;
pub mod concepts;
pub mod notebooks;
pub mod python;
pub mod repo;

pub use catalog::*;
pub use concepts::*;
pub use notebooks::*;
pub use python::{comment_block, PySource, PythonParseError};
pub use repo::*;

// ============================================================================
// Frameworks
// ============================================================================

/// Source frameworks whose SDKs are mined for concepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Classiq,
    Pennylane,
    Qiskit,
}

impl Framework {
    pub const ALL: [Framework; 3] = [Framework::Classiq, Framework::Pennylane, Framework::Qiskit];

    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Classiq => "classiq",
            Framework::Pennylane => "pennylane",
            Framework::Qiskit => "qiskit",
        }
    }

    /// Delimiter of `<fw>_quantum_concepts.csv`.
    pub fn concepts_csv_delimiter(&self) -> u8 {
        match self {
            Framework::Qiskit => b';',
            _ => b',',
        }
    }

    pub fn concepts_json_file(&self) -> String {
        format!("{}_quantum_concepts.json", self.as_str())
    }

    pub fn concepts_csv_file(&self) -> String {
        format!("{}_quantum_concepts.csv", self.as_str())
    }

    pub fn snippets_dir(&self) -> String {
        format!("{}_source_snippets", self.as_str())
    }

    /// Manually enriched concept → pattern table consumed by the matcher.
    pub fn enriched_patterns_file(&self) -> String {
        format!("enriched_{}_quantum_patterns.csv", self.as_str())
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framework {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classiq" => Ok(Framework::Classiq),
            "pennylane" => Ok(Framework::Pennylane),
            "qiskit" => Ok(Framework::Qiskit),
            other => Err(format!("unknown framework: {other}")),
        }
    }
}

// ============================================================================
// Concepts and patterns
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConceptKind {
    Class,
    Function,
}

/// A documented public symbol of a framework SDK.
///
/// `name` is `/<framework>/<dotted.module.path>.<Symbol>`. The source text is
/// never serialized; it goes to a per-concept snippet file instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub name: String,
    pub summary: String,
    #[serde(default)]
    pub docstring: String,
    #[serde(skip)]
    pub source_code: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ConceptKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_target_subclass: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_classes: Option<Vec<String>>,
}

impl Concept {
    /// Last `.`-segment of the name (the symbol itself).
    pub fn symbol(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// `@deprecate*` decorator in the source or "deprecated" in the docstring.
    pub fn is_deprecated(&self) -> bool {
        self.source_code.contains("@deprecate") || self.docstring.to_lowercase().contains("deprecated")
    }

    /// Ranking key used to pick one survivor among near-duplicate concepts.
    pub fn preference_key(&self) -> (bool, bool, bool, bool, usize) {
        (
            !self.is_deprecated(),
            self.is_target_subclass.unwrap_or(false),
            self.kind == Some(ConceptKind::Class),
            self.base_classes
                .as_ref()
                .is_some_and(|bases| bases.iter().any(|b| b == "Gate")),
            self.docstring.chars().count(),
        )
    }
}

/// A design pattern from the catalog service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub name: String,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub forces: String,
    #[serde(default)]
    pub solution: String,
    #[serde(default)]
    pub result: String,
}
