//! Concept extraction from framework SDK sources.
//!
//! A concept is a documented public class or function. Each framework has
//! its own notion of "public": Qiskit's circuit library classes and free
//! functions, PennyLane's template classes, and the functions Classiq lists
//! in `__all__`.

use crate::python::{decode_string_literal, first_paragraph, PySource};
use crate::repo::{collect_files, module_path, WalkOptions};
use crate::{Concept, ConceptKind, Framework};
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tree_sitter::Node;

pub const QISKIT_SEARCH_SUBDIR: &str = "qiskit/circuit/library";
pub const QISKIT_EXCLUDE_SUBDIRS: &[&str] = &["standard_gates", "templates"];
pub const QISKIT_TARGET_BASE_CLASSES: &[&str] = &["QuantumCircuit", "Gate"];
pub const PENNYLANE_SEARCH_SUBDIR: &str = "pennylane/templates";
pub const CLASSIQ_SEARCH_PATHS: &[&str] = &["open_library/functions", "qmod/builtins/functions"];
pub const CLASSIQ_API_MODULE: &str = "open_library/functions/__init__.py";
pub const CLASSIQ_BOILERPLATE: &[&str] = &[
    "[Qmod Classiq-library function]",
    "[Qmod core-library function]",
];

/// Files whose trimmed text is shorter than this carry no concepts.
const MIN_SOURCE_CHARS: usize = 50;

// ============================================================================
// Docstring helpers
// ============================================================================

fn qiskit_docstring_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?m)(\.\. (code-block|parsed-literal):: text\n\n)(^\s+.*$\n?)+",
            r"(?m).*Circuit symbol:.*(?:\n\s*\.\. code-block:: text)?\n\n(^\s*.*[┌┐└┘├┤│─].*$\n?)+",
            r"(?m)(\.\. math::\n\n)(^\s+.*$\n?)+",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Remove literal text blocks, circuit diagrams and math blocks.
pub fn clean_qiskit_docstring(docstring: &str) -> String {
    let mut cleaned = docstring.to_string();
    for re in qiskit_docstring_patterns() {
        cleaned = re.replace_all(&cleaned, "").into_owned();
    }
    cleaned.trim().to_string()
}

/// Drop the Classiq library markers (optionally followed by a period).
pub fn strip_classiq_boilerplate(docstring: &str) -> String {
    let mut cleaned = docstring.to_string();
    for marker in CLASSIQ_BOILERPLATE {
        let pattern = format!(r"\s*{}\.?\s*", regex::escape(marker));
        if let Ok(re) = Regex::new(&pattern) {
            cleaned = re.replace_all(&cleaned, " ").into_owned();
        }
    }
    cleaned.trim().to_string()
}

/// First two sentences of the first paragraph.
pub fn two_sentence_summary(docstring: &str) -> String {
    let trimmed = docstring.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let paragraph = trimmed.split("\n\n").next().unwrap_or("");
    let block = paragraph.split_whitespace().collect::<Vec<_>>().join(" ");
    let sentences: Vec<&str> = block
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    match sentences.as_slice() {
        [first, second, ..] => format!("{first}. {second}."),
        [only] => format!("{only}."),
        [] => paragraph.to_string(),
    }
}

/// `QFTGate` → `qft_gate`, `PhaseEstimation` → `phase_estimation`.
pub fn to_snake_case(name: &str) -> String {
    static RE: OnceLock<Option<(Regex, Regex)>> = OnceLock::new();
    let Some((first, second)) = RE.get_or_init(|| {
        Some((
            Regex::new(r"(.)([A-Z][a-z]+)").ok()?,
            Regex::new(r"([a-z0-9])([A-Z])").ok()?,
        ))
    }) else {
        return name.to_lowercase();
    };
    let s1 = first.replace_all(name, "${1}_${2}");
    second.replace_all(&s1, "${1}_${2}").to_lowercase()
}

// ============================================================================
// Extractors
// ============================================================================

/// Qiskit circuit-library classes and free functions.
#[derive(Debug, Clone)]
pub struct QiskitExtractor {
    pub sdk_root: PathBuf,
}

/// PennyLane template classes.
#[derive(Debug, Clone)]
pub struct PennylaneExtractor {
    pub sdk_root: PathBuf,
}

/// Classiq open-library functions named by the public API list.
#[derive(Debug, Clone)]
pub struct ClassiqExtractor {
    pub sdk_root: PathBuf,
    pub public_api: BTreeSet<String>,
}

impl QiskitExtractor {
    pub fn new(sdk_root: impl Into<PathBuf>) -> Self {
        Self {
            sdk_root: sdk_root.into(),
        }
    }

    pub fn extract(&self) -> Result<Vec<Concept>> {
        ensure_root(&self.sdk_root, "Qiskit")?;
        let search = self.sdk_root.join(QISKIT_SEARCH_SUBDIR);
        if !search.is_dir() {
            tracing::warn!(path = %search.display(), "SDK subdirectory not found, skipping");
            return Ok(Vec::new());
        }
        let opts = WalkOptions::for_suffix(".py").excluding(QISKIT_EXCLUDE_SUBDIRS);
        let files: Vec<PathBuf> = collect_files(&search, &opts)?
            .into_iter()
            .filter(|f| {
                let name = file_name(f);
                name != "__init__.py" && !name.starts_with("test_")
            })
            .collect();

        Ok(scan_files(&files, &self.sdk_root, Some(MIN_SOURCE_CHARS), |py, module| {
            let mut out = Vec::new();
            visit_qiskit(py, py.root(), module, false, &mut out);
            out
        }))
    }
}

fn visit_qiskit(py: &PySource, node: Node<'_>, module: &str, in_class: bool, out: &mut Vec<Concept>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "class_definition" => {
                if let Some(concept) = qiskit_class(py, child, module) {
                    out.push(concept);
                }
                visit_qiskit(py, child, module, true, out);
            }
            "function_definition" => {
                if !in_class {
                    if let Some(concept) = qiskit_function(py, child, module) {
                        out.push(concept);
                    }
                }
                visit_qiskit(py, child, module, in_class, out);
            }
            _ => visit_qiskit(py, child, module, in_class, out),
        }
    }
}

fn qiskit_class(py: &PySource, node: Node<'_>, module: &str) -> Option<Concept> {
    let name = py.def_name(node)?;
    let docstring = clean_qiskit_docstring(&py.docstring(node)?);
    if docstring.is_empty() {
        return None;
    }
    let bases = py.base_classes(node);
    let is_target = bases
        .iter()
        .any(|b| QISKIT_TARGET_BASE_CLASSES.contains(&b.as_str()));
    Some(Concept {
        name: concept_name(Framework::Qiskit, module, name),
        summary: first_paragraph(&docstring),
        docstring,
        source_code: py.source_segment(node),
        kind: Some(ConceptKind::Class),
        is_target_subclass: Some(is_target),
        base_classes: Some(bases),
    })
}

fn qiskit_function(py: &PySource, node: Node<'_>, module: &str) -> Option<Concept> {
    if is_async(node) {
        return None;
    }
    let name = py.def_name(node)?;
    if name.starts_with('_') || name.starts_with("get_") {
        return None;
    }
    let docstring = clean_qiskit_docstring(&py.docstring(node)?);
    if docstring.is_empty() {
        return None;
    }
    Some(Concept {
        name: concept_name(Framework::Qiskit, module, name),
        summary: first_paragraph(&docstring),
        docstring,
        source_code: py.source_segment(node),
        kind: Some(ConceptKind::Function),
        is_target_subclass: None,
        base_classes: None,
    })
}

impl PennylaneExtractor {
    pub fn new(sdk_root: impl Into<PathBuf>) -> Self {
        Self {
            sdk_root: sdk_root.into(),
        }
    }

    pub fn extract(&self) -> Result<Vec<Concept>> {
        ensure_root(&self.sdk_root, "PennyLane")?;
        let search = self.sdk_root.join(PENNYLANE_SEARCH_SUBDIR);
        if !search.is_dir() {
            tracing::warn!(path = %search.display(), "SDK subdirectory not found, skipping");
            return Ok(Vec::new());
        }
        let files: Vec<PathBuf> = collect_files(&search, &WalkOptions::for_suffix(".py"))?
            .into_iter()
            .filter(|f| file_name(f) != "__init__.py")
            .collect();

        Ok(scan_files(&files, &self.sdk_root, Some(MIN_SOURCE_CHARS), |py, module| {
            let mut out = Vec::new();
            for class in descendants_of_kind(py.root(), "class_definition") {
                let (Some(name), Some(doc)) = (py.def_name(class), py.docstring(class)) else {
                    continue;
                };
                let docstring = doc.trim().to_string();
                if docstring.is_empty() {
                    continue;
                }
                out.push(Concept {
                    name: concept_name(Framework::Pennylane, module, name),
                    summary: first_paragraph(&docstring),
                    docstring,
                    source_code: py.source_segment(class),
                    kind: None,
                    is_target_subclass: None,
                    base_classes: None,
                });
            }
            out
        }))
    }
}

impl ClassiqExtractor {
    pub fn new(sdk_root: impl Into<PathBuf>, public_api: BTreeSet<String>) -> Self {
        Self {
            sdk_root: sdk_root.into(),
            public_api,
        }
    }

    /// Build an extractor whose API set is read from the package's
    /// `open_library/functions/__init__.py`.
    pub fn from_sdk(sdk_root: impl Into<PathBuf>) -> Result<Self> {
        let sdk_root = sdk_root.into();
        let init = sdk_root.join(CLASSIQ_API_MODULE);
        let text = fs::read_to_string(&init)
            .with_context(|| format!("Failed to read public API module {}", init.display()))?;
        let api = parse_dunder_all(&text)?;
        if api.is_empty() {
            return Err(anyhow!("No __all__ entries found in {}", init.display()));
        }
        Ok(Self::new(sdk_root, api))
    }

    pub fn extract(&self) -> Result<Vec<Concept>> {
        ensure_root(&self.sdk_root, "Classiq")?;
        let mut concepts: Vec<Concept> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut documented: BTreeSet<String> = BTreeSet::new();

        for sub_dir in CLASSIQ_SEARCH_PATHS {
            if documented == self.public_api {
                tracing::info!("all public API functions found, halting search");
                break;
            }
            let search = self.sdk_root.join(sub_dir);
            if !search.is_dir() {
                tracing::warn!(path = %search.display(), "source code directory not found, skipping");
                continue;
            }
            let files: Vec<PathBuf> = collect_files(&search, &WalkOptions::for_suffix(".py"))?
                .into_iter()
                .filter(|f| file_name(f) != "__init__.py")
                .collect();
            tracing::info!(count = files.len(), dir = sub_dir, "scanning files");

            let found = scan_files(&files, &self.sdk_root, None, |py, module| {
                self.visit_functions(py, module)
            });
            for concept in found {
                if seen.insert(concept.name.clone()) {
                    documented.insert(concept.symbol().to_string());
                    concepts.push(concept);
                }
            }
        }
        Ok(concepts)
    }

    fn visit_functions(&self, py: &PySource, module: &str) -> Vec<Concept> {
        let mut out = Vec::new();
        for func in descendants_of_kind(py.root(), "function_definition") {
            if is_async(func) {
                continue;
            }
            let Some(name) = py.def_name(func) else {
                continue;
            };
            if !self.public_api.contains(name) {
                continue;
            }
            let Some(doc) = py.docstring(func) else {
                tracing::warn!(function = name, module, "skipping public API function without docstring");
                continue;
            };
            let docstring = strip_classiq_boilerplate(&doc);
            if docstring.is_empty() {
                tracing::warn!(function = name, module, "skipping public API function whose docstring is only boilerplate");
                continue;
            }
            out.push(Concept {
                name: concept_name(Framework::Classiq, module, name),
                summary: two_sentence_summary(&docstring),
                docstring,
                source_code: py.source_segment(func),
                kind: None,
                is_target_subclass: None,
                base_classes: None,
            });
        }
        out
    }
}

/// Names listed in module-level `__all__ = [...]` / `__all__ += [...]`.
pub fn parse_dunder_all(source: &str) -> Result<BTreeSet<String>> {
    let py = PySource::parse(source).map_err(|e| anyhow!("Failed to parse __all__ module: {e}"))?;
    let mut names = BTreeSet::new();
    let mut cursor = py.root().walk();
    for stmt in py.root().named_children(&mut cursor) {
        if stmt.kind() != "expression_statement" {
            continue;
        }
        let Some(assign) = stmt.named_child(0) else {
            continue;
        };
        if !matches!(assign.kind(), "assignment" | "augmented_assignment") {
            continue;
        }
        let (Some(left), Some(right)) = (
            assign.child_by_field_name("left"),
            assign.child_by_field_name("right"),
        ) else {
            continue;
        };
        if py.node_text(left) != "__all__" || !matches!(right.kind(), "list" | "tuple") {
            continue;
        }
        let mut items = right.walk();
        for item in right.named_children(&mut items) {
            if item.kind() == "string" {
                if let Some(value) = decode_string_literal(py.node_text(item)) {
                    names.insert(value);
                }
            }
        }
    }
    Ok(names)
}

/// Found vs. expected public API names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiCoverage {
    pub found: Vec<String>,
    pub missing: Vec<String>,
}

pub fn api_coverage_report(concepts: &[Concept], expected: &BTreeSet<String>) -> ApiCoverage {
    let found: BTreeSet<String> = concepts.iter().map(|c| c.symbol().to_string()).collect();
    ApiCoverage {
        missing: expected.difference(&found).cloned().collect(),
        found: found.into_iter().collect(),
    }
}

// ============================================================================
// Naming-convention dedup
// ============================================================================

/// A concept dropped during dedup and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovedConcept {
    pub removed: String,
    pub reason: String,
    pub summary: String,
}

/// Drop free functions that only wrap a class of the same module
/// (`class QFT` + `def qft`).
pub fn dedup_by_naming_convention(concepts: Vec<Concept>) -> (Vec<Concept>, Vec<RemovedConcept>) {
    let mut by_module: BTreeMap<String, Vec<&Concept>> = BTreeMap::new();
    for concept in &concepts {
        let module = match concept.name.rsplit_once('.') {
            Some((prefix, _)) => prefix.to_string(),
            None => String::new(),
        };
        by_module.entry(module).or_default().push(concept);
    }

    let mut discard: HashSet<String> = HashSet::new();
    let mut removed = Vec::new();
    for members in by_module.values() {
        let functions: BTreeMap<&str, &Concept> = members
            .iter()
            .filter(|c| c.kind == Some(ConceptKind::Function))
            .map(|c| (c.symbol(), *c))
            .collect();
        if functions.is_empty() {
            continue;
        }
        for class in members.iter().filter(|c| c.kind == Some(ConceptKind::Class)) {
            if let Some(func) = functions.get(to_snake_case(class.symbol()).as_str()) {
                if discard.insert(func.name.clone()) {
                    removed.push(RemovedConcept {
                        removed: func.name.clone(),
                        reason: format!("Wrapper for class {}", class.name),
                        summary: func.summary.clone(),
                    });
                }
            }
        }
    }

    let kept = concepts
        .into_iter()
        .filter(|c| !discard.contains(&c.name))
        .collect();
    (kept, removed)
}

// ============================================================================
// Output
// ============================================================================

/// Write concepts (without source) as pretty JSON.
pub fn write_concepts_json(concepts: &[Concept], path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(concepts)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Write `name,summary` rows.
pub fn write_concepts_csv(concepts: &[Concept], path: &Path, delimiter: u8) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(["name", "summary"])?;
    for concept in concepts {
        writer.write_record([concept.name.as_str(), concept.summary.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// File stem of a concept's snippet: `/` and `.` become `_`, one leading `_` dropped.
pub fn snippet_file_stem(concept_name: &str) -> String {
    let sanitized = concept_name.replace(['/', '.'], "_");
    sanitized
        .strip_prefix('_')
        .map(str::to_string)
        .unwrap_or(sanitized)
}

/// Save each concept's source as `<dir>/<stem>.py`; returns the number written.
pub fn save_source_snippets(concepts: &[Concept], dir: &Path) -> Result<usize> {
    if concepts.is_empty() {
        return Ok(0);
    }
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let mut count = 0;
    for concept in concepts.iter().filter(|c| !c.source_code.is_empty()) {
        let path = dir.join(format!("{}.py", snippet_file_stem(&concept.name)));
        match fs::write(&path, &concept.source_code) {
            Ok(()) => count += 1,
            Err(err) => {
                tracing::warn!(concept = %concept.name, error = %err, "could not write source snippet")
            }
        }
    }
    Ok(count)
}

// ============================================================================
// Helpers
// ============================================================================

fn ensure_root(root: &Path, label: &str) -> Result<()> {
    if root.is_dir() {
        Ok(())
    } else {
        Err(anyhow!("{label} project root not found at '{}'", root.display()))
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn concept_name(framework: Framework, module: &str, symbol: &str) -> String {
    format!("/{}/{}.{}", framework.as_str(), module, symbol)
}

fn is_async(func: Node<'_>) -> bool {
    func.child(0).is_some_and(|c| c.kind() == "async")
}

fn descendants_of_kind<'a>(root: Node<'a>, kind: &str) -> Vec<Node<'a>> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.kind() == kind {
            out.push(node);
        }
        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    out
}

/// Parse each file and run `visit`; first occurrence of a name wins.
fn scan_files<F>(files: &[PathBuf], sdk_root: &Path, min_chars: Option<usize>, mut visit: F) -> Vec<Concept>
where
    F: FnMut(&PySource, &str) -> Vec<Concept>,
{
    let mut seen = HashSet::new();
    let mut concepts = Vec::new();
    for file in files {
        let text = match fs::read_to_string(file) {
            Ok(t) => t,
            Err(err) => {
                tracing::warn!(path = %file.display(), error = %err, "could not read file");
                continue;
            }
        };
        if min_chars.is_some_and(|min| text.trim().chars().count() < min) {
            continue;
        }
        let Some(module) = module_path(file, sdk_root) else {
            continue;
        };
        let py = match PySource::parse(text) {
            Ok(py) => py,
            Err(err) => {
                tracing::warn!(path = %file.display(), error = %err, "could not parse file");
                continue;
            }
        };
        for concept in visit(&py, &module) {
            if seen.insert(concept.name.clone()) {
                concepts.push(concept);
            }
        }
    }
    concepts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(name: &str, kind: ConceptKind) -> Concept {
        Concept {
            name: name.to_string(),
            summary: format!("summary of {name}"),
            docstring: String::new(),
            source_code: String::new(),
            kind: Some(kind),
            is_target_subclass: None,
            base_classes: None,
        }
    }

    #[test]
    fn snake_case_matches_python_convention() {
        assert_eq!(to_snake_case("QFT"), "qft");
        assert_eq!(to_snake_case("QFTGate"), "qft_gate");
        assert_eq!(to_snake_case("PhaseEstimation"), "phase_estimation");
        assert_eq!(to_snake_case("GraphStateGate"), "graph_state_gate");
    }

    #[test]
    fn qiskit_docstring_drops_diagrams_and_math() {
        let doc = "Quantum Fourier Transform.\n\nMore text.\n\nCircuit symbol:\n\n     ┌──────┐\nq_0: ┤0     ├\n     └──────┘\n\n.. math::\n\n    |j\\rangle\n";
        let cleaned = clean_qiskit_docstring(doc);
        assert!(cleaned.starts_with("Quantum Fourier Transform."));
        assert!(cleaned.contains("More text."));
        assert!(!cleaned.contains('┌'));
        assert!(!cleaned.contains("rangle"));
    }

    #[test]
    fn classiq_boilerplate_and_summary() {
        let doc = "[Qmod Classiq-library function]\n\nPrepares a state. Uses amplitudes. Extra sentence.\n\nArgs: x";
        let stripped = strip_classiq_boilerplate(doc);
        assert!(stripped.starts_with("Prepares a state."));
        assert_eq!(two_sentence_summary(&stripped), "Prepares a state. Uses amplitudes.");
        assert_eq!(strip_classiq_boilerplate("[Qmod core-library function]."), "");
        assert_eq!(two_sentence_summary("Only one"), "Only one.");
    }

    #[test]
    fn naming_convention_removes_wrapper_functions() {
        let concepts = vec![
            concept("/qiskit/qiskit.circuit.library.qft.QFT", ConceptKind::Class),
            concept("/qiskit/qiskit.circuit.library.qft.qft", ConceptKind::Function),
            concept("/qiskit/qiskit.circuit.library.other.qft", ConceptKind::Function),
        ];
        let (kept, removed) = dedup_by_naming_convention(concepts);
        assert_eq!(kept.len(), 2);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].removed, "/qiskit/qiskit.circuit.library.qft.qft");
        assert_eq!(
            removed[0].reason,
            "Wrapper for class /qiskit/qiskit.circuit.library.qft.QFT"
        );
    }

    #[test]
    fn snippet_stem_strips_one_leading_underscore() {
        assert_eq!(
            snippet_file_stem("/qiskit/qiskit.circuit.QFT"),
            "qiskit_qiskit_circuit_QFT"
        );
    }

    #[test]
    fn dunder_all_is_parsed_statically() {
        let src = "from .a import *\n__all__ = [\n    'qft',\n    \"grover_operator\",\n]\n__all__ += ('extra',)\n";
        let names = parse_dunder_all(src).unwrap();
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["extra", "grover_operator", "qft"]
        );
    }

    #[test]
    fn api_coverage_lists_missing_names() {
        let found = vec![concept("/classiq/open_library.functions.qft.qft", ConceptKind::Function)];
        let expected: BTreeSet<String> = ["qft", "qpe"].iter().map(|s| s.to_string()).collect();
        let report = api_coverage_report(&found, &expected);
        assert_eq!(report.found, vec!["qft"]);
        assert_eq!(report.missing, vec!["qpe"]);
    }
}
