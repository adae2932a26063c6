use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn qpattern_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_qpattern"))
}

fn write(root: &Path, rel: &str, text: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
    fs::write(&path, text).expect("write fixture");
    path
}

/// Run the binary offline against `root`, with no GitHub credentials.
fn run(root: &Path, args: &[&str]) -> Output {
    Command::new(qpattern_bin())
        .arg("--root")
        .arg(root)
        .args(args)
        .env_remove("GITHUB_TOKEN")
        .env_remove("GITHUB_PAT")
        .env_remove("QPATTERN_ROOT")
        .env_remove("RUST_LOG")
        .output()
        .expect("run qpattern")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn assert_success(out: &Output) {
    assert!(
        out.status.success(),
        "qpattern failed\nstdout:\n{}\nstderr:\n{}",
        stdout(out),
        String::from_utf8_lossy(&out.stderr)
    );
}

const ANGLE_EMBEDDING: &str = r#""""Angle embedding template."""


class AngleEmbedding:
    """Encodes features into the rotation angles of qubits.

    Each feature is used as the angle of one rotation gate.
    """

    def __init__(self, features, wires):
        self.features = features
        self.wires = wires
"#;

const QISKIT_CONCEPTS: &str = r#"[
  {"name": "/qiskit/qiskit.circuit.library.grover_operator.GroverOperator",
   "summary": "Amplitude amplification operator for Grover search."},
  {"name": "/qiskit/qiskit.circuit.library.qft.QFT",
   "summary": "Quantum Fourier transform circuit."}
]"#;

const QISKIT_PATTERNS: &str = "concept,summary,pattern\n\
/qiskit/qiskit.circuit.library.grover_operator.GroverOperator,amp,Amplitude Amplification\n\
QFT,qft,Quantum Fourier Transform\n";

#[test]
fn concepts_pennylane_writes_all_artifacts() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(
        dir.path(),
        "target_github_projects/pennylane/pennylane/templates/embeddings/angle.py",
        ANGLE_EMBEDDING,
    );

    let out = run(dir.path(), &["concepts", "pennylane"]);
    assert_success(&out);

    let json = fs::read_to_string(dir.path().join("data/pennylane_quantum_concepts.json"))
        .expect("concepts json");
    assert!(json.contains("AngleEmbedding"));
    assert!(json.contains("Encodes features into the rotation angles of qubits."));
    assert!(dir.path().join("data/pennylane_quantum_concepts.csv").is_file());
    assert!(stdout(&out).contains("1 unique concepts"));
}

#[test]
fn notebooks_convert_uses_configured_directories() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(
        dir.path(),
        "notebooks/proj_a/bell.ipynb",
        r#"{"nbformat": 4, "nbformat_minor": 5, "metadata": {},
            "cells": [{"cell_type": "code", "execution_count": null, "metadata": {},
                       "outputs": [], "source": "qc.h(0)"}]}"#,
    );

    let out = run(dir.path(), &["notebooks", "convert"]);
    assert_success(&out);
    let script = fs::read_to_string(dir.path().join("converted_notebooks/proj_a/bell.py"))
        .expect("converted script");
    assert!(script.contains("qc.h(0)"));
    assert!(stdout(&out).contains("converted: 1"));
}

#[test]
fn analyze_then_final_report() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "data/qiskit_quantum_concepts.json", QISKIT_CONCEPTS);
    write(dir.path(), "data/enriched_qiskit_quantum_patterns.csv", QISKIT_PATTERNS);
    write(
        dir.path(),
        "converted_notebooks/proj_a/grover.py",
        "# Amplitude amplification operator for Grover search\nop = grover_operator(oracle)\n",
    );

    let analyze = run(dir.path(), &["analyze", "--backend", "token_hash"]);
    assert_success(&analyze);
    assert!(stdout(&analyze).contains("Successfully matched 2 / 2 concepts with a pattern"));
    assert!(dir
        .path()
        .join("data/quantum_concept_matches_with_patterns.csv")
        .is_file());

    let report = run(dir.path(), &["report", "final"]);
    assert_success(&report);
    let md = fs::read_to_string(dir.path().join("docs/final_pattern_report.md"))
        .expect("markdown report");
    assert!(md.contains("Amplitude Amplification"));
    assert!(dir.path().join("data/final_pattern_report.txt").is_file());
    assert!(dir.path().join("data/latex_report_tables").is_dir());
}

#[test]
fn final_report_without_matches_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = run(dir.path(), &["report", "final"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Run the analysis first"));
}

#[test]
fn kb_consolidate_merges_framework_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(
        dir.path(),
        "data/knowledge_base/enriched_qiskit_quantum_patterns.csv",
        "concept,summary,pattern\n/qiskit/a.QFT,Fourier,QFT\n",
    );

    let out = run(dir.path(), &["kb", "consolidate"]);
    assert_success(&out);
    let text = fs::read_to_string(dir.path().join("data/knowledge_base/knowledge_base.csv"))
        .expect("knowledge base");
    assert_eq!(text, "framework,concept,summary,pattern\nqiskit,/qiskit/a.QFT,Fourier,QFT\n");
}

#[test]
fn discover_requires_a_token() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = run(dir.path(), &["discover"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("GitHub token not found"));
    assert!(!dir.path().join("data").exists());
}
