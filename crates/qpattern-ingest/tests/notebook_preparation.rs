use qpattern_ingest::{
    comment_block, convert_tree, find_notebooks, notebook_to_script, prepare_notebooks, NotebookError,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const NOTEBOOK: &str = r#"{
  "nbformat": 4, "nbformat_minor": 5, "metadata": {},
  "cells": [
    {"cell_type": "markdown", "metadata": {}, "source": "Grover search demo"},
    {"cell_type": "code", "execution_count": 1, "metadata": {}, "outputs": [],
     "source": ["from qiskit import QuantumCircuit\n", "qc = QuantumCircuit(3)\n", "qc.measure_all()"]}
  ]
}"#;

fn write(root: &Path, rel: &str, text: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn convert_tree_mirrors_layout_and_skips_up_to_date_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("notebooks");
    let dest = dir.path().join("converted_notebooks");
    write(&src, "proj_a/grover.ipynb", NOTEBOOK);
    write(&src, "proj_b/nested/bell.ipynb", NOTEBOOK);
    write(&src, "proj_b/broken.ipynb", "{ nope");

    let first = convert_tree(&src, &dest).unwrap();
    assert_eq!(first.success, 2);
    assert_eq!(first.skipped, 0);
    assert_eq!(first.errors.len(), 1);

    let script = fs::read_to_string(dest.join("proj_a/grover.py")).unwrap();
    assert!(script.starts_with("#!/usr/bin/env python\n# coding: utf-8\n"));
    assert!(script.contains("# Grover search demo"));
    assert!(script.contains("qc.measure_all()"));
    assert!(dest.join("proj_b/nested/bell.py").is_file());

    let second = convert_tree(&src, &dest).unwrap();
    assert_eq!(second.success, 0);
    assert_eq!(second.skipped, 2);
}

#[test]
fn convert_tree_requires_source_dir() {
    let dir = tempfile::tempdir().unwrap();
    let err = convert_tree(&dir.path().join("missing"), dir.path()).unwrap_err();
    assert!(matches!(err, NotebookError::MissingSource(_)));
}

#[test]
fn prepare_converts_in_place_and_archives_by_project() {
    let dir = tempfile::tempdir().unwrap();
    let projects = dir.path().join("target_github_projects");
    let archive = dir.path().join("notebooks");
    let nb = write(&projects, "qiskit/tutorials/intro.ipynb", NOTEBOOK);
    write(&projects, "qiskit/.ipynb_checkpoints/intro-checkpoint.ipynb", NOTEBOOK);
    write(&projects, "qiskit/legacy/old.ipynb", NOTEBOOK);
    write(&projects, "pennylane/demo.ipynb", NOTEBOOK);

    let old = SystemTime::now() - Duration::from_secs(3600);
    fs::File::options()
        .write(true)
        .open(&nb)
        .unwrap()
        .set_modified(old)
        .unwrap();

    let found = find_notebooks(
        &projects,
        &["pennylane".to_string(), "qiskit".to_string(), "absent".to_string()],
        &[PathBuf::from("qiskit/legacy")],
    );
    let mut rel: Vec<String> = found
        .iter()
        .map(|f| f.path.strip_prefix(&projects).unwrap().to_string_lossy().replace('\\', "/"))
        .collect();
    rel.sort();
    assert_eq!(rel, vec!["pennylane/demo.ipynb", "qiskit/tutorials/intro.ipynb"]);

    let summary = prepare_notebooks(&found, &archive);
    assert_eq!(summary.converted, 2);
    assert_eq!(summary.copied, 2);
    assert_eq!(summary.convert_errors + summary.copy_errors, 0);
    assert!(projects.join("qiskit/tutorials/intro.ipynb.py").is_file());

    let archived = archive.join("qiskit/intro.ipynb");
    assert!(archived.is_file());
    let archived_mtime = fs::metadata(&archived).unwrap().modified().unwrap();
    let delta = archived_mtime
        .duration_since(old)
        .unwrap_or_else(|e| e.duration());
    assert!(delta < Duration::from_secs(2));

    let again = prepare_notebooks(&found, &archive);
    assert_eq!(again.skipped_up_to_date, 2);
    assert_eq!(again.copied, 2);
}

#[test]
fn converted_script_comments_form_the_summary_block() {
    let script = notebook_to_script(NOTEBOOK).unwrap();
    assert_eq!(comment_block(&script), "!/usr/bin/env python coding: utf-8 Grover search demo In[1]:");
}

#[test]
fn find_notebooks_only_prunes_dot_directories() {
    let dir = tempfile::tempdir().unwrap();
    let projects = dir.path().join("target_github_projects");
    write(&projects, "cirq/build/lib/demo.ipynb", NOTEBOOK);
    write(&projects, "cirq/venv/share/kernel.ipynb", NOTEBOOK);
    write(&projects, "cirq/node_modules/pkg/x.ipynb", NOTEBOOK);
    write(&projects, "cirq/.venv/share/hidden.ipynb", NOTEBOOK);
    write(&projects, "cirq/.git/objects/y.ipynb", NOTEBOOK);

    let found = find_notebooks(&projects, &["cirq".to_string()], &[]);
    let mut rel: Vec<String> = found
        .iter()
        .map(|f| f.path.strip_prefix(&projects).unwrap().to_string_lossy().replace('\\', "/"))
        .collect();
    rel.sort();
    assert_eq!(
        rel,
        vec![
            "cirq/build/lib/demo.ipynb",
            "cirq/node_modules/pkg/x.ipynb",
            "cirq/venv/share/kernel.ipynb",
        ]
    );
    assert!(found.iter().all(|f| f.project == "cirq"));
}
