use qpattern_match::{
    consolidate, load_all_patterns, load_patterns_map, load_quantum_concepts, read_matches,
    run_analysis, save_unclassified, AnalysisOutcome, AnalysisPaths, MatchType,
    TokenHashEmbedder, Thresholds, UNMAPPED_PATTERN,
};
use std::fs;
use std::path::{Path, PathBuf};

fn write(root: &Path, rel: &str, text: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, text).unwrap();
    path
}

const QISKIT_CONCEPTS: &str = r#"[
  {"name": "/qiskit/qiskit.circuit.library.grover_operator.GroverOperator",
   "summary": "Amplitude amplification operator for Grover search."},
  {"name": "/qiskit/qiskit.circuit.library.qft.QFT",
   "summary": "Quantum Fourier transform circuit."},
  {"name": "/qiskit/qiskit.circuit.library.broken", "docstring": "no summary"}
]"#;

const PENNYLANE_CONCEPTS: &str = r#"[
  {"name": "/pennylane/pennylane.templates.embeddings.AngleEmbedding",
   "summary": "Encodes features into rotation angles of qubits."}
]"#;

const QISKIT_PATTERNS: &str = "concept,summary,pattern\n\
/qiskit/qiskit.circuit.library.grover_operator.GroverOperator,amp,Amplitude Amplification\n\
QFT,qft,Quantum Fourier Transform\n\
short,row\n";

fn results_fixture(results: &Path) {
    write(results, "qiskit_quantum_concepts.json", QISKIT_CONCEPTS);
    write(results, "pennylane_quantum_concepts.json", PENNYLANE_CONCEPTS);
    write(results, "enriched_qiskit_quantum_patterns.csv", QISKIT_PATTERNS);
}

#[test]
fn mappings_resolve_by_full_then_short_name() {
    let dir = tempfile::tempdir().unwrap();
    results_fixture(dir.path());
    let files = vec![
        dir.path().join("enriched_classiq_quantum_patterns.csv"),
        dir.path().join("enriched_qiskit_quantum_patterns.csv"),
    ];
    let map = load_patterns_map(&files);
    assert_eq!(map.len(), 2);

    let concepts = load_quantum_concepts(
        &[
            dir.path().join("pennylane_quantum_concepts.json"),
            dir.path().join("qiskit_quantum_concepts.json"),
        ],
        &map,
    );
    let patterns: Vec<&str> = concepts.iter().map(|c| c.pattern.as_str()).collect();
    assert_eq!(
        patterns,
        vec![UNMAPPED_PATTERN, "Amplitude Amplification", "Quantum Fourier Transform"]
    );
    assert_eq!(concepts[2].short_name, "QFT");

    let all = load_all_patterns(&files);
    assert_eq!(
        all.into_iter().collect::<Vec<_>>(),
        vec!["Amplitude Amplification", "Quantum Fourier Transform"]
    );
}

#[test]
fn unclassified_file_is_written_then_removed() {
    let dir = tempfile::tempdir().unwrap();
    results_fixture(dir.path());
    let map = load_patterns_map(&[dir.path().join("enriched_qiskit_quantum_patterns.csv")]);
    let path = dir.path().join("unclassified_concepts.csv");

    let concepts = load_quantum_concepts(&[dir.path().join("pennylane_quantum_concepts.json")], &map);
    assert_eq!(save_unclassified(&concepts, &path).unwrap(), 1);
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("name,summary\n"));
    assert!(text.contains("AngleEmbedding"));

    let mapped = load_quantum_concepts(&[dir.path().join("qiskit_quantum_concepts.json")], &map);
    assert_eq!(save_unclassified(&mapped, &path).unwrap(), 0);
    assert!(!path.exists());
}

#[test]
fn analysis_writes_matches_for_every_script() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("data");
    let notebooks = dir.path().join("converted_notebooks");
    results_fixture(&results);
    write(
        &notebooks,
        "proj_a/grover.py",
        "# Amplitude amplification operator for Grover search\nop = grover_operator(oracle)\nprint(op)\n",
    );
    write(&notebooks, "proj_b/nested/plot.py", "import matplotlib.pyplot as plt\nplt.show()\n");
    write(
        &notebooks,
        "proj_b/broken.py",
        "def f(:\n    # quantum fourier transform circuit\n",
    );
    write(&notebooks, "proj_b/notes.txt", "# Quantum Fourier transform circuit\n");

    let paths = AnalysisPaths::standard(&results, &notebooks);
    let outcome = run_analysis(&paths, &TokenHashEmbedder::default(), Thresholds::default()).unwrap();
    let AnalysisOutcome::Completed {
        concepts,
        mapped,
        unclassified,
        run,
        ..
    } = outcome
    else {
        panic!("expected a completed analysis");
    };
    assert_eq!((concepts, mapped, unclassified), (3, 2, 1));
    assert_eq!(run.files_total, 3);
    assert_eq!((run.name_matches, run.summary_matches), (1, 2));
    assert!(results.join("unclassified_concepts.csv").is_file());

    let header = fs::read_to_string(&paths.output_csv).unwrap();
    assert!(header.starts_with(
        "file_path;concept_name;pattern;match_type;matched_text;similarity_score\n"
    ));

    let matches = read_matches(&paths.output_csv).unwrap();
    assert_eq!(matches.len(), 3);
    assert_eq!(matches[0].file_path, "proj_a/grover.py");
    assert_eq!(matches[0].match_type, MatchType::Name);
    assert_eq!(matches[0].matched_text, "grover_operator");
    assert_eq!(matches[1].match_type, MatchType::Summary);
    assert_eq!(matches[2].file_path, "proj_b/broken.py");
    assert_eq!(matches[2].pattern, "Quantum Fourier Transform");
    assert!(matches.iter().all(|m| m.similarity_score > 0.99));
}

#[test]
fn analysis_without_concepts_stops_early() {
    let dir = tempfile::tempdir().unwrap();
    let paths = AnalysisPaths::standard(&dir.path().join("data"), &dir.path().join("nb"));
    let outcome = run_analysis(&paths, &TokenHashEmbedder::default(), Thresholds::default()).unwrap();
    assert_eq!(outcome, AnalysisOutcome::NoConcepts);
    assert!(!paths.output_csv.exists());
}

#[test]
fn consolidate_prefixes_framework_and_unions_columns() {
    let dir = tempfile::tempdir().unwrap();
    let classiq = write(
        dir.path(),
        "enriched_classiq_quantum_patterns.csv",
        "concept,summary,pattern\nqft,Fourier,QFT\n",
    );
    let qiskit = write(
        dir.path(),
        "enriched_qiskit_quantum_patterns.csv",
        "concept,summary,pattern,notes\n/qiskit/a.QFT,Fourier,QFT,checked\n",
    );
    let out = dir.path().join("docs/knowledge_base.csv");
    let rows = consolidate(
        &[
            ("classiq".to_string(), classiq),
            ("pennylane".to_string(), dir.path().join("missing.csv")),
            ("qiskit".to_string(), qiskit),
        ],
        &out,
    )
    .unwrap();
    assert_eq!(rows, 2);
    let text = fs::read_to_string(&out).unwrap();
    assert_eq!(
        text,
        "framework,concept,summary,pattern,notes\n\
         classiq,qft,Fourier,QFT,\n\
         qiskit,/qiskit/a.QFT,Fourier,QFT,checked\n"
    );

    let err = consolidate(&[("x".to_string(), dir.path().join("none.csv"))], &out).unwrap_err();
    assert!(err.to_string().contains("No knowledge-base files"));
}
