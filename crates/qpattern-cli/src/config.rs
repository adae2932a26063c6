//! Pipeline configuration: directory layout, embedding backend, thresholds.
//!
//! Values come from (lowest to highest precedence) the built-in defaults, an
//! optional JSON file, and the environment.

use anyhow::{Context, Result};
use qpattern_ingest::list_subdirectories;
use qpattern_match::{EmbeddingConfig, Thresholds, DEDUP_SIMILARITY_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::github::DiscoveryCriteria;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub project_root: PathBuf,
    /// Relative paths below are resolved against `project_root`.
    pub target_projects_dir: PathBuf,
    pub results_dir: PathBuf,
    pub docs_dir: PathBuf,
    pub notebooks_archive_dir: PathBuf,
    pub converted_notebooks_dir: PathBuf,
    /// Project-relative directories whose notebooks are never prepared.
    pub ignored_notebook_paths: Vec<PathBuf>,
    pub embedding: EmbeddingConfig,
    pub thresholds: Thresholds,
    pub dedup_threshold: f32,
    pub discovery: DiscoveryCriteria,
    #[serde(skip)]
    pub github_token: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            target_projects_dir: PathBuf::from("target_github_projects"),
            results_dir: PathBuf::from("data"),
            docs_dir: PathBuf::from("docs"),
            notebooks_archive_dir: PathBuf::from("notebooks"),
            converted_notebooks_dir: PathBuf::from("converted_notebooks"),
            ignored_notebook_paths: Vec::new(),
            embedding: EmbeddingConfig::default(),
            thresholds: Thresholds::default(),
            dedup_threshold: DEDUP_SIMILARITY_THRESHOLD,
            discovery: DiscoveryCriteria::default(),
            github_token: None,
        }
    }
}

impl PipelineConfig {
    /// Defaults, overlaid by `config_file` when given, then by the process
    /// environment. `root` (from `--root` / `QPATTERN_ROOT`) wins over the file.
    pub fn load(config_file: Option<&Path>, root: Option<PathBuf>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        if let Some(root) = root {
            config.project_root = root;
        }
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// `OLLAMA_HOST`, then `GITHUB_TOKEN` falling back to `GITHUB_PAT`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        if let Some(host) = non_empty("OLLAMA_HOST") {
            self.embedding.ollama_host = host;
        }
        if let Some(token) = non_empty("GITHUB_TOKEN").or_else(|| non_empty("GITHUB_PAT")) {
            self.github_token = Some(token);
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn target_projects_dir(&self) -> PathBuf {
        self.resolve(&self.target_projects_dir)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.resolve(&self.results_dir)
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.resolve(&self.docs_dir)
    }

    pub fn notebooks_archive_dir(&self) -> PathBuf {
        self.resolve(&self.notebooks_archive_dir)
    }

    pub fn converted_notebooks_dir(&self) -> PathBuf {
        self.resolve(&self.converted_notebooks_dir)
    }

    /// Where enriched knowledge-base CSVs are consolidated.
    pub fn knowledge_base_dir(&self) -> PathBuf {
        self.results_dir().join("knowledge_base")
    }

    /// Subdirectory names of the target projects directory; empty (with an
    /// error logged) when it does not exist.
    pub fn target_projects(&self) -> Vec<String> {
        let base = self.target_projects_dir();
        match list_subdirectories(&base) {
            Ok(names) => names,
            Err(err) => {
                tracing::error!(
                    path = %base.display(),
                    error = %err,
                    "target projects directory not found; check target_projects_dir"
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn relative_dirs_resolve_against_root() {
        let config = PipelineConfig {
            project_root: PathBuf::from("/work"),
            docs_dir: PathBuf::from("/elsewhere/docs"),
            ..Default::default()
        };
        assert_eq!(config.results_dir(), PathBuf::from("/work/data"));
        assert_eq!(config.docs_dir(), PathBuf::from("/elsewhere/docs"));
        assert_eq!(
            config.knowledge_base_dir(),
            PathBuf::from("/work/data/knowledge_base")
        );
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qpattern.json");
        fs::write(&path, r#"{"results_dir": "out", "thresholds": {"summary": 0.7}}"#).unwrap();
        let config = PipelineConfig::load(Some(&path), Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(config.results_dir(), dir.path().join("out"));
        assert_eq!(config.thresholds.summary, 0.7);
        assert_eq!(config.thresholds.name, 0.90);
        assert_eq!(config.dedup_threshold, 0.95);
        assert_eq!(config.discovery.min_stars, 30);
    }

    #[test]
    fn env_token_falls_back_to_pat() {
        let vars: HashMap<&str, &str> = [("GITHUB_TOKEN", " "), ("GITHUB_PAT", "pat-123")].into();
        let mut config = PipelineConfig::default();
        config.apply_env(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.github_token.as_deref(), Some("pat-123"));
        assert_eq!(config.embedding.ollama_host, "http://127.0.0.1:11434");
    }

    #[test]
    fn missing_projects_dir_yields_no_projects() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            project_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(config.target_projects().is_empty());
        fs::create_dir_all(dir.path().join("target_github_projects/qiskit")).unwrap();
        fs::create_dir_all(dir.path().join("target_github_projects/cirq")).unwrap();
        assert_eq!(config.target_projects(), vec!["cirq", "qiskit"]);
    }
}
