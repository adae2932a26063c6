//! Directory walking shared by the extractors, the notebook preprocessor and
//! the matcher.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Options controlling a file walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkOptions {
    /// File suffix to collect (e.g. `.py`, `.ipynb`).
    pub suffix: String,
    /// Directory names to skip (exact match).
    pub exclude_dir_names: Vec<String>,
    /// Skip every directory whose name starts with `.`.
    pub skip_hidden_dirs: bool,
    /// Maximum number of files to return (safety cap).
    pub max_files: usize,
}

impl WalkOptions {
    pub fn for_suffix(suffix: &str) -> Self {
        Self {
            suffix: suffix.to_string(),
            exclude_dir_names: Vec::new(),
            skip_hidden_dirs: false,
            max_files: 1_000_000,
        }
    }

    pub fn excluding(mut self, names: &[&str]) -> Self {
        self.exclude_dir_names
            .extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn skip_hidden(mut self) -> Self {
        self.skip_hidden_dirs = true;
        self
    }
}

/// Collect files under `root` ending in `options.suffix`, sorted by path.
///
/// Excluded directories are pruned below the root only; the root itself is
/// always entered.
pub fn collect_files(root: &Path, options: &WalkOptions) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(anyhow!("Directory not found: {}", root.display()));
    }

    let exclude: BTreeSet<&str> = options
        .exclude_dir_names
        .iter()
        .map(String::as_str)
        .collect();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            if options.skip_hidden_dirs && name.starts_with('.') {
                return false;
            }
            !exclude.contains(name.as_ref())
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!(root = %root.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if !entry
            .file_name()
            .to_string_lossy()
            .ends_with(options.suffix.as_str())
        {
            continue;
        }
        files.push(entry.into_path());
        if files.len() >= options.max_files {
            break;
        }
    }
    files.sort();
    Ok(files)
}

/// Dotted module path of `file` relative to `sdk_root`
/// (`qiskit/circuit/library/qft.py` → `qiskit.circuit.library.qft`).
pub fn module_path(file: &Path, sdk_root: &Path) -> Option<String> {
    let relative = file.strip_prefix(sdk_root).ok()?;
    let mut parts: Vec<String> = relative
        .parent()
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    parts.push(relative.file_stem()?.to_string_lossy().to_string());
    Some(parts.join("."))
}

/// Subdirectories of `base` (names only, sorted).
pub fn list_subdirectories(base: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(base)
        .map_err(|e| anyhow!("Failed to read {}: {}", base.display(), e))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn collect_prunes_excluded_and_hidden_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("pkg/standard_gates")).unwrap();
        fs::create_dir_all(root.join(".hidden")).unwrap();
        fs::write(root.join("pkg/b.py"), "").unwrap();
        fs::write(root.join("pkg/a.py"), "").unwrap();
        fs::write(root.join("pkg/notes.txt"), "").unwrap();
        fs::write(root.join("pkg/standard_gates/x.py"), "").unwrap();
        fs::write(root.join(".hidden/y.py"), "").unwrap();

        let opts = WalkOptions::for_suffix(".py")
            .excluding(&["standard_gates"])
            .skip_hidden();
        let files = collect_files(root, &opts).unwrap();
        let rel: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(rel, vec!["pkg/a.py", "pkg/b.py"]);
    }

    #[test]
    fn collect_errors_on_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_files(&dir.path().join("nope"), &WalkOptions::for_suffix(".py")).is_err());
    }

    #[test]
    fn module_path_uses_dots_and_drops_suffix() {
        let root = Path::new("/sdk");
        assert_eq!(
            module_path(Path::new("/sdk/qiskit/circuit/library/qft.py"), root).as_deref(),
            Some("qiskit.circuit.library.qft")
        );
        assert_eq!(module_path(Path::new("/other/x.py"), root), None);
    }
}
