//! Jupyter notebook normalization.
//!
//! The matcher only reads Python scripts, so notebooks are exported to `.py`
//! the way nbconvert's Python exporter does it (prompts as comments, markdown
//! commented out, IPython magics rewritten to `get_ipython()` calls).

use crate::repo::{collect_files, WalkOptions};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotebookError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid notebook JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported notebook format: {0}")]
    Format(String),
    #[error("source directory not found: {}", .0.display())]
    MissingSource(PathBuf),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> NotebookError + '_ {
    move |source| NotebookError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ============================================================================
// Export
// ============================================================================

struct Cell {
    kind: String,
    source: String,
    execution_count: Option<u64>,
    raw_mimetype: String,
}

/// Raw-cell formats a Python export passes through verbatim; other raw cells
/// are dropped.
const PYTHON_RAW_MIMETYPES: &[&str] = &["", "text/x-python", "application/x-python"];

/// Export notebook JSON (nbformat v3 or v4) as a Python script.
pub fn notebook_to_script(json: &str) -> Result<String, NotebookError> {
    let nb: Value = serde_json::from_str(json)?;
    let cells = read_cells(&nb)?;

    let mut out = String::from("#!/usr/bin/env python\n# coding: utf-8\n");
    for cell in cells {
        match cell.kind.as_str() {
            "code" => {
                let prompt = cell
                    .execution_count
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| " ".to_string());
                out.push_str(&format!("\n# In[{prompt}]:\n\n\n"));
                out.push_str(&ipython_to_python(&cell.source));
                out.push_str("\n\n");
            }
            "raw" => {
                if PYTHON_RAW_MIMETYPES.contains(&cell.raw_mimetype.as_str()) {
                    out.push('\n');
                    out.push_str(&cell.source);
                    out.push('\n');
                }
            }
            _ => {
                out.push('\n');
                out.push_str(&comment_lines(&cell.source));
                out.push('\n');
            }
        }
    }
    Ok(out)
}

fn read_cells(nb: &Value) -> Result<Vec<Cell>, NotebookError> {
    let major = nb.get("nbformat").and_then(Value::as_u64).unwrap_or(4);
    match major {
        4 => {
            let cells = nb
                .get("cells")
                .and_then(Value::as_array)
                .ok_or_else(|| NotebookError::Format("missing 'cells'".to_string()))?;
            Ok(cells
                .iter()
                .map(|c| Cell {
                    kind: str_field(c, "cell_type"),
                    source: joined_source(c.get("source")),
                    execution_count: c.get("execution_count").and_then(Value::as_u64),
                    raw_mimetype: raw_mimetype(c),
                })
                .collect())
        }
        3 => {
            let worksheets = nb
                .get("worksheets")
                .and_then(Value::as_array)
                .ok_or_else(|| NotebookError::Format("missing 'worksheets'".to_string()))?;
            let mut cells = Vec::new();
            for sheet in worksheets {
                let Some(sheet_cells) = sheet.get("cells").and_then(Value::as_array) else {
                    continue;
                };
                for c in sheet_cells {
                    let kind = str_field(c, "cell_type");
                    let cell = match kind.as_str() {
                        "code" => Cell {
                            kind,
                            source: joined_source(c.get("input")),
                            execution_count: c.get("prompt_number").and_then(Value::as_u64),
                            raw_mimetype: String::new(),
                        },
                        "heading" => {
                            let level = c.get("level").and_then(Value::as_u64).unwrap_or(1).clamp(1, 6);
                            Cell {
                                kind: "markdown".to_string(),
                                source: format!(
                                    "{} {}",
                                    "#".repeat(level as usize),
                                    joined_source(c.get("source"))
                                ),
                                execution_count: None,
                                raw_mimetype: String::new(),
                            }
                        }
                        _ => Cell {
                            kind,
                            source: joined_source(c.get("source")),
                            execution_count: None,
                            raw_mimetype: raw_mimetype(c),
                        },
                    };
                    cells.push(cell);
                }
            }
            Ok(cells)
        }
        other => Err(NotebookError::Format(format!("nbformat {other}"))),
    }
}

fn raw_mimetype(cell: &Value) -> String {
    cell.get("metadata")
        .and_then(|m| m.get("raw_mimetype").or_else(|| m.get("format")))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase()
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key).and_then(Value::as_str).unwrap_or("").to_string()
}

/// Cell sources are either a string or a list of line strings.
fn joined_source(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts.iter().filter_map(Value::as_str).collect(),
        _ => String::new(),
    }
}

fn comment_lines(text: &str) -> String {
    text.split('\n')
        .map(|line| format!("# {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rewrite IPython syntax (magics, shell escapes) into plain Python calls.
pub fn ipython_to_python(source: &str) -> String {
    let trimmed_start = source.trim_start_matches('\n');
    if let Some(rest) = trimmed_start.strip_prefix("%%") {
        let (first_line, body) = rest.split_once('\n').unwrap_or((rest, ""));
        let (name, args) = split_magic(first_line);
        return format!(
            "get_ipython().run_cell_magic({}, {}, {})",
            py_repr(name),
            py_repr(args),
            py_repr(body)
        );
    }

    source
        .split('\n')
        .map(|line| {
            let stripped = line.trim_start();
            let indent = &line[..line.len() - stripped.len()];
            if let Some(magic) = stripped.strip_prefix('%') {
                let (name, args) = split_magic(magic);
                format!(
                    "{indent}get_ipython().run_line_magic({}, {})",
                    py_repr(name),
                    py_repr(args)
                )
            } else if let Some(cmd) = stripped.strip_prefix('!') {
                format!("{indent}get_ipython().system({})", py_repr(cmd))
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn split_magic(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (s.trim(), ""),
    }
}

/// Python `repr()` of a str.
fn py_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

// ============================================================================
// Single-file conversion
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionStatus {
    Success,
    Skipped,
    Error(String),
}

/// `true` when `output` exists and is at least as new as `input`.
fn is_up_to_date(input: &Path, output: &Path) -> bool {
    let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(output), modified(input)) {
        (Some(out), Some(inp)) => out >= inp,
        _ => false,
    }
}

fn try_convert(ipynb: &Path, py: &Path) -> Result<(), NotebookError> {
    if let Some(parent) = py.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let bytes = fs::read(ipynb).map_err(io_err(ipynb))?;
    let script = notebook_to_script(&String::from_utf8_lossy(&bytes))?;
    fs::write(py, script).map_err(io_err(py))
}

/// Convert one notebook, skipping when `py` is already up to date.
pub fn convert_single(ipynb: &Path, py: &Path) -> ConversionStatus {
    if is_up_to_date(ipynb, py) {
        return ConversionStatus::Skipped;
    }
    match try_convert(ipynb, py) {
        Ok(()) => ConversionStatus::Success,
        Err(err) => ConversionStatus::Error(err.to_string()),
    }
}

/// In-place output path: `x.ipynb` → `x.ipynb.py`.
pub fn in_place_script_path(ipynb: &Path) -> PathBuf {
    let mut os: OsString = ipynb.as_os_str().to_owned();
    os.push(".py");
    PathBuf::from(os)
}

// ============================================================================
// Tree conversion
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionSummary {
    pub success: usize,
    pub skipped: usize,
    pub errors: Vec<(PathBuf, String)>,
}

/// Convert every `**/*.ipynb` under `source_dir` to `dest_dir/<relative>.py`.
pub fn convert_tree(source_dir: &Path, dest_dir: &Path) -> Result<ConversionSummary, NotebookError> {
    if !source_dir.is_dir() {
        return Err(NotebookError::MissingSource(source_dir.to_path_buf()));
    }
    let notebooks = collect_files(source_dir, &WalkOptions::for_suffix(".ipynb"))
        .map_err(|e| NotebookError::Format(e.to_string()))?;

    let results: Vec<(PathBuf, ConversionStatus)> = notebooks
        .par_iter()
        .map(|ipynb| {
            let relative = ipynb.strip_prefix(source_dir).unwrap_or(ipynb);
            let py = dest_dir.join(relative).with_extension("py");
            (relative.to_path_buf(), convert_single(ipynb, &py))
        })
        .collect();

    let mut summary = ConversionSummary::default();
    for (relative, status) in results {
        match status {
            ConversionStatus::Success => summary.success += 1,
            ConversionStatus::Skipped => summary.skipped += 1,
            ConversionStatus::Error(msg) => {
                tracing::warn!(path = %relative.display(), error = %msg, "notebook conversion failed");
                summary.errors.push((relative, msg));
            }
        }
    }
    Ok(summary)
}

// ============================================================================
// Discovery + archive preparation
// ============================================================================

/// A notebook inside a cloned project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundNotebook {
    pub path: PathBuf,
    /// Archive folder name (project subpath with `/` → `_`).
    pub project: String,
}

/// Archive folder name for a project subpath.
pub fn project_archive_name(project: &str) -> String {
    project.trim_matches('/').replace('/', "_")
}

/// Find notebooks under each project, skipping dot-directories and anything
/// below an ignored directory (given relative to `projects_dir`).
pub fn find_notebooks(projects_dir: &Path, projects: &[String], ignored: &[PathBuf]) -> Vec<FoundNotebook> {
    let ignored: Vec<PathBuf> = ignored.iter().map(|p| projects_dir.join(p)).collect();
    let opts = WalkOptions::for_suffix(".ipynb").skip_hidden();

    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for project in projects {
        let root = projects_dir.join(project);
        if !root.is_dir() {
            continue;
        }
        let files = match collect_files(&root, &opts) {
            Ok(files) => files,
            Err(err) => {
                tracing::warn!(project = %project, error = %err, "could not walk project");
                continue;
            }
        };
        for path in files {
            if ignored.iter().any(|dir| path.starts_with(dir)) {
                continue;
            }
            if seen.insert(path.clone()) {
                found.push(FoundNotebook {
                    path,
                    project: project_archive_name(project),
                });
            }
        }
    }
    found
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrepareSummary {
    pub converted: usize,
    pub skipped_up_to_date: usize,
    pub convert_errors: usize,
    pub copied: usize,
    pub copy_errors: usize,
    pub error_messages: Vec<String>,
}

/// Copy `src` into `dest_dir`, keeping its modification time.
fn copy_preserving_mtime(src: &Path, dest_dir: &Path) -> Result<PathBuf, NotebookError> {
    fs::create_dir_all(dest_dir).map_err(io_err(dest_dir))?;
    let name = src
        .file_name()
        .ok_or_else(|| NotebookError::Format(format!("no file name in {}", src.display())))?;
    let dest = dest_dir.join(name);
    fs::copy(src, &dest).map_err(io_err(src))?;
    let mtime = fs::metadata(src).and_then(|m| m.modified()).map_err(io_err(src))?;
    fs::File::options()
        .write(true)
        .open(&dest)
        .and_then(|f| f.set_modified(mtime))
        .map_err(io_err(&dest))?;
    Ok(dest)
}

/// Convert each notebook in place (`.ipynb.py`) and archive the original
/// under `archive_root/<project>/`, in parallel.
pub fn prepare_notebooks(notebooks: &[FoundNotebook], archive_root: &Path) -> PrepareSummary {
    let results: Vec<(String, ConversionStatus, Result<PathBuf, NotebookError>)> = notebooks
        .par_iter()
        .map(|nb| {
            let status = convert_single(&nb.path, &in_place_script_path(&nb.path));
            let copy = copy_preserving_mtime(&nb.path, &archive_root.join(&nb.project));
            let name = nb
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            (name, status, copy)
        })
        .collect();

    let mut summary = PrepareSummary::default();
    for (name, status, copy) in results {
        match status {
            ConversionStatus::Success => summary.converted += 1,
            ConversionStatus::Skipped => summary.skipped_up_to_date += 1,
            ConversionStatus::Error(msg) => {
                summary.convert_errors += 1;
                summary
                    .error_messages
                    .push(format!("Conversion failed for {name}: {msg}"));
            }
        }
        match copy {
            Ok(_) => summary.copied += 1,
            Err(err) => {
                summary.copy_errors += 1;
                summary.error_messages.push(format!("Copy failed for {name}: {err}"));
            }
        }
    }
    summary
}
