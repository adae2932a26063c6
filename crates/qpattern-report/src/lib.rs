//! Reporting for the qpattern pipeline
//!
//! - `matches` + `stats`: load the match CSV and aggregate it
//! - `table`: one table model rendered as text, Markdown, LaTeX or CSV
//! - `final_report`: the seven-section pattern adoption report
//! - `concepts_report`, `patterns_report`, `languages`: standalone Markdown summaries

use std::path::PathBuf;
use thiserror::Error;

pub mod concepts_report;
pub mod final_report;
pub mod languages;
pub mod matches;
pub mod patterns_report;
pub mod stats;
pub mod table;

pub use concepts_report::*;
pub use final_report::*;
pub use languages::*;
pub use matches::*;
pub use patterns_report::*;
pub use stats::*;
pub use table::*;

/// Failures reading the match CSV.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Input file not found at '{}'. Run the analysis first.", .0.display())]
    NotFound(PathBuf),

    #[error("Input file '{}' is empty. No matches to report.", .0.display())]
    Empty(PathBuf),

    #[error("Column '{column}' missing from '{}'", .path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
