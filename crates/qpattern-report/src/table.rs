//! A small column-oriented table with text, Markdown, LaTeX and CSV renderers.

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Int(usize),
    /// Rendered with four decimals.
    Float(f64),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    fn is_numeric(&self) -> bool {
        !matches!(self, Cell::Text(_))
    }

    pub fn render(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Int(n) => n.to_string(),
            Cell::Float(x) => format!("{x:.4}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Same rows under different column headers.
    pub fn renamed(&self, columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: self.rows.clone(),
        }
    }

    /// A column is numeric when it has rows and every cell is a number.
    fn numeric_columns(&self) -> Vec<bool> {
        (0..self.columns.len())
            .map(|i| {
                !self.rows.is_empty()
                    && self
                        .rows
                        .iter()
                        .all(|row| row.get(i).is_some_and(Cell::is_numeric))
            })
            .collect()
    }

    fn rendered_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                (0..self.columns.len())
                    .map(|i| row.get(i).map(Cell::render).unwrap_or_default())
                    .collect()
            })
            .collect()
    }

    /// Fixed-width columns separated by two spaces; numbers right-aligned.
    pub fn to_text(&self) -> String {
        let rows = self.rendered_rows();
        let numeric = self.numeric_columns();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, h)| {
                rows.iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(h.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let line = |cells: &[String]| -> String {
            cells
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    if numeric[i] {
                        format!("{c:>w$}", w = widths[i])
                    } else {
                        format!("{c:<w$}", w = widths[i])
                    }
                })
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let mut out = line(&self.columns);
        for row in &rows {
            out.push('\n');
            out.push_str(&line(row));
        }
        out
    }

    /// Pipe table; `|` inside cells is escaped.
    pub fn to_markdown(&self) -> String {
        let numeric = self.numeric_columns();
        let esc = |s: &str| s.replace('|', "\\|");
        let mut md = String::new();
        let _ = writeln!(
            md,
            "| {} |",
            self.columns.iter().map(|c| esc(c)).collect::<Vec<_>>().join(" | ")
        );
        let _ = writeln!(
            md,
            "|{}|",
            numeric
                .iter()
                .map(|&n| if n { "---:" } else { ":---" })
                .collect::<Vec<_>>()
                .join("|")
        );
        for row in self.rendered_rows() {
            let _ = writeln!(
                md,
                "| {} |",
                row.iter().map(|c| esc(c)).collect::<Vec<_>>().join(" | ")
            );
        }
        md.pop();
        md
    }

    /// booktabs `tabular*` float. `texttt_cols` names columns set in monospace.
    pub fn to_latex(&self, caption: &str, label: &str, texttt_cols: &[&str]) -> String {
        let numeric = self.numeric_columns();
        let aligns: Vec<&str> = numeric.iter().map(|&n| if n { "r" } else { "l" }).collect();
        let col_spec = match aligns.split_last() {
            Some((last, rest)) if !rest.is_empty() => {
                format!("{} @{{\\extracolsep{{\\fill}}}} {}", rest.join(" "), last)
            }
            Some((last, _)) => last.to_string(),
            None => String::new(),
        };

        let header = self
            .columns
            .iter()
            .map(|c| format!("\\textbf{{{}}}", escape_latex(c)))
            .collect::<Vec<_>>()
            .join(" & ");
        let body = self
            .rendered_rows()
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(i, cell)| {
                        let escaped = escape_latex(cell);
                        if texttt_cols.contains(&self.columns[i].as_str()) {
                            format!("\\texttt{{{escaped}}}")
                        } else {
                            escaped
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" & ")
                    + " \\\\"
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "\\begin{{table}}[ht]\n\
             \\centering\n\
             \\caption{{{caption}}}\n\
             \\label{{tab:{label}}}\n\
             \\begin{{tabular*}}{{\\columnwidth}}{{@{{}} {col_spec} @{{}}}}\n\
             \\toprule\n\
             {header} \\\\\n\
             \\midrule\n\
             {body}\n\
             \\bottomrule\n\
             \\end{{tabular*}}\n\
             \\end{{table}}\n"
        )
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        writer.write_record(&self.columns)?;
        for row in self.rendered_rows() {
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Escape the characters LaTeX treats specially in running text.
pub fn escape_latex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\textbackslash{}"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            '&' => out.push_str("\\&"),
            '%' => out.push_str("\\%"),
            '$' => out.push_str("\\$"),
            '#' => out.push_str("\\#"),
            '_' => out.push_str("\\_"),
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut t = Table::new(&["pattern", "count"]);
        t.push(vec![Cell::text("Oracle"), Cell::Int(12)]);
        t.push(vec![Cell::text("Uniform Superposition"), Cell::Int(3)]);
        t
    }

    #[test]
    fn text_aligns_numbers_right() {
        assert_eq!(
            sample().to_text(),
            "pattern                count\nOracle                    12\nUniform Superposition      3"
        );
    }

    #[test]
    fn markdown_marks_numeric_alignment() {
        let md = sample().to_markdown();
        assert!(md.starts_with("| pattern | count |\n|:---|---:|\n| Oracle | 12 |"));
        assert!(!md.ends_with('\n'));
    }

    #[test]
    fn latex_escapes_and_uses_booktabs() {
        let mut t = Table::new(&["Concept", "Matches"]);
        t.push(vec![Cell::text("...grover_op"), Cell::Int(2)]);
        let tex = t.to_latex("Top & bottom", "top", &["Concept"]);
        assert!(tex.contains("\\begin{tabular*}{\\columnwidth}{@{} l @{\\extracolsep{\\fill}} r @{}}"));
        assert!(tex.contains("\\textbf{Concept} & \\textbf{Matches} \\\\\n\\midrule"));
        assert!(tex.contains("\\texttt{...grover\\_op} & 2 \\\\"));
        assert!(tex.contains("\\caption{Top & bottom}"));
        assert!(tex.ends_with("\\end{table}\n"));
    }

    #[test]
    fn escape_covers_special_characters() {
        assert_eq!(escape_latex("a_b%c"), "a\\_b\\%c");
        assert_eq!(escape_latex("~^\\"), "\\textasciitilde{}\\textasciicircum{}\\textbackslash{}");
        assert_eq!(escape_latex("{$#&}"), "\\{\\$\\#\\&\\}");
    }

    #[test]
    fn floats_render_with_four_decimals() {
        assert_eq!(Cell::Float(0.91234567).render(), "0.9123");
        assert_eq!(Cell::Float(1.0).render(), "1.0000");
    }
}
