//! Pattern catalog parsing.
//!
//! The catalog service exposes a listing of a pattern language and, per
//! pattern, a `renderedContent` object of HTML sections. HTTP lives in the
//! CLI; this module turns the JSON bodies into `Pattern` records.

use crate::Pattern;
use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

pub const CATALOG_BASE_URL: &str = "https://patternatlas.planqk.de/patternatlas";
pub const CATALOG_UI_BASE_URL: &str = "https://patternatlas.planqk.de/pattern-languages";
pub const QUANTUM_PATTERN_LANGUAGE_ID: &str = "af7780d5-1f97-4536-8da7-4194b093ab1d";

/// Rendered sections, in output order.
pub const PATTERN_SECTIONS: &[&str] = &["Intent", "Alias", "Context", "Forces", "Solution", "Result"];

pub const MISSING_SECTION: &str = "Not available";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unexpected catalog response shape: {0}")]
    UnexpectedShape(String),
    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },
    #[error("invalid catalog URL: {0}")]
    Url(#[from] url::ParseError),
}

/// One entry of the pattern-language listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRef {
    pub id: String,
    pub name: String,
    pub language_id: String,
}

impl PatternRef {
    /// `None` unless `id`, `name` and `patternLanguageId` are all non-empty strings.
    pub fn from_entry(entry: &Value) -> Option<Self> {
        let field = |key: &str| {
            entry
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Some(Self {
            id: field("id")?,
            name: field("name")?,
            language_id: field("patternLanguageId")?,
        })
    }

    pub fn rendered_content_url(&self, base: &str) -> Result<Url, CatalogError> {
        Ok(Url::parse(&format!(
            "{}/patternLanguages/{}/patterns/{}/renderedContent",
            base.trim_end_matches('/'),
            self.language_id,
            self.id
        ))?)
    }

    pub fn referer(&self) -> String {
        format!("{}/{}/{}", CATALOG_UI_BASE_URL, self.language_id, self.id)
    }
}

/// URL of a pattern language's listing.
pub fn listing_url(base: &str, language_id: &str) -> Result<Url, CatalogError> {
    Ok(Url::parse(&format!(
        "{}/patternLanguages/{}/patterns/",
        base.trim_end_matches('/'),
        language_id
    ))?)
}

/// Entries of `_embedded.patternModels`.
pub fn parse_pattern_listing(body: &Value) -> Result<Vec<Value>, CatalogError> {
    body.get("_embedded")
        .and_then(|e| e.get("patternModels"))
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| {
            CatalogError::UnexpectedShape("could not find '_embedded' or 'patternModels'".to_string())
        })
}

/// Build a pattern from a rendered-content body; `None` when it has no content.
pub fn pattern_from_rendered(name: &str, body: &Value) -> Option<Pattern> {
    let content = body.get("renderedContent")?.as_object()?;
    if content.is_empty() {
        return None;
    }
    let section = |key: &str| {
        let raw = content
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(MISSING_SECTION);
        html_to_text(raw)
    };
    Some(Pattern {
        name: name.to_string(),
        intent: section("Intent"),
        alias: section("Alias"),
        context: section("Context"),
        forces: section("Forces"),
        solution: section("Solution"),
        result: section("Result"),
    })
}

/// Visible text of an HTML fragment: text nodes trimmed and joined by one space.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Greedy word wrap with a fixed indent on every line.
pub fn wrap_indented(text: &str, width: usize, indent: &str) -> String {
    let mut lines = Vec::new();
    let mut current = String::from(indent);
    for word in text.split_whitespace() {
        let fits = current.len() == indent.len() || current.len() + 1 + word.len() <= width;
        if !fits {
            lines.push(std::mem::replace(&mut current, String::from(indent)));
        }
        if current.len() > indent.len() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if current.len() > indent.len() {
        lines.push(current);
    }
    lines.join("\n")
}

/// Console rendering of one downloaded pattern.
pub fn format_pattern(index: usize, pattern: &Pattern) -> String {
    let mut out = format!("--- {}. {} ---\n", index, pattern.name);
    let fields = [
        ("Intent", &pattern.intent),
        ("Alias", &pattern.alias),
        ("Context", &pattern.context),
        ("Forces", &pattern.forces),
        ("Solution", &pattern.solution),
        ("Result", &pattern.result),
    ];
    for (label, value) in fields {
        out.push_str(&format!("  {}:\n{}\n", label, wrap_indented(value, 100, "    ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn listing_requires_embedded_pattern_models() {
        let ok = json!({"_embedded": {"patternModels": [{"id": "1"}]}});
        assert_eq!(parse_pattern_listing(&ok).unwrap().len(), 1);
        let bad = json!({"patterns": []});
        assert!(matches!(
            parse_pattern_listing(&bad),
            Err(CatalogError::UnexpectedShape(_))
        ));
    }

    #[test]
    fn pattern_ref_needs_all_fields() {
        let entry = json!({"id": "p1", "name": "Oracle", "patternLanguageId": "lang"});
        let r = PatternRef::from_entry(&entry).unwrap();
        assert_eq!(
            r.rendered_content_url(CATALOG_BASE_URL).unwrap().as_str(),
            "https://patternatlas.planqk.de/patternatlas/patternLanguages/lang/patterns/p1/renderedContent"
        );
        assert!(PatternRef::from_entry(&json!({"id": "p1", "name": "Oracle"})).is_none());
    }

    #[test]
    fn rendered_sections_become_text() {
        let body = json!({"renderedContent": {
            "Intent": "<p>Mark  <b>solutions</b></p>\n<p>fast.</p>",
            "Alias": "<p>—</p>"
        }});
        let pattern = pattern_from_rendered("Oracle", &body).unwrap();
        assert_eq!(pattern.intent, "Mark solutions fast.");
        assert_eq!(pattern.alias, "—");
        assert_eq!(pattern.solution, MISSING_SECTION);
        assert!(pattern_from_rendered("Empty", &json!({"renderedContent": {}})).is_none());
    }

    #[test]
    fn wrap_respects_width_and_indent() {
        let wrapped = wrap_indented("aaa bbb ccc", 11, "    ");
        assert_eq!(wrapped, "    aaa bbb\n    ccc");
    }
}
