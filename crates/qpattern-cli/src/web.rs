//! Pattern catalog download (PlanQK Pattern Atlas).
//!
//! HTTP only; response parsing lives in `qpattern_ingest::catalog`.

use anyhow::{anyhow, Context, Result};
use qpattern_ingest::{
    listing_url, parse_pattern_listing, pattern_from_rendered, CatalogError, Pattern, PatternRef,
};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER, USER_AGENT};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

pub const PATTERNS_FILE: &str = "quantum_patterns.json";

/// Pause before each rendered-content request.
pub const POLITENESS_DELAY: Duration = Duration::from_millis(200);

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                                  (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.36";

pub struct CatalogClient {
    client: Client,
    base: String,
}

impl CatalogClient {
    pub fn new(base: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| anyhow!("failed to build http client: {e}"))?;
        Ok(Self {
            client,
            base: base.to_string(),
        })
    }

    fn get_json(&self, url: &str, referer: Option<&str>) -> Result<Value, CatalogError> {
        let mut request = self.client.get(url);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }
        let http_err = |message: String| CatalogError::Http {
            url: url.to_string(),
            message,
        };
        let resp = request.send().map_err(|e| http_err(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(http_err(format!("http status {}", resp.status())));
        }
        resp.json().map_err(|e| http_err(e.to_string()))
    }

    /// Entries of the pattern language's listing.
    pub fn fetch_pattern_summaries(&self, language_id: &str) -> Result<Vec<Value>, CatalogError> {
        let url = listing_url(&self.base, language_id)?;
        let body = self.get_json(url.as_str(), None)?;
        parse_pattern_listing(&body)
    }

    /// Rendered content of every valid entry. Invalid entries, empty content
    /// and failed requests are logged and skipped.
    pub fn fetch_pattern_details(&self, summaries: &[Value], delay: Duration) -> Vec<Pattern> {
        let total = summaries.len();
        let mut patterns = Vec::new();
        for (i, entry) in summaries.iter().enumerate() {
            let Some(pattern_ref) = PatternRef::from_entry(entry) else {
                tracing::warn!(entry = %entry, "skipping invalid pattern entry");
                continue;
            };
            println!("({}/{}) Downloading: {}", i + 1, total, pattern_ref.name);

            let url = match pattern_ref.rendered_content_url(&self.base) {
                Ok(url) => url,
                Err(err) => {
                    tracing::warn!(pattern = %pattern_ref.name, error = %err, "bad pattern URL");
                    continue;
                }
            };
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            match self.get_json(url.as_str(), Some(&pattern_ref.referer())) {
                Ok(body) => match pattern_from_rendered(&pattern_ref.name, &body) {
                    Some(pattern) => patterns.push(pattern),
                    None => {
                        tracing::info!(pattern = %pattern_ref.name, "pattern has no rendered content")
                    }
                },
                Err(err) => {
                    tracing::warn!(pattern = %pattern_ref.name, error = %err, "could not fetch pattern details")
                }
            }
        }
        patterns
    }
}

/// Write the downloaded patterns as pretty JSON.
pub fn save_patterns(patterns: &[Pattern], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(patterns)?)
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_patterns_read_back_with_catalog_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join(PATTERNS_FILE);
        let pattern = Pattern {
            name: "Oracle".into(),
            intent: "Hide a function.".into(),
            alias: "Not available".into(),
            context: "Not available".into(),
            forces: "Not available".into(),
            solution: "Phase kickback.".into(),
            result: "Not available".into(),
        };
        save_patterns(std::slice::from_ref(&pattern), &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"intent\": \"Hide a function.\""));
        let back: Vec<Pattern> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, vec![pattern]);
    }
}
