//! GitHub discovery and acquisition of the downstream project corpus.
//!
//! Discovery talks to the GitHub REST API through the `RepoSource` seam so
//! the filtering and ranking logic runs offline in tests. Acquisition shells
//! out to `git`.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Months, Utc};
use colored::Colorize;
use qpattern_report::{LanguageDistribution, LanguageMeta, LANGUAGE_DIST_PREFIX};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Topic searches for the downstream corpus.
pub const SEARCH_QUERIES: &[&str] = &[
    "topic:quantum-computing language:Python",
    "topic:quantum-machine-learning language:Python",
    "topic:quantum-algorithms language:Python",
];

/// Topic searches for the language census (no language filter).
pub const LANGUAGE_QUERIES: &[&str] = &[
    "topic:quantum-computing",
    "topic:quantum-machine-learning",
    "topic:quantum-algorithms",
];

/// Frameworks that must not be missed by topic searches.
pub const KNOWN_REPOS: &[&str] = &[
    "Qiskit/qiskit",
    "qiskit-community/qiskit-algorithms",
    "qiskit-community/qiskit-machine-learning",
    "qiskit-community/qiskit-nature",
    "qiskit-community/qiskit-finance",
    "qiskit-community/qiskit-optimization",
    "qiskit-community/qiskit-dynamics",
    "qiskit-community/qiskit-experiments",
    "quantumlib/Cirq",
    "quantumlib/ReCirq",
    "quantumlib/Qualtran",
    "quantumlib/OpenFermion",
    "PennyLaneAI/pennylane",
    "rigetti/pyquil",
    "qutip/qutip",
    "qiboteam/qibo",
    "ProjectQ-Framework/ProjectQ",
    "XanaduAI/strawberryfields",
    "eclipse-qrisp/Qrisp",
    "jcmgray/quimb",
    "tencent-quantum-lab/tensorcircuit",
    "Classiq/classiq-library",
    "tensorflow/quantum",
    "mit-han-lab/torchquantum",
    "amazon-braket/amazon-braket-sdk-python",
    "amazon-braket/amazon-braket-examples",
    "amazon-braket/amazon-braket-algorithm-library",
];

/// Search results considered per discovery query.
pub const SEARCH_RESULTS_PER_QUERY: usize = 200;
pub const LANGUAGE_MAX_PER_QUERY: usize = 500;
pub const LANGUAGE_MIN_STARS: u64 = 10;
pub const UNKNOWN_LANGUAGE: &str = "Unknown/Docs";
pub const REPO_LIST_FILE: &str = "filtered_repo_list.txt";

const PER_PAGE: usize = 100;
/// The search API never returns more than this many results per query.
const SEARCH_API_MAX_RESULTS: usize = 1000;

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("GitHub token not found (set GITHUB_TOKEN or GITHUB_PAT)")]
    MissingToken,
    #[error("GitHub API limit hit (403) for {0}")]
    RateLimited(String),
    #[error("GitHub API returned {status} for {url}")]
    Status { status: u16, url: String },
    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),
}

// ============================================================================
// Model
// ============================================================================

/// The fields of a GitHub repository object the pipeline reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoInfo {
    #[serde(default)]
    pub id: u64,
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryCriteria {
    pub min_stars: u64,
    pub min_contributors: u64,
    pub max_inactivity_months: u32,
    pub exclusion_keywords: Vec<String>,
    pub target_result_count: usize,
}

impl Default for DiscoveryCriteria {
    fn default() -> Self {
        Self {
            min_stars: 30,
            min_contributors: 10,
            max_inactivity_months: 12,
            exclusion_keywords: vec!["awesome-list".to_string(), "books".to_string()],
            target_result_count: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// `contributors` is `None` when the count could not be fetched.
    Relevant { contributors: Option<u64> },
    Filtered { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedRepo {
    pub repo: RepoInfo,
    pub contributors: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilteredRepo {
    pub full_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    pub total_candidates: usize,
    pub relevant: Vec<RankedRepo>,
    pub filtered: Vec<FilteredRepo>,
}

// ============================================================================
// Filtering
// ============================================================================

/// Reason when a keyword occurs in `"<full_name> <description>"` or equals a topic.
pub fn check_for_exclusion(repo: &RepoInfo, keywords: &[String]) -> Option<String> {
    let text = format!(
        "{} {}",
        repo.full_name.to_lowercase(),
        repo.description.as_deref().unwrap_or("").to_lowercase()
    );
    let topics: Vec<String> = repo.topics.iter().map(|t| t.to_lowercase()).collect();
    for keyword in keywords {
        if text.contains(keyword.as_str()) {
            return Some(format!("Keyword '{keyword}' in name/description"));
        }
        if topics.iter().any(|t| t == keyword) {
            return Some(format!("Topic '{keyword}'"));
        }
    }
    None
}

/// Apply the quality filters in order. `contributors` is only called once
/// every cheaper filter has passed.
pub fn evaluate_repo(
    repo: &RepoInfo,
    criteria: &DiscoveryCriteria,
    now: DateTime<Utc>,
    contributors: impl FnOnce() -> Result<u64, GithubError>,
) -> Verdict {
    let filtered = |reason: String| Verdict::Filtered { reason };
    if repo.archived {
        return filtered("Archived repository".into());
    }
    if repo.fork {
        return filtered("Is a fork".into());
    }
    if repo.stargazers_count < criteria.min_stars {
        return filtered(format!(
            "Not enough stars ({} < {})",
            repo.stargazers_count, criteria.min_stars
        ));
    }
    let cutoff = now
        .checked_sub_months(Months::new(criteria.max_inactivity_months))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    match repo.pushed_at {
        Some(pushed) if pushed < cutoff => {
            return filtered(format!("Inactive since {}", pushed.date_naive()));
        }
        None => return filtered("Inactive since unknown".into()),
        Some(_) => {}
    }
    if let Some(reason) = check_for_exclusion(repo, &criteria.exclusion_keywords) {
        return filtered(format!("Excluded by {reason}"));
    }
    match contributors() {
        Ok(count) if count < criteria.min_contributors => filtered(format!(
            "Not enough contributors ({} < {})",
            count, criteria.min_contributors
        )),
        Ok(count) => Verdict::Relevant {
            contributors: Some(count),
        },
        Err(GithubError::RateLimited(_)) => {
            let reason = "Could not fetch contributors due to API limits (403)".to_string();
            tracing::warn!(repo = %repo.full_name, "{reason}");
            filtered(reason)
        }
        Err(err) => {
            tracing::debug!(repo = %repo.full_name, error = %err, "contributor count unavailable");
            Verdict::Relevant { contributors: None }
        }
    }
}

// ============================================================================
// API access
// ============================================================================

/// Read access to GitHub repositories.
pub trait RepoSource {
    fn get_repo(&self, full_name: &str) -> Result<RepoInfo, GithubError>;

    /// Visit search results sorted by stars (descending) until `visit`
    /// returns `false` or the results run out.
    fn search_repositories(
        &self,
        query: &str,
        visit: &mut dyn FnMut(RepoInfo) -> bool,
    ) -> Result<(), GithubError>;

    fn contributor_count(&self, full_name: &str) -> Result<u64, GithubError>;
}

pub struct GithubClient {
    client: Client,
    api_base: String,
}

#[derive(Deserialize)]
struct SearchPage {
    #[serde(default)]
    items: Vec<RepoInfo>,
}

impl GithubClient {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base(token, GITHUB_API_BASE)
    }

    pub fn with_base(token: &str, api_base: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("qpattern"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| anyhow!("invalid GitHub token: {e}"))?,
        );
        headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow!("failed to build http client: {e}"))?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response, GithubError> {
        let url = format!("{}{}", self.api_base, path);
        let resp = self.client.get(&url).query(query).send()?;
        let status = resp.status().as_u16();
        match status {
            403 => Err(GithubError::RateLimited(url)),
            _ if !resp.status().is_success() => Err(GithubError::Status { status, url }),
            _ => Ok(resp),
        }
    }
}

impl RepoSource for GithubClient {
    fn get_repo(&self, full_name: &str) -> Result<RepoInfo, GithubError> {
        Ok(self.get(&format!("/repos/{full_name}"), &[])?.json()?)
    }

    fn search_repositories(
        &self,
        query: &str,
        visit: &mut dyn FnMut(RepoInfo) -> bool,
    ) -> Result<(), GithubError> {
        for page in 1..=SEARCH_API_MAX_RESULTS / PER_PAGE {
            let params = [
                ("q", query.to_string()),
                ("sort", "stars".to_string()),
                ("order", "desc".to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ];
            let body: SearchPage = self.get("/search/repositories", &params)?.json()?;
            let last_page = body.items.len() < PER_PAGE;
            for repo in body.items {
                if !visit(repo) {
                    return Ok(());
                }
            }
            if last_page {
                break;
            }
        }
        Ok(())
    }

    fn contributor_count(&self, full_name: &str) -> Result<u64, GithubError> {
        let resp = self.get(
            &format!("/repos/{full_name}/contributors"),
            &[("per_page", "1".to_string()), ("anon", "true".to_string())],
        )?;
        let last = resp
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(last_page_from_link);
        match last {
            Some(n) => Ok(n),
            // Single page: the body holds every contributor.
            None => {
                let body: Vec<Value> = resp.json()?;
                Ok(body.len() as u64)
            }
        }
    }
}

/// `page` of the `rel="last"` entry of a `Link` header.
pub fn last_page_from_link(link: &str) -> Option<u64> {
    link.split(',')
        .find(|part| part.contains("rel=\"last\""))
        .and_then(|part| {
            let start = part.find('<')? + 1;
            let end = part.find('>')?;
            Url::parse(part.get(start..end)?).ok()
        })
        .and_then(|url| {
            url.query_pairs()
                .find(|(k, _)| k == "page")
                .and_then(|(_, v)| v.parse().ok())
        })
}

// ============================================================================
// Discovery
// ============================================================================

/// Allow-list fetch, topic searches, quality filters, then rank by stars.
pub fn discover(
    source: &dyn RepoSource,
    criteria: &DiscoveryCriteria,
    known_repos: &[&str],
    queries: &[&str],
    now: DateTime<Utc>,
) -> DiscoveryResult {
    let mut candidates: Vec<RepoInfo> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for name in known_repos {
        match source.get_repo(name) {
            Ok(repo) => {
                tracing::info!(repo = %repo.full_name, "fetched known repository");
                if seen.insert(repo.full_name.clone()) {
                    candidates.push(repo);
                }
            }
            Err(err) => tracing::warn!(repo = %name, error = %err, "could not fetch known repository"),
        }
    }

    for query in queries {
        let mut taken = 0usize;
        let result = source.search_repositories(query, &mut |repo: RepoInfo| {
            taken += 1;
            if seen.insert(repo.full_name.clone()) {
                candidates.push(repo);
            }
            taken < SEARCH_RESULTS_PER_QUERY
        });
        if let Err(err) = result {
            tracing::warn!(query = %query, error = %err, "search query failed");
        }
    }

    let mut relevant = Vec::new();
    let mut filtered = Vec::new();
    for repo in &candidates {
        match evaluate_repo(repo, criteria, now, || source.contributor_count(&repo.full_name)) {
            Verdict::Relevant { contributors } => relevant.push(RankedRepo {
                repo: repo.clone(),
                contributors,
            }),
            Verdict::Filtered { reason } => {
                if reason != "Is a fork" {
                    tracing::info!(repo = %repo.full_name, reason = %reason, "skipping repository");
                }
                filtered.push(FilteredRepo {
                    full_name: repo.full_name.clone(),
                    reason,
                });
            }
        }
    }

    relevant.sort_by(|a, b| b.repo.stargazers_count.cmp(&a.repo.stargazers_count));
    let limit = criteria.target_result_count;
    if relevant.len() > limit {
        for culled in relevant.split_off(limit) {
            filtered.push(FilteredRepo {
                reason: format!(
                    "Passed filters but not in top {limit} by stars ({} stars)",
                    culled.repo.stargazers_count
                ),
                full_name: culled.repo.full_name,
            });
        }
    }

    DiscoveryResult {
        total_candidates: candidates.len(),
        relevant,
        filtered,
    }
}

/// Rows of `quantum_frameworks_structured_<ts>.json`.
pub fn structured_results(relevant: &[RankedRepo]) -> Vec<Value> {
    relevant
        .iter()
        .enumerate()
        .map(|(i, r)| {
            json!({
                "rank": i + 1,
                "full_name": r.repo.full_name,
                "stargazers_count": r.repo.stargazers_count,
                "contributors_count": r.contributors.map_or(json!("N/A"), |c| json!(c)),
                "forks_count": r.repo.forks_count,
                "pushed_at": r.repo.pushed_at.map(|p| p.to_rfc3339()),
                "description": r.repo.description,
                "html_url": r.repo.html_url,
            })
        })
        .collect()
}

pub fn render_search_summary(result: &DiscoveryResult, generated_on: &str) -> String {
    let rule = "=".repeat(40);
    let mut out = String::new();
    out.push_str("GitHub Quantum Projects Search Summary\n");
    out.push_str(&format!("{rule}\n"));
    out.push_str(&format!("Summary generated on: {generated_on}\n\n"));

    out.push_str("--- Overall Statistics ---\n");
    out.push_str(&format!(
        "Total unique projects found (candidates): {}\n",
        result.total_candidates
    ));
    out.push_str(&format!(
        "Projects filtered out:                    {}\n",
        result.filtered.len()
    ));
    out.push_str(&format!(
        "Final projects considered for analysis:   {}\n\n",
        result.relevant.len()
    ));

    out.push_str("--- Filtered-Out Projects ---\n");
    if result.filtered.is_empty() {
        out.push_str("No projects were filtered out.\n\n");
    } else {
        let longest = result
            .filtered
            .iter()
            .map(|r| r.full_name.chars().count())
            .max()
            .unwrap_or(0);
        let width = longest.max("Repository".len()) + 2;
        let header = format!("{:<width$}Reason for Filtering\n", "Repository");
        out.push_str(&header);
        out.push_str(&format!("{}\n", "-".repeat(header.chars().count() + 20)));
        let mut sorted = result.filtered.clone();
        sorted.sort_by_key(|r| r.full_name.to_lowercase());
        for repo in &sorted {
            out.push_str(&format!("{:<width$}{}\n", repo.full_name, repo.reason));
        }
        out.push('\n');
    }

    out.push_str(&format!(
        "--- Final Considered Projects (Top {}) ---\n",
        result.relevant.len()
    ));
    if result.relevant.is_empty() {
        out.push_str("No projects met the criteria.\n");
    } else {
        for (i, r) in result.relevant.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, r.repo.full_name));
        }
    }
    out.push_str(&format!("\n{rule}\n"));
    out.push_str("End of Summary\n");
    out
}

#[derive(Debug, Clone)]
pub struct DiscoveryOutputs {
    pub structured: PathBuf,
    pub repo_list: PathBuf,
    pub summary: PathBuf,
}

pub fn write_discovery_outputs(
    result: &DiscoveryResult,
    results_dir: &Path,
    timestamp: &str,
    generated_on: &str,
) -> Result<DiscoveryOutputs> {
    fs::create_dir_all(results_dir)
        .with_context(|| format!("Failed to create {}", results_dir.display()))?;

    let structured = results_dir.join(format!("quantum_frameworks_structured_{timestamp}.json"));
    fs::write(
        &structured,
        serde_json::to_string_pretty(&structured_results(&result.relevant))?,
    )?;

    let repo_list = results_dir.join(REPO_LIST_FILE);
    let names: String = result
        .relevant
        .iter()
        .map(|r| format!("{}\n", r.repo.full_name))
        .collect();
    fs::write(&repo_list, names)?;

    let summary = results_dir.join(format!("github_search_summary_{timestamp}.txt"));
    fs::write(&summary, render_search_summary(result, generated_on))?;

    Ok(DiscoveryOutputs {
        structured,
        repo_list,
        summary,
    })
}

// ============================================================================
// Language census
// ============================================================================

/// Primary-language counts of unique, non-fork repositories with at least
/// `min_stars` stars, taking up to `max_per_query` accepted results per query.
/// A 403 stops the remaining queries.
pub fn language_distribution(
    source: &dyn RepoSource,
    queries: &[&str],
    max_per_query: usize,
    min_stars: u64,
) -> (u64, BTreeMap<String, u64>) {
    let mut unique: BTreeMap<u64, Option<String>> = BTreeMap::new();
    for query in queries {
        let mut accepted = 0usize;
        let result = source.search_repositories(query, &mut |repo: RepoInfo| {
            if accepted >= max_per_query {
                return false;
            }
            if repo.fork || repo.stargazers_count < min_stars {
                return true;
            }
            unique.insert(repo.id, repo.language);
            accepted += 1;
            accepted < max_per_query
        });
        tracing::info!(query = %query, accepted, "language census query done");
        match result {
            Ok(()) => {}
            Err(GithubError::RateLimited(_)) => {
                tracing::warn!(query = %query, "rate limit exceeded; stopping census");
                break;
            }
            Err(err) => tracing::warn!(query = %query, error = %err, "census query failed"),
        }
    }

    let mut distribution: BTreeMap<String, u64> = BTreeMap::new();
    for language in unique.values() {
        let name = language
            .clone()
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string());
        *distribution.entry(name).or_default() += 1;
    }
    (unique.len() as u64, distribution)
}

pub fn write_language_distribution(
    total: u64,
    distribution: BTreeMap<String, u64>,
    queries: &[&str],
    results_dir: &Path,
    timestamp: &str,
) -> Result<PathBuf> {
    fs::create_dir_all(results_dir)?;
    let dist = LanguageDistribution {
        meta: LanguageMeta {
            total_repos: total,
            queries: queries.iter().map(|q| q.to_string()).collect(),
            timestamp: timestamp.to_string(),
        },
        distribution,
    };
    let path = results_dir.join(format!("{LANGUAGE_DIST_PREFIX}{timestamp}.json"));
    fs::write(&path, serde_json::to_string_pretty(&dist)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

// ============================================================================
// Acquisition
// ============================================================================

/// Checkout directory name for `owner/name`.
pub fn repo_dir_name(full_name: &str) -> String {
    if full_name == "tensorflow/quantum" {
        return "tensorflow-quantum".to_string();
    }
    full_name
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(full_name)
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Cloned,
    Updated,
    Failed(String),
}

fn run_git(args: &[&str], cwd: Option<&Path>) -> Result<()> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let out = cmd
        .output()
        .with_context(|| format!("failed to run `git {}`", args.join(" ")))?;
    if !out.status.success() {
        return Err(anyhow!(
            "`git {}` failed:\n{}",
            args.join(" "),
            String::from_utf8_lossy(&out.stderr).trim()
        ));
    }
    Ok(())
}

/// `git pull` an existing checkout, otherwise shallow-clone it.
pub fn sync_repo(full_name: &str, target_dir: &Path) -> SyncOutcome {
    let repo_path = target_dir.join(repo_dir_name(full_name));
    let (result, ok) = if repo_path.is_dir() {
        (run_git(&["pull"], Some(&repo_path)), SyncOutcome::Updated)
    } else {
        let url = format!("https://github.com/{full_name}.git");
        let dest = repo_path.to_string_lossy().to_string();
        (
            run_git(&["clone", "--depth", "1", &url, &dest], None),
            SyncOutcome::Cloned,
        )
    };
    match result {
        Ok(()) => ok,
        Err(err) => {
            tracing::warn!(repo = %full_name, error = %err, "repository sync failed");
            SyncOutcome::Failed(err.to_string())
        }
    }
}

/// Non-empty trimmed lines of the repository list.
pub fn read_repo_list(list_file: &Path) -> Result<Vec<String>> {
    if !list_file.is_file() {
        return Err(anyhow!(
            "Repository list file not found at '{}'",
            list_file.display()
        ));
    }
    let text = fs::read_to_string(list_file)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

pub fn clone_all(list_file: &Path, target_dir: &Path) -> Result<Vec<(String, SyncOutcome)>> {
    let repos = read_repo_list(list_file)?;
    fs::create_dir_all(target_dir)
        .with_context(|| format!("Failed to create {}", target_dir.display()))?;
    let mut outcomes = Vec::with_capacity(repos.len());
    for full_name in repos {
        println!("{} {}", "→".yellow(), full_name);
        let outcome = sync_repo(&full_name, target_dir);
        match &outcome {
            SyncOutcome::Cloned => println!("  cloned {}", repo_dir_name(&full_name)),
            SyncOutcome::Updated => println!("  updated {}", repo_dir_name(&full_name)),
            SyncOutcome::Failed(_) => println!(
                "  {} could not sync {}, continuing...",
                "!".red(),
                repo_dir_name(&full_name)
            ),
        }
        outcomes.push((full_name, outcome));
    }
    Ok(outcomes)
}
