//! qpattern CLI
//!
//! Drives the quantum-pattern research pipeline stage by stage:
//! - discover and clone the downstream project corpus (GitHub)
//! - normalize notebooks into analyzable Python scripts
//! - extract documented concepts from the Qiskit, PennyLane and Classiq SDKs
//! - download the pattern catalog
//! - match concepts against the corpus and report pattern adoption

use anyhow::{anyhow, Result};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use qpattern_ingest::{
    api_coverage_report, convert_tree, dedup_by_naming_convention, find_notebooks, format_pattern,
    prepare_notebooks, save_source_snippets, write_concepts_csv, write_concepts_json,
    ClassiqExtractor, Concept, Framework, PennylaneExtractor, QiskitExtractor, CATALOG_BASE_URL,
    QUANTUM_PATTERN_LANGUAGE_ID,
};
use qpattern_match::{
    consolidate, dedup_semantic, load_all_patterns, run_analysis, AnalysisOutcome, AnalysisPaths,
    EmbeddingBackend,
};
use qpattern_report::{
    generate_final_report, generate_language_report, write_concepts_summary,
    write_patterns_report, FinalReportPaths, CONCEPTS_SUMMARY_FILE, PATTERNS_REPORT_FILE,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod github;
mod web;

use config::PipelineConfig;
use github::{GithubClient, GithubError};

/// Consolidated knowledge base written by `kb consolidate`.
const KNOWLEDGE_BASE_FILE: &str = "knowledge_base.csv";

#[derive(Parser)]
#[command(name = "qpattern")]
#[command(
    author,
    version,
    about = "qpattern: quantum software pattern mining and adoption analysis"
)]
struct Cli {
    /// Project root; relative configured paths resolve against it.
    #[arg(long, global = true, env = "QPATTERN_ROOT")]
    root: Option<PathBuf>,

    /// JSON pipeline configuration (missing fields keep their defaults).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search GitHub for candidate projects and filter them by quality.
    Discover {
        /// Run the primary-language census instead of project discovery.
        #[arg(long)]
        languages: bool,
    },

    /// Clone (or pull) every repository named in the filtered list.
    Clone {
        /// Repository list (defaults to `<results>/filtered_repo_list.txt`).
        #[arg(long)]
        list: Option<PathBuf>,
    },

    /// Notebook normalization.
    Notebooks {
        #[command(subcommand)]
        command: NotebookCommands,
    },

    /// Extract documented concepts from a framework SDK.
    Concepts {
        #[command(subcommand)]
        command: ConceptCommands,
    },

    /// Pattern catalog retrieval.
    Patterns {
        #[command(subcommand)]
        command: PatternCommands,
    },

    /// Match concepts against the converted notebooks.
    Analyze {
        /// Embedding backend (`token_hash` or `ollama`); overrides the config.
        #[arg(long)]
        backend: Option<EmbeddingBackend>,

        /// Embedding model (Ollama backend).
        #[arg(long)]
        model: Option<String>,
    },

    /// Reports over the pipeline's artifacts.
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },

    /// Knowledge-base maintenance.
    Kb {
        #[command(subcommand)]
        command: KbCommands,
    },
}

#[derive(Subcommand)]
enum NotebookCommands {
    /// Convert every `.ipynb` under a directory into a mirrored `.py` tree.
    Convert {
        /// Source directory (defaults to the notebook archive).
        #[arg(long)]
        source: Option<PathBuf>,

        /// Destination directory (defaults to the converted-notebooks dir).
        #[arg(long)]
        dest: Option<PathBuf>,
    },

    /// Convert target-project notebooks in place and archive the originals.
    Prepare,
}

#[derive(Subcommand)]
enum ConceptCommands {
    /// Qiskit circuit library (classes and free functions), deduplicated.
    Qiskit {
        /// SDK checkout (defaults to `<target projects>/qiskit`).
        #[arg(long)]
        sdk_root: Option<PathBuf>,

        /// Skip the embedding-based near-duplicate pass.
        #[arg(long)]
        no_semantic_dedup: bool,
    },

    /// PennyLane templates.
    Pennylane {
        /// SDK checkout (defaults to `<target projects>/pennylane`).
        #[arg(long)]
        sdk_root: Option<PathBuf>,
    },

    /// Classiq open-library functions named by the public API.
    Classiq {
        /// `classiq` package directory (defaults to `<target projects>/classiq-library/classiq`).
        #[arg(long)]
        sdk_root: Option<PathBuf>,

        /// Public API names; read from the package's `__all__` when omitted.
        #[arg(long, value_delimiter = ',')]
        api: Vec<String>,
    },
}

#[derive(Subcommand)]
enum PatternCommands {
    /// Download every pattern of the quantum pattern language.
    Download {
        #[arg(long, default_value = CATALOG_BASE_URL)]
        base_url: String,

        #[arg(long, default_value = QUANTUM_PATTERN_LANGUAGE_ID)]
        language_id: String,
    },
}

#[derive(Subcommand)]
enum ReportCommands {
    /// Seven-section adoption report (txt + md) plus LaTeX and CSV tables.
    Final,
    /// Markdown summary of the extracted concepts.
    Concepts,
    /// Markdown rendering of the pattern catalog.
    Patterns,
    /// Language distribution tables from the latest census.
    Languages,
}

#[derive(Subcommand)]
enum KbCommands {
    /// Merge the enriched framework CSVs into one knowledge base.
    Consolidate {
        /// Output CSV (defaults to `<results>/knowledge_base/knowledge_base.csv`).
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = PipelineConfig::load(cli.config.as_deref(), cli.root)?;

    match cli.command {
        Commands::Discover { languages } => {
            if languages {
                cmd_languages_census(&config)
            } else {
                cmd_discover(&config)
            }
        }
        Commands::Clone { list } => cmd_clone(&config, list),
        Commands::Notebooks { command } => match command {
            NotebookCommands::Convert { source, dest } => cmd_convert(&config, source, dest),
            NotebookCommands::Prepare => cmd_prepare(&config),
        },
        Commands::Concepts { command } => cmd_concepts(&config, command),
        Commands::Patterns { command } => match command {
            PatternCommands::Download {
                base_url,
                language_id,
            } => cmd_patterns_download(&config, &base_url, &language_id),
        },
        Commands::Analyze { backend, model } => cmd_analyze(config, backend, model),
        Commands::Report { command } => cmd_report(&config, command),
        Commands::Kb { command } => match command {
            KbCommands::Consolidate { output } => cmd_kb_consolidate(&config, output),
        },
    }
}

// ============================================================================
// Discovery and acquisition
// ============================================================================

fn github_client(config: &PipelineConfig) -> Result<GithubClient> {
    let token = config.github_token.as_deref().ok_or(GithubError::MissingToken)?;
    GithubClient::new(token)
}

fn cmd_discover(config: &PipelineConfig) -> Result<()> {
    let client = github_client(config)?;
    let criteria = &config.discovery;
    println!("{} GitHub quantum projects", "Discovering".green().bold());
    println!(
        "  {} min stars {}, min contributors {}, last push <= {} months",
        "→".yellow(),
        criteria.min_stars,
        criteria.min_contributors,
        criteria.max_inactivity_months
    );

    let result = github::discover(
        &client,
        criteria,
        github::KNOWN_REPOS,
        github::SEARCH_QUERIES,
        Utc::now(),
    );
    println!(
        "  {} {} candidates, {} kept, {} filtered",
        "→".yellow(),
        result.total_candidates,
        result.relevant.len(),
        result.filtered.len()
    );
    for (i, r) in result.relevant.iter().enumerate() {
        let contributors = r
            .contributors
            .map_or_else(|| "N/A".to_string(), |c| c.to_string());
        println!(
            "{}. {} (stars {}, contributors {}, forks {})",
            i + 1,
            r.repo.full_name,
            r.repo.stargazers_count,
            contributors,
            r.repo.forks_count
        );
    }

    let now = Local::now();
    let outputs = github::write_discovery_outputs(
        &result,
        &config.results_dir(),
        &now.format("%Y%m%d_%H%M%S").to_string(),
        &now.format("%Y-%m-%d %H:%M:%S").to_string(),
    )?;
    println!("  {} {}", "→".cyan(), outputs.structured.display());
    println!("  {} {}", "→".cyan(), outputs.repo_list.display());
    println!("  {} {}", "→".cyan(), outputs.summary.display());
    Ok(())
}

fn cmd_languages_census(config: &PipelineConfig) -> Result<()> {
    let client = github_client(config)?;
    println!("{} primary languages", "Counting".green().bold());
    let (total, distribution) = github::language_distribution(
        &client,
        github::LANGUAGE_QUERIES,
        github::LANGUAGE_MAX_PER_QUERY,
        github::LANGUAGE_MIN_STARS,
    );
    println!("  {} {} unique repositories", "→".yellow(), total);
    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let path = github::write_language_distribution(
        total,
        distribution,
        github::LANGUAGE_QUERIES,
        &config.results_dir(),
        &timestamp,
    )?;
    println!("  {} {}", "→".cyan(), path.display());
    Ok(())
}

fn cmd_clone(config: &PipelineConfig, list: Option<PathBuf>) -> Result<()> {
    let list = list.unwrap_or_else(|| config.results_dir().join(github::REPO_LIST_FILE));
    let target = config.target_projects_dir();
    println!(
        "{} repositories from {}",
        "Syncing".green().bold(),
        list.display()
    );
    let outcomes = github::clone_all(&list, &target)?;
    let failed = outcomes
        .iter()
        .filter(|(_, o)| matches!(o, github::SyncOutcome::Failed(_)))
        .count();
    println!(
        "  {} {} repositories synced, {} failed",
        "→".yellow(),
        outcomes.len() - failed,
        failed
    );
    println!("  {} {}", "→".cyan(), target.display());
    Ok(())
}

// ============================================================================
// Notebooks
// ============================================================================

fn cmd_convert(config: &PipelineConfig, source: Option<PathBuf>, dest: Option<PathBuf>) -> Result<()> {
    let source = source.unwrap_or_else(|| config.notebooks_archive_dir());
    let dest = dest.unwrap_or_else(|| config.converted_notebooks_dir());
    println!(
        "{} {} → {}",
        "Converting notebooks".green().bold(),
        source.display(),
        dest.display()
    );
    let summary = convert_tree(&source, &dest)?;
    println!("  {} converted: {}", "→".yellow(), summary.success);
    println!("  {} skipped (up-to-date): {}", "→".yellow(), summary.skipped);
    println!("  {} errors: {}", "→".yellow(), summary.errors.len());
    for (path, message) in &summary.errors {
        println!("    {} {}: {}", "!".red(), path.display(), message);
    }
    Ok(())
}

fn cmd_prepare(config: &PipelineConfig) -> Result<()> {
    let projects = config.target_projects();
    let projects_dir = config.target_projects_dir();
    println!(
        "{} notebooks of {} projects",
        "Preparing".green().bold(),
        projects.len()
    );
    let notebooks = find_notebooks(&projects_dir, &projects, &config.ignored_notebook_paths);
    if notebooks.is_empty() {
        println!("  {} no notebooks found", "→".yellow());
        return Ok(());
    }
    let archive = config.notebooks_archive_dir();
    let summary = prepare_notebooks(&notebooks, &archive);
    println!("  {} notebooks found: {}", "→".yellow(), notebooks.len());
    println!("  {} converted: {}", "→".yellow(), summary.converted);
    println!("  {} skipped (up-to-date): {}", "→".yellow(), summary.skipped_up_to_date);
    println!("  {} conversion errors: {}", "→".yellow(), summary.convert_errors);
    println!("  {} archived: {}", "→".yellow(), summary.copied);
    println!("  {} copy errors: {}", "→".yellow(), summary.copy_errors);
    for message in &summary.error_messages {
        println!("    {} {}", "!".red(), message);
    }
    println!("  {} {}", "→".cyan(), archive.display());
    Ok(())
}

// ============================================================================
// Concepts
// ============================================================================

fn cmd_concepts(config: &PipelineConfig, command: ConceptCommands) -> Result<()> {
    let projects = config.target_projects_dir();
    let (framework, concepts) = match command {
        ConceptCommands::Qiskit {
            sdk_root,
            no_semantic_dedup,
        } => {
            let root = sdk_root.unwrap_or_else(|| projects.join("qiskit"));
            println!("{} Qiskit concepts in {}", "Extracting".green().bold(), root.display());
            let raw = QiskitExtractor::new(root).extract()?;
            println!("  {} {} raw concepts", "→".yellow(), raw.len());
            let concepts = dedup_qiskit(config, raw, !no_semantic_dedup)?;
            (Framework::Qiskit, concepts)
        }
        ConceptCommands::Pennylane { sdk_root } => {
            let root = sdk_root.unwrap_or_else(|| projects.join("pennylane"));
            println!("{} PennyLane concepts in {}", "Extracting".green().bold(), root.display());
            (Framework::Pennylane, PennylaneExtractor::new(root).extract()?)
        }
        ConceptCommands::Classiq { sdk_root, api } => {
            let root = sdk_root.unwrap_or_else(|| projects.join("classiq-library").join("classiq"));
            println!("{} Classiq concepts in {}", "Extracting".green().bold(), root.display());
            let extractor = if api.is_empty() {
                ClassiqExtractor::from_sdk(root)?
            } else {
                ClassiqExtractor::new(root, api.into_iter().collect::<BTreeSet<_>>())
            };
            let concepts = extractor.extract()?;
            let coverage = api_coverage_report(&concepts, &extractor.public_api);
            println!(
                "  {} {} of {} public API functions documented",
                "→".yellow(),
                coverage.found.len(),
                extractor.public_api.len()
            );
            if !coverage.missing.is_empty() {
                println!("    missing: {}", coverage.missing.join(", "));
            }
            (Framework::Classiq, concepts)
        }
    };
    save_concepts(config, framework, &concepts)
}

fn dedup_qiskit(config: &PipelineConfig, raw: Vec<Concept>, semantic: bool) -> Result<Vec<Concept>> {
    let before = raw.len();
    let (concepts, removed) = dedup_by_naming_convention(raw);
    for item in &removed {
        println!("    {} {} ({})", "-".red(), item.removed, item.reason);
    }
    println!(
        "  {} naming convention: {} → {} concepts",
        "→".yellow(),
        before,
        concepts.len()
    );
    if !semantic {
        return Ok(concepts);
    }

    let embedder = config.embedding.build();
    let before = concepts.len();
    let (concepts, removals) = dedup_semantic(concepts, embedder.as_ref(), config.dedup_threshold)?;
    for item in &removals {
        println!("    {} {} (kept {})", "-".red(), item.removed, item.kept);
    }
    println!(
        "  {} semantic similarity ({}): {} → {} concepts",
        "→".yellow(),
        embedder.name(),
        before,
        concepts.len()
    );
    Ok(concepts)
}

fn save_concepts(config: &PipelineConfig, framework: Framework, concepts: &[Concept]) -> Result<()> {
    if concepts.is_empty() {
        println!("  {} no quantum concepts were found", "→".yellow());
        return Ok(());
    }
    let results = config.results_dir();
    let json = results.join(framework.concepts_json_file());
    let csv = results.join(framework.concepts_csv_file());
    let snippets = results.join(framework.snippets_dir());

    let saved = save_source_snippets(concepts, &snippets)?;
    write_concepts_json(concepts, &json)?;
    write_concepts_csv(concepts, &csv, framework.concepts_csv_delimiter())?;

    println!("  {} {} unique concepts", "→".yellow(), concepts.len());
    println!("  {} {} ({} snippets)", "→".cyan(), snippets.display(), saved);
    println!("  {} {}", "→".cyan(), json.display());
    println!("  {} {}", "→".cyan(), csv.display());
    Ok(())
}

// ============================================================================
// Patterns
// ============================================================================

fn cmd_patterns_download(config: &PipelineConfig, base_url: &str, language_id: &str) -> Result<()> {
    println!("{} pattern catalog", "Downloading".green().bold());
    let client = web::CatalogClient::new(base_url)?;
    let summaries = client.fetch_pattern_summaries(language_id)?;
    println!("  {} {} patterns listed", "→".yellow(), summaries.len());
    if summaries.is_empty() {
        return Ok(());
    }
    let patterns = client.fetch_pattern_details(&summaries, web::POLITENESS_DELAY);
    if patterns.is_empty() {
        return Err(anyhow!("No pattern details could be downloaded"));
    }
    for (i, pattern) in patterns.iter().enumerate() {
        println!("{}", format_pattern(i + 1, pattern));
    }
    let out = config.results_dir().join(web::PATTERNS_FILE);
    web::save_patterns(&patterns, &out)?;
    println!(
        "  {} saved {}/{} patterns",
        "→".yellow(),
        patterns.len(),
        summaries.len()
    );
    println!("  {} {}", "→".cyan(), out.display());
    Ok(())
}

// ============================================================================
// Analysis
// ============================================================================

fn cmd_analyze(
    mut config: PipelineConfig,
    backend: Option<EmbeddingBackend>,
    model: Option<String>,
) -> Result<()> {
    if let Some(backend) = backend {
        config.embedding.backend = backend;
    }
    if let Some(model) = model {
        config.embedding.model = Some(model);
    }
    let paths = AnalysisPaths::standard(&config.results_dir(), &config.converted_notebooks_dir());
    let embedder = config.embedding.build();
    println!(
        "{} concepts against {} ({})",
        "Matching".green().bold(),
        paths.notebooks_root.display(),
        embedder.name()
    );

    match run_analysis(&paths, embedder.as_ref(), config.thresholds)? {
        AnalysisOutcome::NoConcepts => {
            println!("  {} no concepts found; nothing to match", "→".yellow());
        }
        AnalysisOutcome::Completed {
            mappings,
            concepts,
            mapped,
            unclassified,
            run,
        } => {
            println!("  {} {} concept-to-pattern mappings loaded", "→".yellow(), mappings);
            println!(
                "  {} Successfully matched {} / {} concepts with a pattern",
                "→".yellow(),
                mapped,
                concepts
            );
            if unclassified > 0 {
                println!(
                    "  {} {} unclassified concepts → {}",
                    "→".yellow(),
                    unclassified,
                    paths.unclassified_csv.display()
                );
            }
            println!(
                "  {} {} files scanned, {} name matches, {} summary matches",
                "→".yellow(),
                run.files_total,
                run.name_matches,
                run.summary_matches
            );
            println!("  {} {}", "→".cyan(), paths.output_csv.display());
        }
    }
    Ok(())
}

// ============================================================================
// Reports
// ============================================================================

fn pattern_files(config: &PipelineConfig) -> Vec<PathBuf> {
    AnalysisPaths::standard(&config.results_dir(), &config.converted_notebooks_dir()).pattern_files
}

fn cmd_report(config: &PipelineConfig, command: ReportCommands) -> Result<()> {
    let results = config.results_dir();
    let docs = config.docs_dir();
    match command {
        ReportCommands::Final => {
            let files = pattern_files(config);
            let all_patterns = load_all_patterns(&files);
            let paths = FinalReportPaths::standard(&results, &docs, files);
            println!("{} final pattern report", "Generating".green().bold());
            let summary = generate_final_report(&paths, &all_patterns)?;
            println!(
                "  {} {} matches, {} catalog patterns",
                "→".yellow(),
                summary.total_matches,
                all_patterns.len()
            );
            println!("  {} {}", "→".cyan(), paths.text_report.display());
            println!("  {} {}", "→".cyan(), paths.markdown_report.display());
            println!(
                "  {} {} ({} tables)",
                "→".cyan(),
                paths.latex_dir.display(),
                summary.latex_tables
            );
            println!(
                "  {} {} ({} tables)",
                "→".cyan(),
                paths.csv_dir.display(),
                summary.csv_tables
            );
        }
        ReportCommands::Concepts => {
            let out = docs.join(CONCEPTS_SUMMARY_FILE);
            write_concepts_summary(&results, &out)?;
            report_written("concept summary", &out);
        }
        ReportCommands::Patterns => {
            let out = docs.join(PATTERNS_REPORT_FILE);
            let count = write_patterns_report(&results.join(web::PATTERNS_FILE), &out)?;
            println!("  {} {} patterns", "→".yellow(), count);
            report_written("pattern report", &out);
        }
        ReportCommands::Languages => {
            let (csv, md) = generate_language_report(&results, &results, Local::now().date_naive())?;
            println!("{} language distribution", "Generated".green().bold());
            println!("  {} {}", "→".cyan(), csv.display());
            println!("  {} {}", "→".cyan(), md.display());
        }
    }
    Ok(())
}

fn report_written(what: &str, path: &Path) {
    println!("{} {}", "Generated".green().bold(), what);
    println!("  {} {}", "→".cyan(), path.display());
}

fn cmd_kb_consolidate(config: &PipelineConfig, output: Option<PathBuf>) -> Result<()> {
    let kb_dir = config.knowledge_base_dir();
    let inputs: Vec<(String, PathBuf)> = Framework::ALL
        .iter()
        .map(|fw| (fw.as_str().to_string(), kb_dir.join(fw.enriched_patterns_file())))
        .collect();
    let output = output.unwrap_or_else(|| kb_dir.join(KNOWLEDGE_BASE_FILE));
    println!("{} knowledge base", "Consolidating".green().bold());
    let rows = consolidate(&inputs, &output)?;
    println!("  {} {} rows", "→".yellow(), rows);
    println!("  {} {}", "→".cyan(), output.display());
    Ok(())
}
