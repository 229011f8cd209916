#![deny(missing_docs)]
//! tidyrepo command-line interface.
//!
//! Analyzes and scores GitHub repositories and resolves their Vercel
//! deployments.

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tidyrepo_core::{
    Analysis, CachedAccessor, DependencySet, EngineConfig, GitHubAccessor, GitHubConfig,
    HealthReport, RepoHandle, RepoSummary, RepositoryAccessor, RepositoryAnalyzer,
    RepositoryLister, TtlCache, VercelClient,
    VercelConfig, format_language_stats, render_analysis_markdown, render_health_markdown,
    render_json,
};
use tokio::runtime::Runtime;

pub(crate) type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Dependencies printed per manifest in text output.
const TEXT_DEPENDENCY_LIMIT: usize = 10;
/// Dependencies printed per group in text output.
const TEXT_GROUP_LIMIT: usize = 5;

#[derive(Parser)]
#[command(name = "tidyrepo", version, about = "tidyrepo CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct OutputArgs {
    /// Output format for report data.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Write the report to a file instead of stdout.
    #[arg(long = "report-output")]
    report_output: Option<PathBuf>,
}

#[derive(ValueEnum, Copy, Clone, Debug, Eq, PartialEq)]
enum OutputFormat {
    Text,
    Json,
    Markdown,
}

#[derive(Subcommand)]
enum Commands {
    /// List the authenticated user's repositories.
    List {
        /// Include forked repositories.
        #[arg(long)]
        include_forks: bool,
        #[command(flatten)]
        report: OutputArgs,
    },
    /// Extract languages, structure, dependencies, and key files.
    Analyze {
        /// Repository as `owner/name` or a GitHub URL.
        repo: String,
        /// Also resolve the Vercel production URL.
        #[arg(long)]
        deployment: bool,
        #[command(flatten)]
        report: OutputArgs,
    },
    /// Compute the weighted health score.
    Score {
        /// Repository as `owner/name` or a GitHub URL.
        repo: String,
        #[command(flatten)]
        report: OutputArgs,
    },
    /// Resolve the Vercel production URL for a repository name.
    Deployment {
        /// Repository or project name.
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        name: Option<String>,
        /// Resolve every project instead of one.
        #[arg(long)]
        all: bool,
        #[command(flatten)]
        report: OutputArgs,
    },
}

#[derive(Debug, Serialize)]
struct AnalysisOutput<'a> {
    repo: String,
    #[serde(flatten)]
    analysis: &'a Analysis,
    #[serde(skip_serializing_if = "Option::is_none")]
    deployment: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DeploymentOutput<'a> {
    name: &'a str,
    url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct RepositoryListOutput<'a> {
    total: usize,
    repositories: &'a [RepoSummary],
}

#[cfg(not(test))]
fn main() -> CliResult<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    // Blocking HTTP clients must be built before the runtime starts and
    // dropped after it stops.
    let github = GitHubAccessor::new(GitHubConfig::from_env(config.fetch_timeout))?;
    let accessor = Arc::new(CachedAccessor::new(
        github.clone(),
        Arc::new(TtlCache::new()),
        config.cache_ttl,
    ));
    let vercel = VercelConfig::from_env(config.fetch_timeout)
        .map(|vercel| VercelClient::new(vercel, Arc::new(TtlCache::new()), config.cache_ttl))
        .transpose()?;
    let analyzer = RepositoryAnalyzer::new(Arc::clone(&accessor), config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = run(cli.command, &runtime, &analyzer, &github, vercel.as_ref());
    drop(runtime);
    drop(analyzer);
    drop(accessor);
    drop(github);
    result
}

#[cfg(test)]
fn main() {}

fn run<A>(
    command: Commands,
    runtime: &Runtime,
    analyzer: &RepositoryAnalyzer<A>,
    lister: &dyn RepositoryLister,
    vercel: Option<&VercelClient>,
) -> CliResult<()>
where
    A: RepositoryAccessor + Send + Sync + 'static,
{
    match command {
        Commands::List {
            include_forks,
            report,
        } => {
            let repos = lister.list_repositories(include_forks)?;
            let contents = match report.format {
                OutputFormat::Text => render_repository_list_text(&repos),
                OutputFormat::Markdown => render_repository_list_markdown(&repos),
                OutputFormat::Json => render_json(&RepositoryListOutput {
                    total: repos.len(),
                    repositories: &repos,
                })?,
            };
            runtime.block_on(emit_output(&report, contents))
        }
        Commands::Analyze {
            repo,
            deployment,
            report,
        } => {
            let repo = RepoHandle::parse(&repo)?;
            let analysis = runtime.block_on(analyzer.analyze_repository(&repo))?;
            let url = if deployment {
                Some(resolve_deployment(vercel, &repo.name)?)
            } else {
                None
            };
            let resolved = url.as_ref().and_then(|url| url.as_deref());
            let contents = match report.format {
                OutputFormat::Text => render_analysis_text(&repo, &analysis, url.as_ref()),
                OutputFormat::Markdown => render_analysis_markdown(&repo, &analysis, resolved),
                OutputFormat::Json => render_json(&AnalysisOutput {
                    repo: repo.slug(),
                    analysis: &analysis,
                    deployment: resolved,
                })?,
            };
            runtime.block_on(emit_output(&report, contents))
        }
        Commands::Score { repo, report } => {
            let repo = RepoHandle::parse(&repo)?;
            let health = runtime.block_on(analyzer.score_repository(&repo))?;
            let contents = match report.format {
                OutputFormat::Text => render_health_text(&repo, &health),
                OutputFormat::Markdown => render_health_markdown(&repo, &health),
                OutputFormat::Json => render_json(&health)?,
            };
            runtime.block_on(emit_output(&report, contents))
        }
        Commands::Deployment {
            all: true, report, ..
        } => {
            let vercel = vercel.ok_or(VERCEL_TOKEN_REQUIRED)?;
            let urls = vercel.all_project_urls()?;
            let contents = match report.format {
                OutputFormat::Text | OutputFormat::Markdown => render_all_deployments_text(&urls),
                OutputFormat::Json => render_json(&urls)?,
            };
            runtime.block_on(emit_output(&report, contents))
        }
        Commands::Deployment { name, report, .. } => {
            let name = name.ok_or("a repository name or --all is required")?;
            let url = resolve_deployment(vercel, &name)?;
            let contents = match report.format {
                OutputFormat::Text | OutputFormat::Markdown => render_deployment_text(url.as_deref()),
                OutputFormat::Json => render_json(&DeploymentOutput {
                    name: &name,
                    url: url.as_deref(),
                })?,
            };
            runtime.block_on(emit_output(&report, contents))
        }
    }
}

const VERCEL_TOKEN_REQUIRED: &str = "VERCEL_TOKEN is required to resolve deployments";

fn resolve_deployment(vercel: Option<&VercelClient>, name: &str) -> CliResult<Option<String>> {
    let vercel = vercel.ok_or(VERCEL_TOKEN_REQUIRED)?;
    Ok(vercel.project_url(name)?)
}

async fn emit_output(output: &OutputArgs, contents: String) -> CliResult<()> {
    if let Some(path) = &output.report_output {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
    } else {
        print!("{contents}");
    }
    Ok(())
}

fn render_deployment_text(url: Option<&str>) -> String {
    match url {
        Some(url) => format!("Vercel URL: {url}\n"),
        None => "Vercel: Not deployed\n".to_string(),
    }
}

fn render_all_deployments_text(urls: &BTreeMap<String, String>) -> String {
    let mut output = String::new();
    for (name, url) in urls {
        let _ = writeln!(output, "{name:<30} {url}");
    }
    let _ = writeln!(output, "\nTotal: {} deployments", urls.len());
    output
}

fn render_repository_list_text(repos: &[RepoSummary]) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "{:<30} {:<15} {:<10} {:<6}",
        "Repository", "Language", "README", "Stars"
    );
    let _ = writeln!(output, "{}", "-".repeat(65));
    for repo in repos {
        let _ = writeln!(
            output,
            "{:<30} {:<15} {:<10} {:<6}",
            repo.name,
            repo.language.as_deref().unwrap_or("N/A"),
            if repo.has_readme { "Yes" } else { "No" },
            repo.stars
        );
    }
    let _ = writeln!(output, "\nTotal: {} repositories", repos.len());
    output
}

fn render_repository_list_markdown(repos: &[RepoSummary]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Repositories\n");
    let _ = writeln!(output, "| Repository | Language | README | Stars |\n|---|---|---|---|");
    for repo in repos {
        let _ = writeln!(
            output,
            "| [{}]({}) | {} | {} | {} |",
            repo.full_name,
            repo.url,
            repo.language.as_deref().unwrap_or("N/A"),
            if repo.has_readme { "yes" } else { "no" },
            repo.stars
        );
    }
    let _ = writeln!(output, "\nTotal: {} repositories", repos.len());
    output
}

fn render_analysis_text(
    repo: &RepoHandle,
    analysis: &Analysis,
    deployment: Option<&Option<String>>,
) -> String {
    let mut output = String::new();
    let rule = "=".repeat(50);
    let _ = writeln!(output, "{rule}");
    let _ = writeln!(output, "Repository: {repo}");
    let description = if analysis.description.is_empty() {
        "None"
    } else {
        analysis.description.as_str()
    };
    let _ = writeln!(output, "Description: {description}");
    let _ = writeln!(
        output,
        "Primary Language: {}",
        analysis.language.as_deref().unwrap_or("Unknown")
    );
    let _ = writeln!(output, "{rule}");

    if analysis.languages.is_empty() {
        let _ = writeln!(output, "Languages: none detected");
    } else {
        let _ = writeln!(output, "Languages:");
        for (language, percent) in format_language_stats(&analysis.languages) {
            let _ = writeln!(output, "- {language}: {percent:.1}%");
        }
    }

    if analysis.key_files.is_empty() {
        let _ = writeln!(output, "Key Files: none");
    } else {
        let _ = writeln!(output, "Key Files:");
        for file in &analysis.key_files {
            let _ = writeln!(output, "- {file}");
        }
    }

    if analysis.dependencies.is_empty() {
        let _ = writeln!(output, "Dependencies: none");
    } else {
        let _ = writeln!(output, "Dependencies:");
        for (filename, set) in &analysis.dependencies {
            let _ = writeln!(output, "  {filename}:");
            match set {
                DependencySet::FlatList(names) => {
                    for name in names.iter().take(TEXT_DEPENDENCY_LIMIT) {
                        let _ = writeln!(output, "    - {name}");
                    }
                }
                DependencySet::GroupedMap(groups) => {
                    for (group, names) in groups.iter().filter(|(_, names)| !names.is_empty()) {
                        let shown: Vec<&str> = names
                            .iter()
                            .take(TEXT_GROUP_LIMIT)
                            .map(String::as_str)
                            .collect();
                        let _ = writeln!(output, "    {group}: {}", shown.join(", "));
                    }
                }
            }
        }
    }

    let _ = writeln!(
        output,
        "README: {}",
        if analysis.has_readme { "present" } else { "missing" }
    );
    if let Some(url) = deployment {
        let _ = write!(output, "{}", render_deployment_text(url.as_deref()));
    }
    output
}

fn render_health_text(repo: &RepoHandle, report: &HealthReport) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Repository: {repo}");
    let _ = writeln!(output, "Score: {}/100 ({})", report.score, report.grade);
    let _ = writeln!(output, "Checks:");
    for check in &report.checks {
        let mark = if check.passed { "x" } else { " " };
        let _ = writeln!(output, "- [{mark}] {} ({})", check.name, check.weight);
    }
    let _ = writeln!(output, "Security score: {}/100", report.security.score);
    let findings: Vec<_> = report.security.findings().collect();
    if findings.is_empty() {
        let _ = writeln!(output, "Findings: none");
    } else {
        let _ = writeln!(output, "Findings:");
        for finding in findings {
            let _ = writeln!(
                output,
                "- [{}] {}: {}",
                finding.severity.as_str(),
                finding.file,
                finding.message
            );
        }
    }
    output
}
