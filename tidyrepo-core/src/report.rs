//! Report formatting utilities for tidyrepo outputs.

use std::fmt::Write;

use serde::Serialize;

use crate::domain::{
    Analysis, DependencySet, FileEntry, GitignoreStatus, HealthReport, LanguageDistribution,
    RepoHandle, SecurityFinding, SecurityReport,
};

/// Dependencies listed per manifest before the rest are summarised.
const MAX_LISTED_DEPENDENCIES: usize = 10;

/// Render any serializable report payload as JSON.
pub fn render_json<T: Serialize + ?Sized>(payload: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(payload)
}

/// Format language stats sorted by percentage, largest first.
pub fn format_language_stats(stats: &LanguageDistribution) -> Vec<(String, f64)> {
    let mut items: Vec<(String, f64)> = stats.iter().map(|(k, v)| (k.clone(), *v)).collect();
    items.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    items
}

/// Render an analysis as Markdown, with the deployment URL when known.
pub fn render_analysis_markdown(
    repo: &RepoHandle,
    analysis: &Analysis,
    deployment: Option<&str>,
) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Repository Analysis: {repo}\n");
    let description = if analysis.description.is_empty() {
        "None"
    } else {
        analysis.description.as_str()
    };
    let _ = writeln!(output, "- Description: {description}");
    let _ = writeln!(
        output,
        "- Primary language: {}",
        analysis.language.as_deref().unwrap_or("Unknown")
    );
    let _ = writeln!(
        output,
        "- License: {}",
        analysis.license.as_deref().unwrap_or("None")
    );
    let topics = if analysis.topics.is_empty() {
        "None".to_string()
    } else {
        analysis.topics.join(", ")
    };
    let _ = writeln!(output, "- Topics: {topics}");
    let _ = writeln!(
        output,
        "- README: {}",
        if analysis.has_readme { "present" } else { "missing" }
    );
    if let Some(url) = deployment {
        let _ = writeln!(output, "- Deployment: {url}");
    }
    let _ = writeln!(output);

    append_language_stats(&mut output, &analysis.languages);
    append_list(
        &mut output,
        "Key files",
        &analysis.key_files,
        "No key files found.",
    );
    append_dependencies(&mut output, analysis);
    append_structure(&mut output, &analysis.structure);
    output
}

/// Render a health report as Markdown.
pub fn render_health_markdown(repo: &RepoHandle, report: &HealthReport) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Repository Health: {repo}\n");
    let _ = writeln!(
        output,
        "- Score: {}/100\n- Grade: {}\n",
        report.score, report.grade
    );

    let _ = writeln!(output, "### Checks");
    let _ = writeln!(output, "| Check | Weight | Result |\n|---|---|---|");
    for check in &report.checks {
        let result = if check.passed { "pass" } else { "fail" };
        let _ = writeln!(output, "| {} | {} | {result} |", check.name, check.weight);
    }
    let _ = writeln!(output);

    append_security(&mut output, &report.security);
    output
}

fn append_language_stats(output: &mut String, stats: &LanguageDistribution) {
    if stats.is_empty() {
        let _ = writeln!(output, "### Languages\nNo languages detected.\n");
        return;
    }
    let _ = writeln!(output, "### Languages");
    for (language, percent) in format_language_stats(stats) {
        let _ = writeln!(output, "- {language}: {percent:.1}%");
    }
    let _ = writeln!(output);
}

fn append_dependencies(output: &mut String, analysis: &Analysis) {
    if analysis.dependencies.is_empty() {
        let _ = writeln!(output, "### Dependencies\nNo manifests found.\n");
        return;
    }
    let _ = writeln!(output, "### Dependencies");
    for (filename, set) in &analysis.dependencies {
        let _ = writeln!(output, "- `{filename}`");
        match set {
            DependencySet::FlatList(names) => {
                let _ = writeln!(output, "  - {}", summarise(names));
            }
            DependencySet::GroupedMap(groups) => {
                for (group, names) in groups.iter().filter(|(_, names)| !names.is_empty()) {
                    let _ = writeln!(output, "  - {group}: {}", summarise(names));
                }
            }
        }
    }
    let _ = writeln!(output);
}

fn summarise(names: &[String]) -> String {
    let shown = names
        .iter()
        .take(MAX_LISTED_DEPENDENCIES)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    match names.len().saturating_sub(MAX_LISTED_DEPENDENCIES) {
        0 => shown,
        rest => format!("{shown} (+{rest} more)"),
    }
}

fn append_structure(output: &mut String, structure: &[FileEntry]) {
    if structure.is_empty() {
        let _ = writeln!(output, "### Structure\nStructure unavailable.\n");
        return;
    }
    let _ = writeln!(output, "### Structure\n```text");
    append_entries(output, structure, 0);
    let _ = writeln!(output, "```\n");
}

fn append_entries(output: &mut String, entries: &[FileEntry], indent: usize) {
    for entry in entries {
        let suffix = if entry.is_dir() { "/" } else { "" };
        let _ = writeln!(output, "{:width$}{}{suffix}", "", entry.name, width = indent * 2);
        if let Some(children) = &entry.children {
            append_entries(output, children, indent + 1);
        }
    }
}

fn append_security(output: &mut String, security: &SecurityReport) {
    let _ = writeln!(output, "### Security\n- Score: {}/100", security.score);
    let gitignore = match &security.gitignore {
        GitignoreStatus::Complete => "complete".to_string(),
        GitignoreStatus::Incomplete(missing) => format!("missing {}", missing.join(", ")),
        GitignoreStatus::Missing => "not found".to_string(),
        GitignoreStatus::Unreachable => "could not be read".to_string(),
    };
    let _ = writeln!(output, "- .gitignore: {gitignore}\n");
    let findings: Vec<&SecurityFinding> = security.findings().collect();
    if findings.is_empty() {
        let _ = writeln!(output, "No findings.\n");
        return;
    }
    for finding in findings {
        let _ = writeln!(
            output,
            "- [{}] `{}`: {}",
            finding.severity.as_str(),
            finding.file,
            finding.message
        );
    }
    let _ = writeln!(output);
}

fn append_list(output: &mut String, title: &str, items: &[String], empty_message: &str) {
    if items.is_empty() {
        let _ = writeln!(output, "### {title}\n{empty_message}\n");
        return;
    }
    let _ = writeln!(output, "### {title}");
    for item in items {
        let _ = writeln!(output, "- {item}");
    }
    let _ = writeln!(output);
}
