//! Domain entities for tidyrepo.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TidyError};

/// A mapping of language names to their percentage of total bytes.
pub type LanguageDistribution = BTreeMap<String, f64>;

/// Identifies a remote repository by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoHandle {
    /// Account or organisation that owns the repository.
    pub owner: String,
    /// Repository name.
    pub name: String,
}

impl RepoHandle {
    /// Create a handle from an owner and repository name.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `owner/name` or a GitHub HTTPS/SSH URL.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim().trim_end_matches('/').trim_end_matches(".git");
        let slug = trimmed
            .strip_prefix("https://github.com/")
            .or_else(|| trimmed.strip_prefix("http://github.com/"))
            .or_else(|| trimmed.strip_prefix("git@github.com:"))
            .unwrap_or(trimmed);
        if slug.contains("://") {
            return Err(TidyError::Other(format!(
                "unsupported repository reference: {input}"
            )));
        }
        let mut parts = slug.split('/').filter(|part| !part.is_empty());
        let owner = parts
            .next()
            .ok_or_else(|| TidyError::Other("missing repository owner".to_string()))?;
        let name = parts
            .next()
            .ok_or_else(|| TidyError::Other("missing repository name".to_string()))?;
        Ok(Self::new(owner, name))
    }

    /// The `owner/name` slug.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Repository-level metadata reported by the hosting provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepoMetadata {
    /// Repository name.
    pub name: String,
    /// Free-text description, if set.
    pub description: Option<String>,
    /// Primary language detected by the provider.
    pub language: Option<String>,
    /// License display name, if a license was detected.
    pub license: Option<String>,
    /// Timestamp of the last push.
    pub pushed_at: Option<DateTime<Utc>>,
}

/// One row of the authenticated user's repository listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSummary {
    /// Repository name.
    pub name: String,
    /// `owner/name`.
    pub full_name: String,
    /// Description, empty when unset.
    pub description: String,
    /// Primary language.
    pub language: Option<String>,
    /// Stargazer count.
    pub stars: u64,
    /// Web URL of the repository.
    pub url: String,
    /// Whether a README could be found.
    pub has_readme: bool,
    /// Last update time.
    pub updated_at: Option<DateTime<Utc>>,
    /// Whether the repository is private.
    pub private: bool,
}

/// Kind of an entry in a repository listing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// A regular file (symlinks and submodules are reported as files).
    #[serde(rename = "file")]
    File,
    /// A directory.
    #[serde(rename = "dir")]
    Directory,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the repository root.
    pub path: String,
    /// Base name of the entry.
    pub name: String,
    /// Whether the entry is a file or directory.
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Nested entries, present only for directories the walker descended into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileEntry>>,
}

impl FileEntry {
    /// Create a file entry; the name is derived from the path.
    pub fn file(path: impl Into<String>) -> Self {
        Self::leaf(path.into(), EntryKind::File)
    }

    /// Create a directory entry without children.
    pub fn dir(path: impl Into<String>) -> Self {
        Self::leaf(path.into(), EntryKind::Directory)
    }

    fn leaf(path: String, kind: EntryKind) -> Self {
        let name = base_name(&path).to_string();
        Self {
            path,
            name,
            kind,
            children: None,
        }
    }

    /// Whether the entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Final path segment of a `/`-separated repository path.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Dependency names extracted from one manifest file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySet {
    /// An ordered list of package names.
    FlatList(Vec<String>),
    /// Package names keyed by a format-specific group name.
    GroupedMap(BTreeMap<String, Vec<String>>),
}

impl DependencySet {
    /// Total number of names across all groups.
    pub fn len(&self) -> usize {
        match self {
            Self::FlatList(names) => names.len(),
            Self::GroupedMap(groups) => groups.values().map(Vec::len).sum(),
        }
    }

    /// Whether no names were extracted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Severity of a security finding.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Counts 25 points against the security score.
    Critical,
    /// Counts 10 points against the security score.
    Warning,
}

impl Severity {
    /// Human-readable severity label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
        }
    }
}

/// One reported security concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityFinding {
    /// Severity of the concern.
    pub severity: Severity,
    /// Repository path the finding refers to.
    pub file: String,
    /// Human-readable summary.
    pub message: String,
}

impl SecurityFinding {
    /// Build a critical finding.
    pub fn critical(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Critical,
            file: file.into(),
            message: message.into(),
        }
    }

    /// Build a warning finding.
    pub fn warning(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            file: file.into(),
            message: message.into(),
        }
    }
}

/// Outcome of the `.gitignore` hygiene check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "missing", rename_all = "snake_case")]
pub enum GitignoreStatus {
    /// The file exists and covers every expected entry.
    Complete,
    /// The file exists but lacks the listed entries.
    Incomplete(Vec<String>),
    /// No `.gitignore` at the repository root.
    Missing,
    /// The file could not be fetched.
    Unreachable,
}

/// Aggregated result of a secret scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityReport {
    /// Critical findings in discovery order.
    pub critical: Vec<SecurityFinding>,
    /// Warning findings in discovery order.
    pub warnings: Vec<SecurityFinding>,
    /// Security score, 0-100.
    pub score: u8,
    /// Whether any critical finding was reported.
    pub has_critical: bool,
    /// Result of the `.gitignore` hygiene check.
    pub gitignore: GitignoreStatus,
}

impl SecurityReport {
    /// Split findings by severity and compute the score.
    pub fn from_findings(findings: Vec<SecurityFinding>, gitignore: GitignoreStatus) -> Self {
        let (critical, warnings): (Vec<_>, Vec<_>) = findings
            .into_iter()
            .partition(|finding| finding.severity == Severity::Critical);
        let score = security_score(critical.len(), warnings.len());
        Self {
            has_critical: !critical.is_empty(),
            critical,
            warnings,
            score,
            gitignore,
        }
    }

    /// All findings, critical first.
    pub fn findings(&self) -> impl Iterator<Item = &SecurityFinding> {
        self.critical.iter().chain(self.warnings.iter())
    }
}

/// `max(0, 100 - 25 * critical - 10 * warning)`.
pub fn security_score(critical: usize, warnings: usize) -> u8 {
    let penalty = (critical as u64)
        .saturating_mul(25)
        .saturating_add((warnings as u64).saturating_mul(10));
    100u64.saturating_sub(penalty) as u8
}

/// One line of the health rubric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Check label.
    pub name: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Points contributed when passed.
    pub weight: u8,
}

/// Letter grade derived from a health score.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    /// 90 and above.
    A,
    /// 75 to 89.
    B,
    /// 60 to 74.
    C,
    /// 40 to 59.
    D,
    /// Below 40.
    F,
}

impl Grade {
    /// Grade for a 0-100 score.
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => Grade::A,
            75..=89 => Grade::B,
            60..=74 => Grade::C,
            40..=59 => Grade::D,
            _ => Grade::F,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        f.write_str(label)
    }
}

/// Weighted health score for a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Sum of the weights of passed checks.
    pub score: u8,
    /// Letter grade for `score`.
    pub grade: Grade,
    /// Every rubric check in rubric order.
    pub checks: Vec<HealthCheck>,
    /// Secret scan used by the security check.
    pub security: SecurityReport,
}

/// Structured signals extracted from a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Repository name.
    pub name: String,
    /// Description, empty when unset.
    pub description: String,
    /// Primary language.
    pub language: Option<String>,
    /// Language share of total bytes, one decimal place.
    pub languages: LanguageDistribution,
    /// Topic tags.
    pub topics: Vec<String>,
    /// License display name.
    pub license: Option<String>,
    /// Directory tree down to the configured depth.
    pub structure: Vec<FileEntry>,
    /// Extracted dependencies keyed by manifest filename.
    pub dependencies: BTreeMap<String, DependencySet>,
    /// Whether the README could be fetched.
    pub has_readme: bool,
    /// README text, when available.
    pub existing_readme: Option<String>,
    /// Root files that indicate the project type.
    pub key_files: Vec<String>,
}
