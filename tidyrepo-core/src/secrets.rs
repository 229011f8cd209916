//! Secret exposure scanning.
//!
//! Two independent checks run over the flat file listing: committed
//! sensitive files (presence alone is the violation) and hardcoded
//! credentials in environment and config files. A `.gitignore` hygiene check
//! contributes warnings.

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::accessor::RepositoryAccessor;
use crate::domain::{GitignoreStatus, RepoHandle, SecurityFinding, SecurityReport, base_name};
use crate::error::{TidyError, decode_text};
use crate::fetch::{FetchPolicy, fan_out, fetch_one};
use crate::walker::TreeWalker;

/// Base names that must never be committed.
pub const DANGEROUS_FILES: [&str; 16] = [
    ".env",
    ".env.local",
    ".env.development",
    ".env.production",
    ".env.staging",
    "credentials.json",
    "service-account.json",
    "serviceAccountKey.json",
    "client_secret.json",
    "id_rsa",
    "id_dsa",
    "id_ecdsa",
    "id_ed25519",
    ".htpasswd",
    ".netrc",
    ".pgpass",
];

/// Name suffixes that mark a file as an environment file.
pub const ENV_SUFFIXES: [&str; 6] = [
    ".env",
    ".env.local",
    ".env.development",
    ".env.production",
    ".env.staging",
    ".env.test",
];

/// Values treated as template placeholders. Matched exactly and case-sensitively.
pub const PLACEHOLDER_VALUES: [&str; 7] = [
    "your_key_here",
    "your_api_key_here",
    "YOUR_API_KEY",
    "xxx",
    "xxxx",
    "changeme",
    "placeholder",
];

/// Entries every `.gitignore` is expected to cover.
pub const EXPECTED_GITIGNORE_ENTRIES: [&str; 3] = [".env", "node_modules", "__pycache__"];

const GITIGNORE: &str = ".gitignore";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Target {
    Key,
    Value,
}

struct SecretPattern {
    name: &'static str,
    target: Target,
    pattern: Regex,
}

fn patterns() -> &'static [SecretPattern] {
    static SECRET_PATTERNS: OnceLock<Vec<SecretPattern>> = OnceLock::new();
    SECRET_PATTERNS.get_or_init(|| {
        [
            ("API key", Target::Key, r"(?i)api[_-]?key"),
            ("private key", Target::Key, r"(?i)private[_-]?key"),
            ("access key", Target::Key, r"(?i)access[_-]?key"),
            ("secret", Target::Key, r"(?i)secret"),
            ("password", Target::Key, r"(?i)passw(or)?d"),
            ("token", Target::Key, r"(?i)(auth|access|api|bearer)[_-]?token"),
            ("OpenAI-style key", Target::Value, r"^sk-[A-Za-z0-9_\-]{3,}"),
            ("AWS access key ID", Target::Value, r"^AKIA[0-9A-Z]{16}"),
            ("GitHub token", Target::Value, r"^(ghp_|github_pat_)[A-Za-z0-9_]{10,}"),
            ("Slack token", Target::Value, r"^xox[baprs]-"),
            ("Google API key", Target::Value, r"^AIza[0-9A-Za-z_\-]{10,}"),
            ("bearer token", Target::Value, r"(?i)^bearer\s+\S+"),
        ]
        .into_iter()
        .map(|(name, target, pattern)| SecretPattern {
            name,
            target,
            pattern: Regex::new(pattern).expect("secret pattern is valid"),
        })
        .collect()
    })
}

fn assignment() -> &'static Regex {
    static ASSIGNMENT: OnceLock<Regex> = OnceLock::new();
    ASSIGNMENT.get_or_init(|| {
        Regex::new(r#"^\s*(?:export\s+)?["']?([A-Za-z0-9_.\-]+)["']?\s*[:=]\s*(.*)$"#)
            .expect("assignment pattern is valid")
    })
}

/// A credential-looking assignment found in file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretMatch {
    /// One-based line number.
    pub line: usize,
    /// Name of the pattern that matched.
    pub pattern: &'static str,
}

/// Whether a base name is on the sensitive-file denylist.
pub fn is_dangerous_file(name: &str) -> bool {
    DANGEROUS_FILES.contains(&name)
}

/// Whether a file's content is worth scanning for embedded secrets.
pub fn is_scan_candidate(name: &str) -> bool {
    let lower = name.to_lowercase();
    ENV_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix)) || lower.contains("config")
}

/// Whether an assignment value is empty or a known placeholder.
pub fn is_placeholder(raw_value: &str) -> bool {
    let value = clean_value(raw_value);
    value.is_empty() || PLACEHOLDER_VALUES.contains(&value)
}

/// Prefixes of values that read a secret from the environment at runtime.
const ENV_REFERENCE_PREFIXES: [&str; 7] = [
    "process.env.",
    "import.meta.env.",
    "os.environ",
    "os.getenv(",
    "env(",
    "ENV[",
    "${",
];

/// Whether an assignment value only points at an environment variable.
pub fn is_env_reference(raw_value: &str) -> bool {
    let value = clean_value(raw_value);
    ENV_REFERENCE_PREFIXES
        .iter()
        .any(|prefix| value.starts_with(prefix))
}

fn clean_value(raw: &str) -> &str {
    let value = raw.trim().trim_end_matches([',', ';']).trim();
    let unquoted = ['"', '\''].iter().find_map(|quote| {
        value
            .strip_prefix(*quote)
            .and_then(|inner| inner.strip_suffix(*quote))
    });
    unquoted.unwrap_or(value).trim()
}

/// First credential-looking assignment in `text`, skipping placeholders.
pub fn find_secret(text: &str) -> Option<SecretMatch> {
    for (index, line) in text.lines().enumerate() {
        let Some(captures) = assignment().captures(line) else {
            continue;
        };
        let (Some(key), Some(raw_value)) = (captures.get(1), captures.get(2)) else {
            continue;
        };
        if is_placeholder(raw_value.as_str()) || is_env_reference(raw_value.as_str()) {
            continue;
        }
        let value = clean_value(raw_value.as_str());
        let hit = patterns().iter().find(|pattern| match pattern.target {
            Target::Key => pattern.pattern.is_match(key.as_str()),
            Target::Value => pattern.pattern.is_match(value),
        });
        if let Some(pattern) = hit {
            return Some(SecretMatch {
                line: index + 1,
                pattern: pattern.name,
            });
        }
    }
    None
}

/// Expected entries not covered by a `.gitignore` body.
pub fn missing_gitignore_entries(content: &str) -> Vec<String> {
    let rules: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .map(|line| {
            line.trim_start_matches("**/")
                .trim_start_matches('/')
                .trim_end_matches('/')
        })
        .collect();
    EXPECTED_GITIGNORE_ENTRIES
        .iter()
        .filter(|entry| {
            !rules
                .iter()
                .any(|rule| rule == *entry || rule.strip_suffix('*') == Some(**entry))
        })
        .map(|entry| entry.to_string())
        .collect()
}

/// Scans a repository for committed secrets.
pub struct SecretScanner<A> {
    accessor: Arc<A>,
    walker: TreeWalker<A>,
    policy: FetchPolicy,
    max_files: usize,
}

impl<A> SecretScanner<A>
where
    A: RepositoryAccessor + Send + Sync + 'static,
{
    /// Create a scanner that visits at most `max_files` files.
    pub fn new(accessor: Arc<A>, policy: FetchPolicy, max_files: usize) -> Self {
        Self {
            walker: TreeWalker::new(Arc::clone(&accessor), policy),
            accessor,
            policy,
            max_files,
        }
    }

    /// Run every check. Unreachable files are skipped, never fatal.
    pub async fn scan(&self, repo: &RepoHandle) -> SecurityReport {
        let files = self.walker.list_all_files(repo, self.max_files).await;
        let mut findings: Vec<SecurityFinding> = files
            .iter()
            .filter(|path| is_dangerous_file(base_name(path)))
            .map(|path| {
                SecurityFinding::critical(
                    path.clone(),
                    format!(
                        "Sensitive file committed to the repository: {}",
                        base_name(path)
                    ),
                )
            })
            .collect();

        findings.extend(self.scan_contents(repo, &files).await);

        let gitignore = self.check_gitignore(repo).await;
        match &gitignore {
            GitignoreStatus::Missing => {
                findings.push(SecurityFinding::warning(GITIGNORE, "No .gitignore file found"));
            }
            GitignoreStatus::Incomplete(missing) => {
                findings.push(SecurityFinding::warning(
                    GITIGNORE,
                    format!(".gitignore is missing entries: {}", missing.join(", ")),
                ));
            }
            GitignoreStatus::Complete | GitignoreStatus::Unreachable => {}
        }

        let report = SecurityReport::from_findings(findings, gitignore);
        log::debug!(
            "scanned {} files in {repo}: {} critical, {} warnings",
            files.len(),
            report.critical.len(),
            report.warnings.len()
        );
        report
    }

    async fn scan_contents(&self, repo: &RepoHandle, files: &[String]) -> Vec<SecurityFinding> {
        let candidates: Vec<String> = files
            .iter()
            .filter(|path| is_scan_candidate(base_name(path)))
            .cloned()
            .collect();
        let contents = fan_out(
            &self.accessor,
            repo,
            self.policy,
            candidates.clone(),
            |accessor: &A, repo: &RepoHandle, path: &str| {
                accessor.file_content(repo, path).and_then(decode_text)
            },
        )
        .await;

        candidates
            .into_iter()
            .zip(contents)
            .filter_map(|(path, content)| match content {
                Ok(text) => find_secret(&text).map(|hit| {
                    SecurityFinding::critical(
                        path,
                        format!("Possible hardcoded {} on line {}", hit.pattern, hit.line),
                    )
                }),
                Err(err) => {
                    log::debug!("skipping secret scan of {repo}:{path}: {err}");
                    None
                }
            })
            .collect()
    }

    async fn check_gitignore(&self, repo: &RepoHandle) -> GitignoreStatus {
        let content = fetch_one(
            &self.accessor,
            repo,
            self.policy,
            GITIGNORE,
            |accessor: &A, repo: &RepoHandle, path: &str| {
                accessor.file_content(repo, path).and_then(decode_text)
            },
        )
        .await;

        match content {
            Ok(text) => {
                let missing = missing_gitignore_entries(&text);
                if missing.is_empty() {
                    GitignoreStatus::Complete
                } else {
                    GitignoreStatus::Incomplete(missing)
                }
            }
            Err(TidyError::NotFound(_)) => GitignoreStatus::Missing,
            Err(err) => {
                log::warn!("could not read .gitignore of {repo}: {err}");
                GitignoreStatus::Unreachable
            }
        }
    }
}
