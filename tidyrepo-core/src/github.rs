//! GitHub REST implementation of [`RepositoryAccessor`].

use std::collections::BTreeMap;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::accessor::{RepositoryAccessor, RepositoryLister};
use crate::config::DEFAULT_FETCH_TIMEOUT;
use crate::domain::{EntryKind, FileEntry, RepoHandle, RepoMetadata, RepoSummary};
use crate::error::{Result, TidyError, decode_text};

/// Default GitHub API base URL.
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
/// Default `User-Agent` header sent to GitHub.
pub const DEFAULT_GITHUB_USER_AGENT: &str = "tidyrepo";

const REPOS_PER_PAGE: usize = 100;

/// Connection settings for the GitHub API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubConfig {
    /// API base URL.
    pub api_url: String,
    /// Bearer token; anonymous requests when unset.
    pub token: Option<String>,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_GITHUB_API_URL.to_string(),
            token: None,
            user_agent: DEFAULT_GITHUB_USER_AGENT.to_string(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl GitHubConfig {
    /// Read `GITHUB_API_URL`, `GITHUB_TOKEN`, and `GITHUB_USER_AGENT`.
    pub fn from_env(timeout: Duration) -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), timeout)
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F, timeout: Duration) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            api_url: non_empty("GITHUB_API_URL")
                .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
            token: non_empty("GITHUB_TOKEN"),
            user_agent: non_empty("GITHUB_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_GITHUB_USER_AGENT.to_string()),
            timeout,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RepoPayload {
    name: String,
    description: Option<String>,
    language: Option<String>,
    license: Option<LicensePayload>,
    pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct UserRepoPayload {
    name: String,
    full_name: String,
    owner: OwnerPayload,
    description: Option<String>,
    language: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    html_url: String,
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    fork: bool,
    #[serde(default)]
    private: bool,
}

#[derive(Debug, Deserialize)]
struct OwnerPayload {
    login: String,
}

#[derive(Debug, Deserialize)]
struct LicensePayload {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TopicsPayload {
    #[serde(default)]
    names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    path: String,
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct FilePayload {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsPayload {
    Listing(Vec<ContentEntry>),
    File(FilePayload),
}

/// Blocking GitHub REST client.
///
/// Build it outside any async runtime; the engine calls it from the
/// blocking pool.
#[derive(Debug, Clone)]
pub struct GitHubAccessor {
    config: GitHubConfig,
    client: Client,
}

impl GitHubAccessor {
    /// Build the HTTP client for `config`.
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()
            .map_err(|err| TidyError::Accessor(format!("github client setup failed: {err}")))?;
        Ok(Self { config, client })
    }

    fn repo_url(&self, repo: &RepoHandle, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}{suffix}",
            self.config.api_url.trim_end_matches('/'),
            urlencoding::encode(&repo.owner),
            urlencoding::encode(&repo.name)
        )
    }

    fn contents_url(&self, repo: &RepoHandle, path: &str) -> String {
        let encoded = encode_path(path);
        if encoded.is_empty() {
            self.repo_url(repo, "/contents")
        } else {
            self.repo_url(repo, &format!("/contents/{encoded}"))
        }
    }

    fn get_json<T: DeserializeOwned>(&self, url: String, what: &str) -> Result<T> {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = self.config.token.as_ref() {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .map_err(|err| TidyError::Accessor(format!("github request failed: {err}")))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TidyError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TidyError::Accessor(format!(
                "github api error ({status}): {body}"
            )));
        }
        response.json::<T>().map_err(|err| {
            TidyError::Decode(format!("github response for {what} could not be read: {err}"))
        })
    }

    fn contents(&self, repo: &RepoHandle, path: &str) -> Result<ContentsPayload> {
        self.get_json(self.contents_url(repo, path), &format!("{repo}:{path}"))
    }
}

impl GitHubAccessor {
    fn has_readme(&self, repo: &RepoHandle) -> bool {
        match self.readme(repo) {
            Ok(_) | Err(TidyError::Decode(_)) => true,
            Err(TidyError::NotFound(_)) => false,
            Err(err) => {
                log::warn!("could not check README of {repo}: {err}");
                false
            }
        }
    }
}

impl RepositoryLister for GitHubAccessor {
    fn list_repositories(&self, include_forks: bool) -> Result<Vec<RepoSummary>> {
        let base = self.config.api_url.trim_end_matches('/');
        let mut repos = Vec::new();
        for page in 1.. {
            let url = format!("{base}/user/repos?per_page={REPOS_PER_PAGE}&page={page}");
            let batch: Vec<UserRepoPayload> = self.get_json(url, "user repositories")?;
            let last_page = batch.len() < REPOS_PER_PAGE;
            for payload in batch {
                if payload.fork && !include_forks {
                    continue;
                }
                let handle = RepoHandle::new(payload.owner.login, payload.name.clone());
                repos.push(RepoSummary {
                    has_readme: self.has_readme(&handle),
                    name: payload.name,
                    full_name: payload.full_name,
                    description: payload.description.unwrap_or_default(),
                    language: payload.language,
                    stars: payload.stargazers_count,
                    url: payload.html_url,
                    updated_at: payload.updated_at,
                    private: payload.private,
                });
            }
            if last_page {
                break;
            }
        }
        repos.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(repos)
    }
}

/// Percent-encode each `/`-separated segment of a repository path.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Decode GitHub's line-wrapped base64 `content` field.
pub fn decode_base64_content(content: &str) -> Result<Vec<u8>> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|err| TidyError::Decode(format!("invalid base64 content: {err}")))
}

impl RepositoryAccessor for GitHubAccessor {
    fn metadata(&self, repo: &RepoHandle) -> Result<RepoMetadata> {
        let payload: RepoPayload = self.get_json(self.repo_url(repo, ""), &repo.slug())?;
        Ok(RepoMetadata {
            name: payload.name,
            description: payload.description,
            language: payload.language,
            license: payload.license.and_then(|license| license.name),
            pushed_at: payload.pushed_at,
        })
    }

    fn topics(&self, repo: &RepoHandle) -> Result<Vec<String>> {
        let payload: TopicsPayload =
            self.get_json(self.repo_url(repo, "/topics"), &format!("{repo} topics"))?;
        Ok(payload.names)
    }

    fn language_bytes(&self, repo: &RepoHandle) -> Result<BTreeMap<String, u64>> {
        self.get_json(
            self.repo_url(repo, "/languages"),
            &format!("{repo} languages"),
        )
    }

    fn readme(&self, repo: &RepoHandle) -> Result<String> {
        let payload: FilePayload =
            self.get_json(self.repo_url(repo, "/readme"), &format!("{repo} README"))?;
        let content = payload
            .content
            .ok_or_else(|| TidyError::Decode(format!("{repo} README has no content")))?;
        decode_text(decode_base64_content(&content)?)
    }

    fn list_directory(&self, repo: &RepoHandle, path: &str) -> Result<Vec<FileEntry>> {
        match self.contents(repo, path)? {
            ContentsPayload::Listing(entries) => Ok(entries
                .into_iter()
                .map(|entry| FileEntry {
                    path: entry.path,
                    name: entry.name,
                    kind: if entry.kind == "dir" {
                        EntryKind::Directory
                    } else {
                        EntryKind::File
                    },
                    children: None,
                })
                .collect()),
            ContentsPayload::File(_) => Err(TidyError::NotFound(format!(
                "{repo}:{path} is not a directory"
            ))),
        }
    }

    fn file_content(&self, repo: &RepoHandle, path: &str) -> Result<Vec<u8>> {
        match self.contents(repo, path)? {
            ContentsPayload::File(FilePayload {
                content: Some(content),
            }) => decode_base64_content(&content),
            ContentsPayload::File(FilePayload { content: None }) => Err(TidyError::Decode(
                format!("{repo}:{path} has no inline content"),
            )),
            ContentsPayload::Listing(_) => {
                Err(TidyError::NotFound(format!("{repo}:{path} is a directory")))
            }
        }
    }
}
