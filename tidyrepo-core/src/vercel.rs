//! Resolves the production deployment URL of a repository's Vercel project.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::cache::TtlCache;
use crate::config::DEFAULT_FETCH_TIMEOUT;
use crate::error::{Result, TidyError};

/// Default Vercel API base URL.
pub const DEFAULT_VERCEL_API_URL: &str = "https://api.vercel.com";

const PROJECTS_KEY: &str = "vercel:projects";

/// Connection settings for the Vercel API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VercelConfig {
    /// API base URL.
    pub api_url: String,
    /// Bearer token.
    pub token: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl VercelConfig {
    /// Settings with the default API URL.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_VERCEL_API_URL.to_string(),
            token: token.into(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Read `VERCEL_API_URL` and `VERCEL_TOKEN`; `None` without a token.
    pub fn from_env(timeout: Duration) -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), timeout)
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F, timeout: Duration) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("VERCEL_TOKEN").filter(|token| !token.trim().is_empty())?;
        let api_url = lookup("VERCEL_API_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_VERCEL_API_URL.to_string());
        Some(Self {
            api_url,
            token,
            timeout,
        })
    }
}

/// A Vercel project as listed by the API.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct VercelProject {
    /// Project id.
    #[serde(default)]
    pub id: Option<String>,
    /// Project name.
    #[serde(default)]
    pub name: String,
    /// Linked source repository.
    #[serde(default)]
    pub link: Option<ProjectLink>,
    /// Deployment targets.
    #[serde(default)]
    pub targets: Option<ProjectTargets>,
}

/// Source repository link of a project.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ProjectLink {
    /// Provider, e.g. `github`.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Linked repository, usually `owner/name`.
    #[serde(default)]
    pub repo: Option<String>,
}

/// Deployment targets of a project.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ProjectTargets {
    /// The production target.
    #[serde(default)]
    pub production: Option<ProductionTarget>,
}

/// The production deployment target.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ProductionTarget {
    /// Domains aliased to production.
    #[serde(default)]
    pub alias: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectsPayload {
    #[serde(default)]
    projects: Vec<VercelProject>,
}

#[derive(Debug, Deserialize)]
struct DeploymentsPayload {
    #[serde(default)]
    deployments: Vec<Deployment>,
}

#[derive(Debug, Deserialize)]
struct Deployment {
    url: Option<String>,
}

/// Values stored in the Vercel cache.
#[derive(Debug, Clone, PartialEq)]
pub enum VercelCacheValue {
    /// The project list.
    Projects(Vec<VercelProject>),
    /// A resolved deployment URL, `None` when no project matched.
    Url(Option<String>),
}

/// First project linked to `repo_name` on GitHub, else named `repo_name`.
///
/// Both comparisons ignore case; the link check is a substring match so
/// `owner/name` links match a bare `name`.
pub fn match_project<'a>(projects: &'a [VercelProject], repo_name: &str) -> Option<&'a VercelProject> {
    let wanted = repo_name.to_lowercase();
    projects.iter().find(|project| {
        let linked = project.link.as_ref().is_some_and(|link| {
            link.kind.as_deref() == Some("github")
                && link
                    .repo
                    .as_deref()
                    .is_some_and(|repo| repo.to_lowercase().contains(&wanted))
        });
        linked || project.name.to_lowercase() == wanted
    })
}

fn project_key(project: &VercelProject) -> &str {
    let linked = project
        .link
        .as_ref()
        .filter(|link| link.kind.as_deref() == Some("github"));
    match linked {
        Some(link) => {
            let repo = link.repo.as_deref().unwrap_or_default();
            repo.rsplit('/').next().unwrap_or(repo)
        }
        None => &project.name,
    }
}

/// Blocking Vercel API client with a TTL cache in front.
pub struct VercelClient {
    config: VercelConfig,
    client: Client,
    cache: Arc<TtlCache<VercelCacheValue>>,
    ttl: Duration,
}

impl VercelClient {
    /// Build the HTTP client; results are cached in `cache` for `ttl`.
    pub fn new(
        config: VercelConfig,
        cache: Arc<TtlCache<VercelCacheValue>>,
        ttl: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| TidyError::Accessor(format!("vercel client setup failed: {err}")))?;
        Ok(Self {
            config,
            client,
            cache,
            ttl,
        })
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{path}", self.config.api_url.trim_end_matches('/'));
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.token)
            .query(query)
            .send()
            .map_err(|err| TidyError::Accessor(format!("vercel request failed: {err}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(TidyError::Accessor(format!(
                "vercel api error ({status}): {body}"
            )));
        }
        response
            .json::<T>()
            .map_err(|err| TidyError::Decode(format!("vercel response decode failed: {err}")))
    }

    /// Every project visible to the token.
    pub fn list_projects(&self) -> Result<Vec<VercelProject>> {
        let cached = self.cache.get_or_insert_with(PROJECTS_KEY, self.ttl, || {
            let payload: ProjectsPayload = self.get_json("/v9/projects", &[])?;
            Ok::<_, TidyError>(VercelCacheValue::Projects(payload.projects))
        })?;
        match cached {
            VercelCacheValue::Projects(projects) => Ok(projects),
            VercelCacheValue::Url(_) => Err(TidyError::Other(format!(
                "cache entry {PROJECTS_KEY} has wrong shape"
            ))),
        }
    }

    /// Production URL of the project for `repo_name`, if one exists.
    pub fn project_url(&self, repo_name: &str) -> Result<Option<String>> {
        let key = format!("vercel:url:{repo_name}");
        let cached = self.cache.get_or_insert_with(&key, self.ttl, || {
            let projects = self.list_projects()?;
            let url = match_project(&projects, repo_name).and_then(|project| self.resolve_url(project));
            Ok::<_, TidyError>(VercelCacheValue::Url(url))
        })?;
        match cached {
            VercelCacheValue::Url(url) => Ok(url),
            VercelCacheValue::Projects(_) => Err(TidyError::Other(format!(
                "cache entry {key} has wrong shape"
            ))),
        }
    }

    /// Production URLs of every project, keyed by lowercase repository name.
    ///
    /// A project linked to GitHub is keyed by the name part of its linked
    /// repository, any other project by its own name.
    pub fn all_project_urls(&self) -> Result<BTreeMap<String, String>> {
        let mut urls = BTreeMap::new();
        for project in self.list_projects()? {
            let key = project_key(&project);
            if key.is_empty() {
                continue;
            }
            if let Some(url) = self.project_url(key)? {
                urls.insert(key.to_lowercase(), url);
            }
        }
        Ok(urls)
    }

    fn resolve_url(&self, project: &VercelProject) -> Option<String> {
        let id = project.id.as_deref()?;
        match self.latest_production_deployment(id) {
            Ok(Some(url)) => return Some(format!("https://{url}")),
            Ok(None) => {}
            Err(err) => log::warn!("could not list deployments of {}: {err}", project.name),
        }
        let alias = project
            .targets
            .as_ref()
            .and_then(|targets| targets.production.as_ref())
            .and_then(|production| production.alias.first());
        if let Some(domain) = alias {
            return Some(format!("https://{domain}"));
        }
        if project.name.is_empty() {
            None
        } else {
            Some(format!("https://{}.vercel.app", project.name))
        }
    }

    fn latest_production_deployment(&self, project_id: &str) -> Result<Option<String>> {
        let payload: DeploymentsPayload = self.get_json(
            "/v6/deployments",
            &[
                ("projectId", project_id),
                ("target", "production"),
                ("limit", "1"),
            ],
        )?;
        Ok(payload
            .deployments
            .into_iter()
            .next()
            .and_then(|deployment| deployment.url)
            .filter(|url| !url.is_empty()))
    }
}
