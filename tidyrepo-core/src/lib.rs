#![deny(missing_docs)]
//! tidyrepo core library.
//!
//! This crate contains the domain types and the repository intelligence
//! engine: tree traversal, manifest parsing, secret scanning, and health
//! scoring over any [`RepositoryAccessor`].

pub mod accessor;
pub mod analyzer;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
mod fetch;
pub mod github;
pub mod health;
pub mod manifests;
pub mod report;
pub mod secrets;
pub mod vercel;
pub mod walker;

#[cfg(test)]
mod test_support;

pub use accessor::{RepositoryAccessor, RepositoryLister};
pub use analyzer::RepositoryAnalyzer;
pub use cache::{CachedAccessor, CachedValue, TtlCache};
pub use config::EngineConfig;
pub use domain::{
    Analysis, DependencySet, FileEntry, Grade, HealthReport, LanguageDistribution, RepoHandle,
    RepoSummary, SecurityReport,
};
pub use error::{Result, TidyError};
pub use fetch::FetchPolicy;
pub use github::{GitHubAccessor, GitHubConfig};
pub use health::HealthScorer;
pub use report::{
    format_language_stats, render_analysis_markdown, render_health_markdown, render_json,
};
pub use secrets::SecretScanner;
pub use vercel::{VercelCacheValue, VercelClient, VercelConfig};
pub use walker::TreeWalker;
