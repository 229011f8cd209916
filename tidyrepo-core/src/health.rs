//! Weighted repository health rubric.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::accessor::RepositoryAccessor;
use crate::domain::{
    Grade, GitignoreStatus, HealthCheck, HealthReport, RepoHandle, RepoMetadata, SecurityReport,
};
use crate::error::{Result, TidyError};
use crate::fetch::{FetchPolicy, fetch_one};
use crate::secrets::SecretScanner;

/// Pushes older than this many days fail the activity check.
pub const ACTIVITY_WINDOW_DAYS: i64 = 180;

/// One line of the fixed health rubric.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RubricCheck {
    /// The README could be fetched.
    Readme,
    /// The provider detected a license.
    License,
    /// `.gitignore` exists and covers the expected entries.
    Gitignore,
    /// The description is non-empty.
    Description,
    /// At least one topic tag is set.
    Topics,
    /// Last push within [`ACTIVITY_WINDOW_DAYS`].
    RecentActivity,
    /// The secret scan reported no critical findings.
    NoCriticalFindings,
}

impl RubricCheck {
    /// Every check in rubric order.
    pub const ALL: [RubricCheck; 7] = [
        RubricCheck::Readme,
        RubricCheck::License,
        RubricCheck::Gitignore,
        RubricCheck::Description,
        RubricCheck::Topics,
        RubricCheck::RecentActivity,
        RubricCheck::NoCriticalFindings,
    ];

    /// Display label of the check.
    pub fn label(&self) -> &'static str {
        match self {
            RubricCheck::Readme => "README present",
            RubricCheck::License => "LICENSE present",
            RubricCheck::Gitignore => ".gitignore configured",
            RubricCheck::Description => "Description present",
            RubricCheck::Topics => "Topics present",
            RubricCheck::RecentActivity => "Recently active",
            RubricCheck::NoCriticalFindings => "No critical security findings",
        }
    }

    /// Points awarded when the check passes.
    pub fn weight(&self) -> u8 {
        match self {
            RubricCheck::Readme => 20,
            RubricCheck::License => 15,
            RubricCheck::Gitignore => 15,
            RubricCheck::Description => 10,
            RubricCheck::Topics => 10,
            RubricCheck::RecentActivity => 15,
            RubricCheck::NoCriticalFindings => 15,
        }
    }

    fn passes(&self, signals: &HealthSignals, now: DateTime<Utc>) -> bool {
        match self {
            RubricCheck::Readme => signals.has_readme,
            RubricCheck::License => signals.metadata.license.is_some(),
            RubricCheck::Gitignore => signals.security.gitignore == GitignoreStatus::Complete,
            RubricCheck::Description => signals
                .metadata
                .description
                .as_deref()
                .is_some_and(|text| !text.trim().is_empty()),
            RubricCheck::Topics => !signals.topics.is_empty(),
            RubricCheck::RecentActivity => signals.metadata.pushed_at.is_some_and(|pushed| {
                now.signed_duration_since(pushed) <= Duration::days(ACTIVITY_WINDOW_DAYS)
            }),
            RubricCheck::NoCriticalFindings => !signals.security.has_critical,
        }
    }
}

/// Everything the rubric looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSignals {
    /// Provider metadata.
    pub metadata: RepoMetadata,
    /// Topic tags.
    pub topics: Vec<String>,
    /// Whether the README was fetched.
    pub has_readme: bool,
    /// Secret scan result.
    pub security: SecurityReport,
}

/// Apply the rubric to collected signals as of `now`.
pub fn evaluate(signals: HealthSignals, now: DateTime<Utc>) -> HealthReport {
    let checks: Vec<HealthCheck> = RubricCheck::ALL
        .iter()
        .map(|check| HealthCheck {
            name: check.label().to_string(),
            passed: check.passes(&signals, now),
            weight: check.weight(),
        })
        .collect();
    let score = checks
        .iter()
        .filter(|check| check.passed)
        .map(|check| check.weight)
        .sum();
    HealthReport {
        score,
        grade: Grade::from_score(score),
        checks,
        security: signals.security,
    }
}

/// Collects health signals through an accessor and scores them.
pub struct HealthScorer<A> {
    accessor: Arc<A>,
    scanner: SecretScanner<A>,
    policy: FetchPolicy,
}

impl<A> HealthScorer<A>
where
    A: RepositoryAccessor + Send + Sync + 'static,
{
    /// Create a scorer; `max_files` bounds the secret scan.
    pub fn new(accessor: Arc<A>, policy: FetchPolicy, max_files: usize) -> Self {
        Self {
            scanner: SecretScanner::new(Arc::clone(&accessor), policy, max_files),
            accessor,
            policy,
        }
    }

    /// Score the repository as of now.
    pub async fn score(&self, repo: &RepoHandle) -> Result<HealthReport> {
        self.score_at(repo, Utc::now()).await
    }

    /// Score the repository as of `now`. Fails only when metadata is unreachable.
    pub async fn score_at(&self, repo: &RepoHandle, now: DateTime<Utc>) -> Result<HealthReport> {
        let metadata = fetch_one(
            &self.accessor,
            repo,
            self.policy,
            "metadata",
            |accessor: &A, repo: &RepoHandle, _: &str| accessor.metadata(repo),
        )
        .await?;

        let (topics, readme, security) = tokio::join!(
            fetch_one(
                &self.accessor,
                repo,
                self.policy,
                "topics",
                |accessor: &A, repo: &RepoHandle, _: &str| accessor.topics(repo),
            ),
            fetch_one(
                &self.accessor,
                repo,
                self.policy,
                "README",
                |accessor: &A, repo: &RepoHandle, _: &str| accessor.readme(repo),
            ),
            self.scanner.scan(repo),
        );

        let topics = topics.unwrap_or_else(|err| {
            log::debug!("no topics for {repo}: {err}");
            Vec::new()
        });
        let has_readme = match readme {
            Ok(_) => true,
            Err(TidyError::Decode(err)) => {
                log::warn!("README of {repo} exists but could not be decoded: {err}");
                true
            }
            Err(err) => {
                log::debug!("no README for {repo}: {err}");
                false
            }
        };

        Ok(evaluate(
            HealthSignals {
                metadata,
                topics,
                has_readme,
                security,
            },
            now,
        ))
    }
}
