//! Repository analysis entry points.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::accessor::RepositoryAccessor;
use crate::config::EngineConfig;
use crate::domain::{Analysis, DependencySet, FileEntry, HealthReport, LanguageDistribution, RepoHandle};
use crate::error::{Result, TidyError, decode_text};
use crate::fetch::{FetchPolicy, fan_out, fetch_one};
use crate::health::HealthScorer;
use crate::manifests::{self, manifest_filenames};
use crate::walker::TreeWalker;

/// Root file names that indicate the kind of project.
pub const KEY_FILES: [&str; 16] = [
    "package.json",
    "requirements.txt",
    "Cargo.toml",
    "go.mod",
    "Dockerfile",
    "docker-compose.yml",
    "Makefile",
    "setup.py",
    "setup.cfg",
    "next.config.js",
    "vite.config.js",
    "webpack.config.js",
    "tsconfig.json",
    "tailwind.config.js",
    ".eslintrc",
    "jest.config.js",
];

const WORKFLOWS_DIR: &str = ".github/workflows";

/// Key files among the root entries of `structure`, in listing order.
///
/// `.github/workflows` is appended when the root `.github` directory was
/// listed and contains `workflows`.
pub fn key_files(structure: &[FileEntry]) -> Vec<String> {
    let mut found: Vec<String> = structure
        .iter()
        .filter(|entry| !entry.is_dir() && KEY_FILES.contains(&entry.name.as_str()))
        .map(|entry| entry.name.clone())
        .collect();
    let has_workflows = structure
        .iter()
        .filter(|entry| entry.is_dir() && entry.name == ".github")
        .filter_map(|entry| entry.children.as_ref())
        .flatten()
        .any(|child| child.name == "workflows");
    if has_workflows {
        found.push(WORKFLOWS_DIR.to_string());
    }
    found
}

/// Share of total bytes per language, rounded to one decimal place.
///
/// An empty or all-zero input yields an empty distribution.
pub fn language_distribution(bytes: &BTreeMap<String, u64>) -> LanguageDistribution {
    let total: u128 = bytes.values().map(|count| u128::from(*count)).sum();
    if total == 0 {
        return LanguageDistribution::new();
    }
    bytes
        .iter()
        .map(|(language, count)| {
            let percent = *count as f64 / total as f64 * 100.0;
            (language.clone(), (percent * 10.0).round() / 10.0)
        })
        .collect()
}

/// Orchestrates traversal, manifest parsing, secret scanning, and scoring.
pub struct RepositoryAnalyzer<A> {
    accessor: Arc<A>,
    config: EngineConfig,
    policy: FetchPolicy,
    walker: TreeWalker<A>,
    scorer: HealthScorer<A>,
}

impl<A> RepositoryAnalyzer<A>
where
    A: RepositoryAccessor + Send + Sync + 'static,
{
    /// Create an analyzer over `accessor`.
    pub fn new(accessor: Arc<A>, config: EngineConfig) -> Self {
        let policy = FetchPolicy::from_config(&config);
        Self {
            walker: TreeWalker::new(Arc::clone(&accessor), policy),
            scorer: HealthScorer::new(Arc::clone(&accessor), policy, config.max_files),
            accessor,
            config,
            policy,
        }
    }

    /// Engine configuration in use.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Collect every structured signal for `repo`.
    ///
    /// Fails only when the repository metadata cannot be fetched; every
    /// other unreachable piece is left empty.
    pub async fn analyze_repository(&self, repo: &RepoHandle) -> Result<Analysis> {
        log::info!("analyzing {repo}");
        let metadata = fetch_one(
            &self.accessor,
            repo,
            self.policy,
            "metadata",
            |accessor: &A, repo: &RepoHandle, _: &str| accessor.metadata(repo),
        )
        .await?;

        let (topics, languages, readme, structure, dependencies) = tokio::join!(
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
                "languages",
                |accessor: &A, repo: &RepoHandle, _: &str| accessor.language_bytes(repo),
            ),
            fetch_one(
                &self.accessor,
                repo,
                self.policy,
                "README",
                |accessor: &A, repo: &RepoHandle, _: &str| accessor.readme(repo),
            ),
            self.walker.list_tree(repo, self.config.max_depth),
            self.dependencies(repo),
        );

        let topics = topics.unwrap_or_else(|err| {
            log::debug!("no topics for {repo}: {err}");
            Vec::new()
        });
        let languages = languages
            .map(|bytes| language_distribution(&bytes))
            .unwrap_or_else(|err| {
                log::debug!("no language statistics for {repo}: {err}");
                LanguageDistribution::new()
            });
        let (has_readme, existing_readme) = match readme {
            Ok(text) => (true, Some(text)),
            Err(TidyError::Decode(err)) => {
                log::warn!("README of {repo} exists but could not be decoded: {err}");
                (true, None)
            }
            Err(err) => {
                log::debug!("no README for {repo}: {err}");
                (false, None)
            }
        };
        let key_files = self.collect_key_files(repo, &structure).await;

        let analysis = Analysis {
            name: metadata.name,
            description: metadata.description.unwrap_or_default(),
            language: metadata.language,
            languages,
            topics,
            license: metadata.license,
            key_files,
            structure,
            dependencies,
            has_readme,
            existing_readme,
        };
        log::info!(
            "analyzed {repo}: {} manifests, {} key files",
            analysis.dependencies.len(),
            analysis.key_files.len()
        );
        Ok(analysis)
    }

    /// Weighted health score for `repo`.
    pub async fn score_repository(&self, repo: &RepoHandle) -> Result<HealthReport> {
        log::info!("scoring {repo}");
        let report = self.scorer.score(repo).await?;
        log::info!("scored {repo}: {} ({})", report.score, report.grade);
        Ok(report)
    }

    /// [`key_files`], listing `.github` when the structure stopped above it.
    async fn collect_key_files(&self, repo: &RepoHandle, structure: &[FileEntry]) -> Vec<String> {
        let mut found = key_files(structure);
        let unlisted_github = structure
            .iter()
            .any(|entry| entry.is_dir() && entry.name == ".github" && entry.children.is_none());
        if !unlisted_github {
            return found;
        }
        let listing = fetch_one(
            &self.accessor,
            repo,
            self.policy,
            ".github",
            |accessor: &A, repo: &RepoHandle, path: &str| accessor.list_directory(repo, path),
        )
        .await;
        match listing {
            Ok(entries) if entries.iter().any(|entry| entry.name == "workflows") => {
                found.push(WORKFLOWS_DIR.to_string());
            }
            Ok(_) => {}
            Err(err) => log::debug!("could not list .github of {repo}: {err}"),
        }
        found
    }

    async fn dependencies(&self, repo: &RepoHandle) -> BTreeMap<String, DependencySet> {
        let filenames: Vec<String> = manifest_filenames().map(str::to_string).collect();
        let contents = fan_out(
            &self.accessor,
            repo,
            self.policy,
            filenames.clone(),
            |accessor: &A, repo: &RepoHandle, path: &str| {
                accessor.file_content(repo, path).and_then(decode_text)
            },
        )
        .await;

        filenames
            .into_iter()
            .zip(contents)
            .filter_map(|(filename, content)| match content {
                Ok(text) => manifests::parse(&filename, &text).map(|set| (filename, set)),
                Err(err) if err.is_no_signal() => None,
                Err(err) => {
                    log::warn!("could not fetch {filename} from {repo}: {err}");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::MockRepositoryAccessor;
    use crate::domain::Grade;
    use crate::test_support::{RepoFixture, repo};

    fn analyzer(fixture: RepoFixture) -> RepositoryAnalyzer<MockRepositoryAccessor> {
        RepositoryAnalyzer::new(Arc::new(fixture.into_mock()), EngineConfig::default())
    }

    fn sample_fixture() -> RepoFixture {
        RepoFixture::new()
            .with_description("A tidy demo")
            .with_license("MIT License")
            .with_language("Python", 2000)
            .with_language("Shell", 1000)
            .with_topic("cli")
            .with_readme("# demo\n")
            .with_file("requirements.txt", "flask==2.0.1\nrequests>=2\n# pinned\n")
            .with_file(
                "package.json",
                r#"{"dependencies": {"react": "^18"}, "scripts": {"build": "vite"}}"#,
            )
            .with_file("Dockerfile", "FROM python:3.12")
            .with_file("Gemfile", "not a gemfile")
            .with_file(".github/workflows/ci.yml", "on: push")
            .with_file("src/app/main.py", "print('hi')")
    }

    #[test]
    fn language_percentages_round_to_one_decimal() {
        let bytes: BTreeMap<String, u64> = [
            ("Rust".to_string(), 2),
            ("Shell".to_string(), 1),
        ]
        .into_iter()
        .collect();
        let distribution = language_distribution(&bytes);
        assert_eq!(distribution.get("Rust"), Some(&66.7));
        assert_eq!(distribution.get("Shell"), Some(&33.3));
    }

    #[test]
    fn zero_total_bytes_yield_empty_distribution() {
        let bytes: BTreeMap<String, u64> = [("Rust".to_string(), 0)].into_iter().collect();
        assert!(language_distribution(&bytes).is_empty());
        assert!(language_distribution(&BTreeMap::new()).is_empty());
    }

    #[test]
    fn key_files_keep_listing_order_and_detect_workflows() {
        let mut github = FileEntry::dir(".github");
        github.children = Some(vec![FileEntry::dir(".github/workflows")]);
        let structure = vec![
            FileEntry::file("Makefile"),
            FileEntry::file("README.md"),
            github,
            FileEntry::file("Cargo.toml"),
            FileEntry::dir("package.json"),
        ];
        assert_eq!(
            key_files(&structure),
            vec!["Makefile", "Cargo.toml", ".github/workflows"]
        );
    }

    #[tokio::test]
    async fn analysis_collects_every_signal() {
        let analysis = analyzer(sample_fixture())
            .analyze_repository(&repo())
            .await
            .expect("analysis");

        assert_eq!(analysis.name, "demo");
        assert_eq!(analysis.description, "A tidy demo");
        assert_eq!(analysis.language.as_deref(), Some("Python"));
        assert_eq!(analysis.languages.get("Python"), Some(&66.7));
        assert_eq!(analysis.topics, vec!["cli".to_string()]);
        assert!(analysis.has_readme);
        assert_eq!(analysis.existing_readme.as_deref(), Some("# demo\n"));
        assert_eq!(
            analysis.key_files,
            vec!["Dockerfile", "package.json", "requirements.txt", ".github/workflows"]
        );
        assert_eq!(
            analysis.dependencies.get("requirements.txt"),
            Some(&DependencySet::FlatList(vec![
                "flask".to_string(),
                "requests".to_string()
            ]))
        );
        match analysis.dependencies.get("package.json") {
            Some(DependencySet::GroupedMap(groups)) => {
                assert_eq!(groups.get("dependencies"), Some(&vec!["react".to_string()]));
                assert_eq!(groups.get("scripts"), Some(&vec!["build".to_string()]));
            }
            other => panic!("expected grouped package.json, got {other:?}"),
        }
        assert!(!analysis.dependencies.contains_key("Gemfile"));

        let src = analysis
            .structure
            .iter()
            .find(|entry| entry.name == "src")
            .expect("src");
        let app = &src.children.as_ref().expect("src children")[0];
        assert_eq!(app.children.as_ref().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn missing_optional_signals_degrade_to_empty() {
        let mut fixture = RepoFixture::new().with_file("main.go", "package main");
        fixture.fail_content(
            "package.json",
            TidyError::Accessor("rate limited".to_string()),
        );
        let analysis = analyzer(fixture)
            .analyze_repository(&repo())
            .await
            .expect("analysis");

        assert_eq!(analysis.description, "");
        assert!(analysis.languages.is_empty());
        assert!(!analysis.has_readme);
        assert_eq!(analysis.existing_readme, None);
        assert!(analysis.dependencies.is_empty());
        assert!(analysis.key_files.is_empty());
        assert_eq!(analysis.structure.len(), 1);
    }

    #[tokio::test]
    async fn workflows_are_found_when_structure_stops_at_root() {
        let config = EngineConfig {
            max_depth: 0,
            ..EngineConfig::default()
        };
        let analyzer = RepositoryAnalyzer::new(Arc::new(sample_fixture().into_mock()), config);
        let analysis = analyzer.analyze_repository(&repo()).await.expect("analysis");

        assert!(analysis.structure.iter().all(|entry| entry.children.is_none()));
        assert_eq!(analysis.key_files.last().map(String::as_str), Some(".github/workflows"));
    }

    #[tokio::test]
    async fn undecodable_readme_is_present_without_text() {
        let mut fixture = sample_fixture();
        fixture.fail_readme(TidyError::Decode("invalid utf-8".to_string()));
        let analysis = analyzer(fixture)
            .analyze_repository(&repo())
            .await
            .expect("analysis");

        assert!(analysis.has_readme);
        assert_eq!(analysis.existing_readme, None);
    }

    #[tokio::test]
    async fn unreachable_repository_is_fatal() {
        let mut fixture = sample_fixture();
        fixture.fail_metadata(TidyError::Accessor("bad credentials".to_string()));
        let analyzer = analyzer(fixture);

        assert!(analyzer.analyze_repository(&repo()).await.is_err());
        assert!(analyzer.score_repository(&repo()).await.is_err());
    }

    #[tokio::test]
    async fn score_repository_applies_rubric() {
        let fixture = sample_fixture()
            .with_file(".gitignore", ".env\nnode_modules\n__pycache__\n")
            .pushed_days_ago(chrono::Utc::now(), 3);
        let report = analyzer(fixture)
            .score_repository(&repo())
            .await
            .expect("report");

        assert_eq!(report.score, 100);
        assert_eq!(report.grade, Grade::A);
    }
}
