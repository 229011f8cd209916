//! In-memory repository fixtures backed by the mocked accessor.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Duration, Utc};

use crate::accessor::MockRepositoryAccessor;
use crate::domain::{FileEntry, RepoHandle, RepoMetadata};
use crate::error::{Result, TidyError};

pub(crate) fn repo() -> RepoHandle {
    RepoHandle::new("tidy", "demo")
}

/// A fake repository: metadata plus a map of file paths to contents.
#[derive(Debug, Clone)]
pub(crate) struct RepoFixture {
    metadata: RepoMetadata,
    metadata_failure: Option<TidyError>,
    topics: Vec<String>,
    languages: BTreeMap<String, u64>,
    readme: Option<String>,
    readme_failure: Option<TidyError>,
    files: BTreeMap<String, Vec<u8>>,
    listing_failures: HashMap<String, TidyError>,
    content_failures: HashMap<String, TidyError>,
    listing_calls: Arc<AtomicUsize>,
}

impl RepoFixture {
    pub(crate) fn new() -> Self {
        Self {
            metadata: RepoMetadata {
                name: "demo".to_string(),
                ..RepoMetadata::default()
            },
            metadata_failure: None,
            topics: Vec::new(),
            languages: BTreeMap::new(),
            readme: None,
            readme_failure: None,
            files: BTreeMap::new(),
            listing_failures: HashMap::new(),
            content_failures: HashMap::new(),
            listing_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn with_file(mut self, path: &str, contents: &str) -> Self {
        self.files
            .insert(path.to_string(), contents.as_bytes().to_vec());
        self
    }

    pub(crate) fn with_bytes(mut self, path: &str, contents: &[u8]) -> Self {
        self.files.insert(path.to_string(), contents.to_vec());
        self
    }

    pub(crate) fn with_readme(mut self, text: &str) -> Self {
        self.readme = Some(text.to_string());
        self
    }

    pub(crate) fn with_description(mut self, text: &str) -> Self {
        self.metadata.description = Some(text.to_string());
        self
    }

    pub(crate) fn with_license(mut self, name: &str) -> Self {
        self.metadata.license = Some(name.to_string());
        self
    }

    pub(crate) fn with_language(mut self, name: &str, bytes: u64) -> Self {
        if self.metadata.language.is_none() {
            self.metadata.language = Some(name.to_string());
        }
        self.languages.insert(name.to_string(), bytes);
        self
    }

    pub(crate) fn with_topic(mut self, topic: &str) -> Self {
        self.topics.push(topic.to_string());
        self
    }

    pub(crate) fn pushed_days_ago(mut self, now: DateTime<Utc>, days: i64) -> Self {
        self.metadata.pushed_at = Some(now - Duration::days(days));
        self
    }

    pub(crate) fn fail_metadata(&mut self, error: TidyError) {
        self.metadata_failure = Some(error);
    }

    pub(crate) fn fail_listing(&mut self, path: &str, error: TidyError) {
        self.listing_failures.insert(path.to_string(), error);
    }

    pub(crate) fn fail_readme(&mut self, error: TidyError) {
        self.readme_failure = Some(error);
    }

    /// Counter of `list_directory` calls made through the mock.
    pub(crate) fn listing_calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.listing_calls)
    }

    pub(crate) fn fail_content(&mut self, path: &str, error: TidyError) {
        self.content_failures.insert(path.to_string(), error);
    }

    fn metadata(&self) -> Result<RepoMetadata> {
        match &self.metadata_failure {
            Some(error) => Err(error.clone()),
            None => Ok(self.metadata.clone()),
        }
    }

    fn readme(&self) -> Result<String> {
        if let Some(error) = &self.readme_failure {
            return Err(error.clone());
        }
        self.readme
            .clone()
            .ok_or_else(|| TidyError::NotFound("README".to_string()))
    }

    fn list(&self, dir: &str) -> Result<Vec<FileEntry>> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.listing_failures.get(dir) {
            return Err(error.clone());
        }
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };
        let mut entries: Vec<FileEntry> = Vec::new();
        for path in self.files.keys() {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((child, _)) => {
                    let child_path = format!("{prefix}{child}");
                    if !entries.iter().any(|entry| entry.path == child_path) {
                        entries.push(FileEntry::dir(child_path));
                    }
                }
                None => entries.push(FileEntry::file(path.clone())),
            }
        }
        if entries.is_empty() && !dir.is_empty() {
            return Err(TidyError::NotFound(dir.to_string()));
        }
        Ok(entries)
    }

    fn content(&self, path: &str) -> Result<Vec<u8>> {
        if let Some(error) = self.content_failures.get(path) {
            return Err(error.clone());
        }
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| TidyError::NotFound(path.to_string()))
    }

    pub(crate) fn into_mock(self) -> MockRepositoryAccessor {
        let fixture = Arc::new(self);
        let mut mock = MockRepositoryAccessor::new();

        let source = Arc::clone(&fixture);
        mock.expect_metadata().returning(move |_| source.metadata());
        let source = Arc::clone(&fixture);
        mock.expect_topics()
            .returning(move |_| Ok(source.topics.clone()));
        let source = Arc::clone(&fixture);
        mock.expect_language_bytes()
            .returning(move |_| Ok(source.languages.clone()));
        let source = Arc::clone(&fixture);
        mock.expect_readme().returning(move |_| source.readme());
        let source = Arc::clone(&fixture);
        mock.expect_list_directory()
            .returning(move |_, path| source.list(path));
        let source = Arc::clone(&fixture);
        mock.expect_file_content()
            .returning(move |_, path| source.content(path));

        mock
    }
}
