//! Repository content access used by every engine component.

use std::collections::BTreeMap;

use crate::domain::{FileEntry, RepoHandle, RepoMetadata, RepoSummary};
use crate::error::Result;

/// Abstraction over a source-control hosting API.
///
/// Implementations report a missing repository, path, or file as
/// [`TidyError::NotFound`](crate::TidyError::NotFound) and transport or
/// authorisation problems as [`TidyError::Accessor`](crate::TidyError::Accessor).
#[cfg_attr(test, mockall::automock)]
pub trait RepositoryAccessor {
    /// Repository metadata (name, description, language, license, last push).
    fn metadata(&self, repo: &RepoHandle) -> Result<RepoMetadata>;
    /// Topic tags attached to the repository.
    fn topics(&self, repo: &RepoHandle) -> Result<Vec<String>>;
    /// Byte counts per language.
    fn language_bytes(&self, repo: &RepoHandle) -> Result<BTreeMap<String, u64>>;
    /// README text.
    fn readme(&self, repo: &RepoHandle) -> Result<String>;
    /// Entries of one directory; `""` is the repository root.
    fn list_directory(&self, repo: &RepoHandle, path: &str) -> Result<Vec<FileEntry>>;
    /// Raw bytes of one file.
    fn file_content(&self, repo: &RepoHandle, path: &str) -> Result<Vec<u8>>;
}

/// Lists the repositories owned by the authenticated user.
#[cfg_attr(test, mockall::automock)]
pub trait RepositoryLister {
    /// Repositories, most recently updated first; forks only when asked for.
    fn list_repositories(&self, include_forks: bool) -> Result<Vec<RepoSummary>>;
}
