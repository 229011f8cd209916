//! Bounded repository tree traversal.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::accessor::RepositoryAccessor;
use crate::domain::{EntryKind, FileEntry, RepoHandle};
use crate::fetch::{FetchPolicy, fan_out};

/// Directory names never descended into by [`TreeWalker::list_all_files`].
pub const EXCLUDED_DIRS: [&str; 12] = [
    "node_modules",
    "vendor",
    "bower_components",
    ".venv",
    "venv",
    ".git",
    ".svn",
    ".hg",
    "__pycache__",
    ".mypy_cache",
    ".pytest_cache",
    ".tox",
];

/// Whether a directory name is skipped by the flat listing.
pub fn is_excluded_dir(name: &str) -> bool {
    EXCLUDED_DIRS.contains(&name)
}

/// Lists repository directories level by level through an accessor.
///
/// Each level is one frontier of directory paths fetched concurrently under
/// the fetch policy. Failed listings count as empty directories.
pub struct TreeWalker<A> {
    accessor: Arc<A>,
    policy: FetchPolicy,
}

impl<A> Clone for TreeWalker<A> {
    fn clone(&self) -> Self {
        Self {
            accessor: Arc::clone(&self.accessor),
            policy: self.policy,
        }
    }
}

impl<A> TreeWalker<A>
where
    A: RepositoryAccessor + Send + Sync + 'static,
{
    /// Create a walker over the given accessor.
    pub fn new(accessor: Arc<A>, policy: FetchPolicy) -> Self {
        Self { accessor, policy }
    }

    /// Nested listing of the repository root down to `max_depth`.
    pub async fn list_tree(&self, repo: &RepoHandle, max_depth: usize) -> Vec<FileEntry> {
        self.list_tree_from(repo, "", 0, max_depth).await
    }

    /// Nested listing of `path`, which sits at `depth`.
    ///
    /// Directories above `max_depth` carry their children; directories at
    /// `max_depth` are listed without children. Past `max_depth` the result
    /// is empty.
    pub async fn list_tree_from(
        &self,
        repo: &RepoHandle,
        path: &str,
        depth: usize,
        max_depth: usize,
    ) -> Vec<FileEntry> {
        if depth > max_depth {
            return Vec::new();
        }

        let mut listings: HashMap<String, Vec<FileEntry>> = HashMap::new();
        let mut frontier = vec![path.to_string()];
        let mut level = depth;

        while !frontier.is_empty() {
            let results = self.list_level(repo, frontier.clone()).await;
            let mut next = Vec::new();
            for (dir, entries) in frontier.into_iter().zip(results) {
                if level < max_depth {
                    next.extend(
                        entries
                            .iter()
                            .filter(|entry| entry.is_dir() && !listings.contains_key(&entry.path))
                            .map(|entry| entry.path.clone()),
                    );
                }
                listings.insert(dir, entries);
            }
            frontier = next;
            level += 1;
        }

        assemble(path, &mut listings)
    }

    /// Flat list of file paths, breadth first, capped at `max_files`.
    ///
    /// Excluded directories are never listed. Directories are listed in
    /// chunks of `concurrency` and the cap is checked between chunks, so
    /// traversal stops as soon as it is reached, even in the middle of a
    /// level. At most `max_files` directories are listed in total.
    pub async fn list_all_files(&self, repo: &RepoHandle, max_files: usize) -> Vec<String> {
        let mut files = Vec::new();
        let mut pending = VecDeque::from([String::new()]);
        let mut listings = 0;

        while files.len() < max_files && listings < max_files {
            let chunk_size = self
                .policy
                .concurrency
                .max(1)
                .min(max_files - listings)
                .min(pending.len());
            if chunk_size == 0 {
                break;
            }
            let chunk: Vec<String> = pending.drain(..chunk_size).collect();
            listings += chunk.len();

            'chunk: for entries in self.list_level(repo, chunk).await {
                for entry in entries {
                    match entry.kind {
                        EntryKind::Directory => {
                            if !is_excluded_dir(&entry.name) {
                                pending.push_back(entry.path);
                            }
                        }
                        EntryKind::File => {
                            files.push(entry.path);
                            if files.len() >= max_files {
                                break 'chunk;
                            }
                        }
                    }
                }
            }
        }

        if !pending.is_empty() && files.len() < max_files {
            log::debug!(
                "stopped listing {repo} after {listings} directories; {} left unlisted",
                pending.len()
            );
        }
        files
    }

    async fn list_level(&self, repo: &RepoHandle, dirs: Vec<String>) -> Vec<Vec<FileEntry>> {
        let results = fan_out(
            &self.accessor,
            repo,
            self.policy,
            dirs.clone(),
            |accessor: &A, repo: &RepoHandle, path: &str| accessor.list_directory(repo, path),
        )
        .await;

        dirs.iter()
            .zip(results)
            .map(|(dir, result)| match result {
                Ok(entries) => entries,
                Err(err) if err.is_no_signal() => {
                    log::debug!("no listing for {repo}:{dir:?}: {err}");
                    Vec::new()
                }
                Err(err) => {
                    log::warn!("listing {repo}:{dir:?} failed: {err}");
                    Vec::new()
                }
            })
            .collect()
    }
}

fn assemble(path: &str, listings: &mut HashMap<String, Vec<FileEntry>>) -> Vec<FileEntry> {
    let Some(entries) = listings.remove(path) else {
        return Vec::new();
    };
    entries
        .into_iter()
        .map(|mut entry| {
            if entry.is_dir() && listings.contains_key(&entry.path) {
                entry.children = Some(assemble(&entry.path, listings));
            }
            entry
        })
        .collect()
}
