//! In-process TTL cache and a caching accessor decorator.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::accessor::RepositoryAccessor;
use crate::domain::{FileEntry, RepoHandle, RepoMetadata};
use crate::error::{Result, TidyError};

struct Entry<V> {
    value: V,
    /// `None` when the TTL overflowed `Instant`; such entries never expire.
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// String-keyed cache with per-entry expiry.
///
/// Expiry is checked lazily: an expired entry is removed by the `get` that
/// finds it. Every operation, reads included, takes the same lock.
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V> Default for TtlCache<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone> TtlCache<V> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live value for `key`, evicting it if expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.lock();
        let expired = entries.get(key)?.is_expired(Instant::now());
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Store `value` under `key` for `ttl`, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now().checked_add(ttl),
        };
        self.lock().insert(key.into(), entry);
    }

    /// Remove `key`; returns whether an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Remove every key containing `pattern` as a substring.
    pub fn clear_by_pattern(&self, pattern: &str) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.contains(pattern));
        before - entries.len()
    }

    /// Remove every entry.
    pub fn clear_all(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, expired ones included until read.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached value for `key`, or the result of `compute` stored for `ttl`.
    ///
    /// The lock is released while `compute` runs, so concurrent misses may
    /// compute twice; the last write wins. Errors are returned and not stored.
    pub fn get_or_insert_with<E, F>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
    {
        if let Some(value) = self.get(key) {
            log::debug!("cache hit for {key}");
            return Ok(value);
        }
        let value = compute()?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }
}

/// Values stored by [`CachedAccessor`].
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    /// Repository metadata.
    Metadata(RepoMetadata),
    /// Topic tags.
    Topics(Vec<String>),
    /// Language byte counts.
    LanguageBytes(BTreeMap<String, u64>),
    /// README text.
    Readme(String),
    /// A directory listing.
    Listing(Vec<FileEntry>),
    /// Raw file content.
    Content(Vec<u8>),
}

/// Key under which [`CachedAccessor`] stores one accessor result.
pub fn cache_key(repo: &RepoHandle, operation: &str, path: &str) -> String {
    format!("{}/{}:{operation}:{path}", repo.owner, repo.name)
}

/// Accessor decorator that fronts every call with a shared [`TtlCache`].
pub struct CachedAccessor<A> {
    inner: A,
    cache: Arc<TtlCache<CachedValue>>,
    ttl: Duration,
}

impl<A> CachedAccessor<A> {
    /// Wrap `inner`, storing successful results for `ttl`.
    pub fn new(inner: A, cache: Arc<TtlCache<CachedValue>>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    /// The shared cache, for invalidation.
    pub fn cache(&self) -> &Arc<TtlCache<CachedValue>> {
        &self.cache
    }

    fn cached<T>(
        &self,
        key: String,
        compute: impl FnOnce() -> Result<T>,
        wrap: fn(T) -> CachedValue,
        unwrap: fn(CachedValue) -> Option<T>,
    ) -> Result<T> {
        let value = self
            .cache
            .get_or_insert_with(&key, self.ttl, || compute().map(wrap))?;
        unwrap(value).ok_or_else(|| TidyError::Other(format!("cache entry {key} has wrong shape")))
    }
}

impl<A: RepositoryAccessor> RepositoryAccessor for CachedAccessor<A> {
    fn metadata(&self, repo: &RepoHandle) -> Result<RepoMetadata> {
        self.cached(
            cache_key(repo, "metadata", ""),
            || self.inner.metadata(repo),
            CachedValue::Metadata,
            |value| match value {
                CachedValue::Metadata(metadata) => Some(metadata),
                _ => None,
            },
        )
    }

    fn topics(&self, repo: &RepoHandle) -> Result<Vec<String>> {
        self.cached(
            cache_key(repo, "topics", ""),
            || self.inner.topics(repo),
            CachedValue::Topics,
            |value| match value {
                CachedValue::Topics(topics) => Some(topics),
                _ => None,
            },
        )
    }

    fn language_bytes(&self, repo: &RepoHandle) -> Result<BTreeMap<String, u64>> {
        self.cached(
            cache_key(repo, "languages", ""),
            || self.inner.language_bytes(repo),
            CachedValue::LanguageBytes,
            |value| match value {
                CachedValue::LanguageBytes(bytes) => Some(bytes),
                _ => None,
            },
        )
    }

    fn readme(&self, repo: &RepoHandle) -> Result<String> {
        self.cached(
            cache_key(repo, "readme", ""),
            || self.inner.readme(repo),
            CachedValue::Readme,
            |value| match value {
                CachedValue::Readme(text) => Some(text),
                _ => None,
            },
        )
    }

    fn list_directory(&self, repo: &RepoHandle, path: &str) -> Result<Vec<FileEntry>> {
        self.cached(
            cache_key(repo, "list", path),
            || self.inner.list_directory(repo, path),
            CachedValue::Listing,
            |value| match value {
                CachedValue::Listing(entries) => Some(entries),
                _ => None,
            },
        )
    }

    fn file_content(&self, repo: &RepoHandle, path: &str) -> Result<Vec<u8>> {
        self.cached(
            cache_key(repo, "content", path),
            || self.inner.file_content(repo, path),
            CachedValue::Content,
            |value| match value {
                CachedValue::Content(bytes) => Some(bytes),
                _ => None,
            },
        )
    }
}
