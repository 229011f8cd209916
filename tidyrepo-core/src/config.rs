//! Engine configuration.

use std::str::FromStr;
use std::time::Duration;

/// Default tree depth for the structure listing.
pub const DEFAULT_MAX_DEPTH: usize = 2;
/// Default cap on files visited by the flat listing.
pub const DEFAULT_MAX_FILES: usize = 100;
/// Default number of concurrent accessor calls.
pub const DEFAULT_CONCURRENCY: usize = 6;
/// Default deadline for a single accessor call.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Default lifetime of cached accessor results.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Tunables for traversal, fan-out, and caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Deepest directory level included in the structure tree.
    pub max_depth: usize,
    /// Maximum number of file paths collected for scanning.
    pub max_files: usize,
    /// Maximum accessor calls in flight.
    pub concurrency: usize,
    /// Deadline for a single accessor call.
    pub fetch_timeout: Duration,
    /// Lifetime of cached accessor results.
    pub cache_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_files: DEFAULT_MAX_FILES,
            concurrency: DEFAULT_CONCURRENCY,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl EngineConfig {
    /// Build a configuration from `TIDYREPO_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let concurrency = parse_or(&lookup, "TIDYREPO_CONCURRENCY", defaults.concurrency);
        Self {
            max_depth: parse_or(&lookup, "TIDYREPO_MAX_DEPTH", defaults.max_depth),
            max_files: parse_or(&lookup, "TIDYREPO_MAX_FILES", defaults.max_files),
            concurrency: concurrency.max(1),
            fetch_timeout: Duration::from_secs(parse_or(
                &lookup,
                "TIDYREPO_FETCH_TIMEOUT_SECS",
                defaults.fetch_timeout.as_secs(),
            )),
            cache_ttl: Duration::from_secs(parse_or(
                &lookup,
                "TIDYREPO_CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            log::warn!("ignoring invalid {key}={raw:?}; using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| values.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_variables() {
        let config = EngineConfig::from_lookup(|_| None);
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_depth, 2);
        assert_eq!(config.max_files, 100);
    }

    #[test]
    fn variables_override_defaults() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("TIDYREPO_MAX_DEPTH", "3"),
            ("TIDYREPO_MAX_FILES", "40"),
            ("TIDYREPO_CONCURRENCY", "8"),
            ("TIDYREPO_FETCH_TIMEOUT_SECS", "2"),
            ("TIDYREPO_CACHE_TTL_SECS", "60"),
        ]));
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.max_files, 40);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.fetch_timeout, Duration::from_secs(2));
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
    }

    #[test]
    fn invalid_values_fall_back_and_concurrency_is_clamped() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("TIDYREPO_MAX_FILES", "lots"),
            ("TIDYREPO_CONCURRENCY", "0"),
        ]));
        assert_eq!(config.max_files, DEFAULT_MAX_FILES);
        assert_eq!(config.concurrency, 1);
    }
}
