//! Bounded, order-preserving fan-out of accessor calls.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::EngineConfig;
use crate::domain::RepoHandle;
use crate::error::{Result, TidyError};

/// Concurrency and deadline applied to accessor calls.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Maximum calls in flight.
    pub concurrency: usize,
    /// Deadline per call; an elapsed deadline is reported as not found.
    pub deadline: Duration,
}

impl FetchPolicy {
    /// Derive the policy from engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            deadline: config.fetch_timeout,
        }
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Run `fetch` once per path on the blocking pool and return results in input order.
pub(crate) async fn fan_out<A, T, F>(
    accessor: &Arc<A>,
    repo: &RepoHandle,
    policy: FetchPolicy,
    paths: Vec<String>,
    fetch: F,
) -> Vec<Result<T>>
where
    A: Send + Sync + 'static,
    T: Send + 'static,
    F: Fn(&A, &RepoHandle, &str) -> Result<T> + Send + Sync + 'static,
{
    if paths.is_empty() {
        return Vec::new();
    }

    let total = paths.len();
    let fetch = Arc::new(fetch);
    let semaphore = Arc::new(Semaphore::new(policy.concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, path) in paths.into_iter().enumerate() {
        let accessor = Arc::clone(accessor);
        let repo = repo.clone();
        let fetch = Arc::clone(&fetch);
        let semaphore = Arc::clone(&semaphore);
        let deadline = policy.deadline;
        tasks.spawn(async move {
            let Ok(permit) = semaphore.acquire_owned().await else {
                return (index, Err(TidyError::Other("fetch pool closed".to_string())));
            };
            let label = path.clone();
            // The permit lives until the call returns, even past its deadline.
            let call = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                (*fetch)(accessor.as_ref(), &repo, &path)
            });
            let outcome = match tokio::time::timeout(deadline, call).await {
                Ok(Ok(result)) => result,
                Ok(Err(err)) => Err(TidyError::Accessor(format!(
                    "fetch of {label:?} aborted: {err}"
                ))),
                Err(_) => Err(TidyError::NotFound(format!(
                    "{label:?} (deadline of {deadline:?} elapsed)"
                ))),
            };
            (index, outcome)
        });
    }

    let mut slots: Vec<Option<Result<T>>> = std::iter::repeat_with(|| None).take(total).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => slots[index] = Some(outcome),
            Err(err) => log::warn!("fetch task failed: {err}"),
        }
    }

    slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                Err(TidyError::Accessor(
                    "fetch task did not complete".to_string(),
                ))
            })
        })
        .collect()
}

/// Single-call variant of [`fan_out`] that still honours the deadline.
pub(crate) async fn fetch_one<A, T, F>(
    accessor: &Arc<A>,
    repo: &RepoHandle,
    policy: FetchPolicy,
    path: &str,
    fetch: F,
) -> Result<T>
where
    A: Send + Sync + 'static,
    T: Send + 'static,
    F: Fn(&A, &RepoHandle, &str) -> Result<T> + Send + Sync + 'static,
{
    fan_out(accessor, repo, policy, vec![path.to_string()], fetch)
        .await
        .pop()
        .unwrap_or_else(|| Err(TidyError::Accessor(format!("no result for {path:?}"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn visit(&self, path: &str) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            // Later paths finish first so completion order differs from input order.
            let delay = 5 * (10 - path.len().min(10)) as u64;
            std::thread::sleep(Duration::from_millis(delay));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if path == "missing" {
                return Err(TidyError::NotFound(path.to_string()));
            }
            Ok(path.to_uppercase())
        }
    }

    fn repo() -> RepoHandle {
        RepoHandle::new("tidy", "demo")
    }

    #[tokio::test]
    async fn results_follow_input_order_and_respect_concurrency() {
        let recorder = Arc::new(Recorder::new());
        let paths: Vec<String> = ["a", "bb", "missing", "dddd", "eeeee", "ffffff"]
            .iter()
            .map(|p| p.to_string())
            .collect();
        let policy = FetchPolicy {
            concurrency: 2,
            deadline: Duration::from_secs(5),
        };

        let results = fan_out(&recorder, &repo(), policy, paths, |recorder, _, path| {
            recorder.visit(path)
        })
        .await;

        assert_eq!(results.len(), 6);
        assert_eq!(results[0].as_deref().ok(), Some("A"));
        assert_eq!(results[1].as_deref().ok(), Some("BB"));
        assert!(matches!(results[2], Err(TidyError::NotFound(_))));
        assert_eq!(results[5].as_deref().ok(), Some("FFFFFF"));
        assert!(recorder.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn elapsed_deadline_is_reported_as_not_found() {
        let slow = Arc::new(());
        let policy = FetchPolicy {
            concurrency: 1,
            deadline: Duration::from_millis(20),
        };

        let result = fetch_one(&slow, &repo(), policy, "slow.txt", |_, _, _| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.is_no_signal());
        assert!(err.to_string().contains("deadline"));
    }

    #[tokio::test]
    async fn timed_out_calls_keep_their_slot_until_they_return() {
        let recorder = Arc::new(Recorder::new());
        let paths: Vec<String> = (0..4).map(|i| format!("slow-{i}")).collect();
        let policy = FetchPolicy {
            concurrency: 1,
            deadline: Duration::from_millis(10),
        };

        let results = fan_out(&recorder, &repo(), policy, paths, |recorder, _, _| {
            let now = recorder.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            recorder.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(60));
            recorder.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|result| matches!(result, Err(TidyError::NotFound(_)))));
        assert_eq!(recorder.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let recorder = Arc::new(Recorder::new());
        let results = fan_out(&recorder, &repo(), FetchPolicy::default(), Vec::new(), |r, _, p| {
            r.visit(p)
        })
        .await;
        assert!(results.is_empty());
        assert_eq!(recorder.peak.load(Ordering::SeqCst), 0);
    }
}
