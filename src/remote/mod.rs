//! C3: Remote Client.
//!
//! A forge-agnostic capability interface (§9, "forge polymorphism") plus the
//! shared rate-limit/retry/bisection machinery every dialect runs its batch
//! calls through. `github` and `gitlab` implement [`RemoteClient`]; `azure`
//! is a recognized-but-unimplemented stub the factory fails fast on.

pub mod azure;
pub mod github;
pub mod gitlab;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use rand::Rng;
use tracing::warn;

use std::collections::HashMap;

use crate::config::Server;
use crate::errors::{RecoveryError, Result};
use crate::hash::ObjectId;
use crate::internal::object::signature::Person;
use crate::utils::RemoteOrigin;

/// One fetched commit's worth of metadata, forge-agnostic (§4.5).
#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Person,
    pub committer: Person,
    pub message: String,
    pub signature_status: String,
    /// The exact forge-provided unsigned-region payload, present only when signed.
    pub signed_payload: Option<String>,
    pub signature_block: Option<String>,
}

/// A single tree entry as the forge reports it, before mode normalization
/// (§4.6 — GitHub's numeric modes are normalized by the tree walker, not here).
#[derive(Debug, Clone)]
pub struct RemoteTreeEntry {
    pub mode: u32,
    pub name: String,
    pub sha: ObjectId,
    pub kind: RemoteEntryKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteEntryKind {
    Tree,
    Blob,
    Commit,
}

/// How a blob should be retrieved, decided by a cheap classification call
/// before spending a full content fetch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobClass {
    Fetchable,
    TooLarge,
    Binary,
}

/// GitLab's `/repository/tree?recursive=true` returns the whole tree graph
/// rooted at a commit in one flat, path-grouped call rather than one level at
/// a time (§4.6). `root` is the recovered root tree id — it replaces
/// whatever placeholder the commit record carried — and `subtrees` maps each
/// computed (non-root included) tree id to its entries, ready to merge
/// straight into C6's tree map without further fetches.
#[derive(Debug, Clone)]
pub struct HydratedTree {
    pub root: ObjectId,
    pub subtrees: HashMap<ObjectId, Vec<RemoteTreeEntry>>,
}

/// The forge-polymorphic capability interface (§9). One call per concern;
/// batching/pagination/retry are each implementation's responsibility, using
/// the helpers in this module.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Unions every forge-specific dangling-hash source (§4.4). Returned
    /// hashes are raw candidates; the caller subtracts `LocalInventory`.
    async fn dangling_hashes(&self) -> Result<Vec<ObjectId>>;

    /// Batched commit metadata fetch. `None` at an index means the forge
    /// reports that sha absent (→ ERASED).
    async fn fetch_commit_batch(&self, shas: &[ObjectId]) -> Result<Vec<Option<CommitRecord>>>;

    /// Batched, single-level tree-entry fetch. `None` at an index means the
    /// forge reports that tree absent. GitHub resolves trees one level at a
    /// time through this call; GitLab instead answers via
    /// [`RemoteClient::hydrate_commit_tree`] and never needs this one.
    async fn fetch_tree_batch(&self, shas: &[ObjectId]) -> Result<Vec<Option<Vec<RemoteTreeEntry>>>>;

    async fn classify_blobs(&self, shas: &[ObjectId]) -> Result<Vec<BlobClass>>;

    async fn fetch_blob(&self, sha: &ObjectId) -> Result<Vec<u8>>;

    /// GitLab-only escape hatch (§4.6): fetches and reconstructs the entire
    /// tree graph rooted at `commit_sha` in one call, since GitLab's flat
    /// recursive listing is keyed by commit ref, not by tree sha. `Ok(None)`
    /// means "this dialect resolves trees the ordinary way" — the default for
    /// every client except GitLab's.
    async fn hydrate_commit_tree(&self, _commit_sha: ObjectId) -> Result<Option<HydratedTree>> {
        Ok(None)
    }
}

/// Builds a client for `server`, fails fast on Azure DevOps (§9).
pub fn build_client(
    server: Server,
    origin: RemoteOrigin,
    token: Option<String>,
) -> Result<Box<dyn RemoteClient>> {
    match server {
        Server::GitHub => Ok(Box::new(github::GitHubClient::new(origin, token))),
        Server::GitLab => Ok(Box::new(gitlab::GitLabClient::new(origin, token))),
        Server::AzureDevOps => Err(azure::unimplemented_error()),
    }
}

/// §4.3 failure triage: what kind of failure a batch call hit, driving the
/// retry/backoff decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    RateLimit,
    TransientParse,
    Auth,
    Unknown,
}

/// Categorizes a forge error message into §4.3's four buckets.
pub fn categorize_failure(message: &str) -> FailureCategory {
    let lower = message.to_ascii_lowercase();
    if lower.contains("rate limit") {
        FailureCategory::RateLimit
    } else if lower.contains("unexpected eof")
        || lower.contains("unexpected end of json")
        || lower.contains("something went wrong while executing your query")
    {
        FailureCategory::TransientParse
    } else if lower.contains("401") || lower.contains("403") || lower.contains("unauthorized") || lower.contains("bad credentials") {
        FailureCategory::Auth
    } else {
        FailureCategory::Unknown
    }
}

/// Sleeps the §4.3 backoff for `category`. `rate_limit_reset` is the forge's
/// reported `/rate_limit` reset unix time, when known.
pub async fn backoff_sleep(category: FailureCategory, rate_limit_reset: Option<i64>) {
    match category {
        FailureCategory::RateLimit => {
            let secs = match rate_limit_reset {
                Some(reset) => {
                    let now = chrono::Utc::now().timestamp();
                    (reset - now).max(0) as u64 + 10
                }
                None => 60,
            };
            warn!(secs, "rate limited, sleeping");
            tokio::time::sleep(Duration::from_secs(secs)).await;
        }
        FailureCategory::TransientParse => {
            let secs = rand::rng().random_range(1..=3);
            tokio::time::sleep(Duration::from_secs(secs)).await;
        }
        FailureCategory::Unknown => {
            warn!("transient failure, retrying");
        }
        FailureCategory::Auth => {}
    }
}

/// Runs `attempt` up to the hard ceiling of 3 tries (§4.3), categorizing and
/// sleeping between failures. Auth failures fail fatally without retrying.
///
/// `rate_limit_probe` is called (and awaited) only when a failure categorizes
/// as [`FailureCategory::RateLimit`], to learn the forge's actual reset time
/// (GitHub's `/rate_limit`, GitLab's `RateLimit-Reset` header) before sleeping
/// — without it `backoff_sleep` would always take its fixed 60s branch.
pub async fn with_retry<T, F, Fut, P, PFut>(mut attempt: F, mut rate_limit_probe: P) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: FnMut() -> PFut,
    PFut: Future<Output = Option<i64>>,
{
    for _ in 0..3 {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(RecoveryError::Repository(msg)) => {
                let category = categorize_failure(&msg);
                if category == FailureCategory::Auth {
                    return Err(RecoveryError::Repository(format!(
                        "authentication failed; check your token: {msg}"
                    )));
                }
                let rate_limit_reset = if category == FailureCategory::RateLimit {
                    rate_limit_probe().await
                } else {
                    None
                };
                backoff_sleep(category, rate_limit_reset).await;
            }
            Err(other) => return Err(other),
        }
    }
    Err(RecoveryError::MaxAttempts)
}

type BoxedBisectFuture<'a, T> = Pin<Box<dyn Future<Output = Result<Vec<Option<T>>>> + Send + 'a>>;

/// §4.3 / §9 bisection: on a batch failure (or, when `retry_on_none` is set,
/// on any `None` result), split the batch in half and recurse. A singleton
/// batch that still fails is a final failure.
pub fn bisect<'a, T, F>(shas: &'a [ObjectId], retry_on_none: bool, fetch: &'a F) -> BoxedBisectFuture<'a, T>
where
    T: Send + 'a,
    F: Fn(&[ObjectId]) -> BoxedBisectFuture<'a, T> + Sync,
{
    Box::pin(async move {
        if shas.is_empty() {
            return Ok(Vec::new());
        }

        let result = fetch(shas).await;
        let needs_bisect = match &result {
            Err(_) => true,
            Ok(values) => retry_on_none && values.iter().any(|v| v.is_none()),
        };

        if !needs_bisect {
            return result;
        }

        if shas.len() == 1 {
            return result;
        }

        let mid = shas.len() / 2;
        let (left, right) = shas.split_at(mid);
        let mut left_result = bisect(left, retry_on_none, fetch).await?;
        let right_result = bisect(right, retry_on_none, fetch).await?;
        left_result.extend(right_result);
        Ok(left_result)
    })
}

/// Runs `op` once per item in `items`, with at most `worker_pool_size` calls
/// in flight at a time (§5's bounded worker pool), preserving input order in
/// the returned `Vec`. A single failing call fails the whole dispatch — every
/// call already goes through [`with_retry`]/[`bisect`] on its own, so a
/// surviving error here is final.
pub async fn dispatch_bounded<I, T, F, Fut>(items: I, worker_pool_size: usize, op: F) -> Result<Vec<T>>
where
    I: IntoIterator,
    F: Fn(I::Item) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let results: Vec<Result<T>> = stream::iter(items.into_iter().map(op))
        .buffered(worker_pool_size.max(1))
        .collect()
        .await;
    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn categorize_failure_buckets_rate_limit() {
        assert_eq!(categorize_failure("API rate limit exceeded"), FailureCategory::RateLimit);
    }

    #[test]
    fn categorize_failure_buckets_transient_parse() {
        assert_eq!(
            categorize_failure("unexpected EOF while parsing"),
            FailureCategory::TransientParse
        );
        assert_eq!(
            categorize_failure("something went wrong while executing your query"),
            FailureCategory::TransientParse
        );
    }

    #[test]
    fn categorize_failure_buckets_auth() {
        assert_eq!(categorize_failure("403 Forbidden"), FailureCategory::Auth);
        assert_eq!(categorize_failure("Bad credentials"), FailureCategory::Auth);
    }

    #[test]
    fn categorize_failure_buckets_unknown() {
        assert_eq!(categorize_failure("connection reset by peer"), FailureCategory::Unknown);
    }

    #[tokio::test]
    async fn backoff_sleep_rate_limit_uses_reset_when_known() {
        let now = chrono::Utc::now().timestamp();
        let start = tokio::time::Instant::now();
        backoff_sleep(FailureCategory::RateLimit, Some(now)).await;
        // reset == now => (reset - now).max(0) + 10 == 10s floor, not the 60s default branch.
        assert!(start.elapsed() < Duration::from_secs(15));
    }

    #[tokio::test]
    async fn with_retry_probes_reset_only_on_rate_limit_failures() {
        let probe_calls = AtomicUsize::new(0);
        let attempts = AtomicUsize::new(0);
        let result: Result<i32> = with_retry(
            || {
                let attempts = &attempts;
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        Err(RecoveryError::Repository("transient rate limit hit".to_string()))
                    } else {
                        Ok(7)
                    }
                }
            },
            || {
                let probe_calls = &probe_calls;
                async move {
                    probe_calls.fetch_add(1, Ordering::SeqCst);
                    None
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(probe_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bisect_empty_input_short_circuits() {
        let shas: Vec<ObjectId> = Vec::new();
        let fetch = |_: &[ObjectId]| -> BoxedBisectFuture<'_, i32> { Box::pin(async { Ok(Vec::new()) }) };
        let result = bisect(&shas, false, &fetch).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn bisect_recurses_past_a_single_bad_entry() {
        let shas: Vec<ObjectId> = (0..4).map(|i| ObjectId::from_str(&i.to_string().repeat(40)).unwrap()).collect();
        let bad = shas[2];
        let fetch = move |batch: &[ObjectId]| -> BoxedBisectFuture<'_, i32> {
            let batch = batch.to_vec();
            Box::pin(async move {
                if batch.contains(&bad) && batch.len() > 1 {
                    return Err(RecoveryError::Repository("boom".to_string()));
                }
                Ok(batch
                    .iter()
                    .map(|sha| if *sha == bad { None } else { Some(1) })
                    .collect())
            })
        };
        let result = bisect(&shas, false, &fetch).await.unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(result[2], None);
        assert_eq!(result.iter().filter(|v| v.is_some()).count(), 3);
    }

    #[tokio::test]
    async fn dispatch_bounded_preserves_input_order() {
        let items = vec![5, 1, 4, 2, 3];
        let result = dispatch_bounded(items.clone(), 2, |n| async move {
            tokio::time::sleep(Duration::from_millis(n)).await;
            Ok(n)
        })
        .await
        .unwrap();
        assert_eq!(result, items);
    }

    #[tokio::test]
    async fn dispatch_bounded_caps_concurrent_calls() {
        let in_flight = std::sync::Arc::new(AtomicUsize::new(0));
        let max_observed = std::sync::Arc::new(AtomicUsize::new(0));

        dispatch_bounded(0..8, 3, |_| {
            let in_flight = in_flight.clone();
            let max_observed = max_observed.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_observed.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<(), RecoveryError>(())
            }
        })
        .await
        .unwrap();

        assert!(max_observed.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn dispatch_bounded_surfaces_first_error() {
        let result: Result<Vec<i32>> = dispatch_bounded(0..4, 2, |n| async move {
            if n == 2 {
                Err(RecoveryError::Repository("boom".to_string()))
            } else {
                Ok(n)
            }
        })
        .await;
        assert!(result.is_err());
    }
}
