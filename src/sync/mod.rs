//! Sync repository: remote playlist in, live cached playlist out.
//!
//! Reads never touch the network. `refresh` is all-or-nothing: either the whole
//! fetched playlist is committed to the local store, or the store is left as it was
//! and the network or storage error is returned unchanged.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::LocalStore;
use crate::errors::{AppError, NetworkError};
use crate::models::{
    as_domain_models, Coin, NetworkCoinContainer, RefreshOutcome, RevisionInfo, StoreSnapshot,
};
use crate::remote::RemoteSource;

/// Retry behaviour for transient fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry; doubled each time
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Single attempt, no retry.
    pub const NONE: RetryPolicy = RetryPolicy {
        max_retries: 0,
        backoff: Duration::ZERO,
    };

    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    fn delay_for(&self, retry: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::NONE
    }
}

/// Live view of the cached playlist in domain form.
#[derive(Debug, Clone)]
pub struct LiveCoins {
    rx: watch::Receiver<StoreSnapshot>,
}

impl LiveCoins {
    pub fn new(rx: watch::Receiver<StoreSnapshot>) -> Self {
        Self { rx }
    }

    /// Current playlist.
    #[cfg(test)]
    pub fn current(&self) -> Vec<Coin> {
        as_domain_models(&self.rx.borrow().coins)
    }

    /// Revision of the current playlist (0 until the first successful refresh).
    pub fn revision_id(&self) -> i64 {
        self.rx.borrow().revision_id
    }

    /// Current playlist together with its revision, read from one snapshot.
    pub fn current_at_revision(&self) -> (Vec<Coin>, i64) {
        let snapshot = self.rx.borrow();
        (as_domain_models(&snapshot.coins), snapshot.revision_id)
    }

    pub fn revision_info(&self) -> RevisionInfo {
        let snapshot = self.rx.borrow();
        RevisionInfo {
            revision_id: snapshot.revision_id,
            item_count: snapshot.len(),
        }
    }

    /// Wait for the next committed playlist. Returns `None` once the store is gone.
    #[cfg(test)]
    pub async fn changed(&mut self) -> Option<Vec<Coin>> {
        self.rx.changed().await.ok()?;
        Some(as_domain_models(&self.rx.borrow_and_update().coins))
    }
}

/// Bridges a [`RemoteSource`] and a [`LocalStore`].
pub struct SyncRepository {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteSource>,
    retry: RetryPolicy,
}

impl SyncRepository {
    pub fn new(store: Arc<dyn LocalStore>, remote: Arc<dyn RemoteSource>) -> Self {
        Self {
            store,
            remote,
            retry: RetryPolicy::NONE,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The cached playlist as a live sequence.
    pub fn coins(&self) -> LiveCoins {
        LiveCoins::new(self.store.observe_all())
    }

    /// Fetch the remote playlist and replace the cache with it.
    pub async fn refresh(&self) -> Result<RefreshOutcome, AppError> {
        let container = self.fetch_with_retry().await?;
        let rows = container.as_database_model();

        let snapshot = self.store.replace_all(rows).await?;
        if snapshot.is_empty() {
            tracing::warn!("Remote playlist is empty; offline cache cleared");
        }

        tracing::info!(
            "Playlist refreshed: {} coins at revision {}",
            snapshot.len(),
            snapshot.revision_id
        );
        Ok(RefreshOutcome {
            item_count: snapshot.len(),
            revision_id: snapshot.revision_id,
        })
    }

    /// Run [`refresh`](Self::refresh) on the runtime's worker pool.
    ///
    /// Await the handle for the result, or drop it to let the refresh finish in the
    /// background.
    pub fn spawn_refresh(self: &Arc<Self>) -> JoinHandle<Result<RefreshOutcome, AppError>> {
        let repo = Arc::clone(self);
        tokio::spawn(async move { repo.refresh().await })
    }

    async fn fetch_with_retry(&self) -> Result<NetworkCoinContainer, NetworkError> {
        let mut retry = 0;
        loop {
            match self.remote.fetch_all().await {
                Ok(container) => return Ok(container),
                Err(err) if err.kind.is_transient() && retry < self.retry.max_retries => {
                    let delay = self.retry.delay_for(retry);
                    retry += 1;
                    tracing::warn!(
                        "Playlist fetch failed ({}), retry {}/{} in {:?}",
                        err,
                        retry,
                        self.retry.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::warn!("Playlist fetch failed: {}", err);
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::errors::NetworkErrorKind;
    use crate::testing::{container, open_store, ScriptedRemote};
    use tempfile::TempDir;

    async fn repo_with(
        temp_dir: &TempDir,
        remote: Arc<ScriptedRemote>,
    ) -> (Arc<SyncRepository>, SqliteStore) {
        let store = open_store(temp_dir).await;
        let repo = SyncRepository::new(Arc::new(store.clone()), remote);
        (Arc::new(repo), store)
    }

    #[tokio::test]
    async fn test_refresh_single_item_drops_captions() {
        let temp_dir = TempDir::new().unwrap();
        let remote = Arc::new(ScriptedRemote::new(vec![Ok(container(&[(
            "T1", "D1", "u1", "2020", "th1",
        )]))]));
        let (repo, _store) = repo_with(&temp_dir, remote).await;

        let outcome = repo.refresh().await.unwrap();
        assert_eq!(outcome.item_count, 1);

        let coins = repo.coins().current();
        assert_eq!(
            coins,
            vec![Coin {
                title: "T1".to_string(),
                description: "D1".to_string(),
                url: "u1".to_string(),
                updated: "2020".to_string(),
                thumbnail: "th1".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_refresh_empty_payload_clears_cache() {
        let temp_dir = TempDir::new().unwrap();
        let remote = Arc::new(ScriptedRemote::new(vec![
            Ok(container(&[("T1", "D1", "u1", "2020", "th1")])),
            Ok(container(&[])),
        ]));
        let (repo, _store) = repo_with(&temp_dir, remote).await;

        repo.refresh().await.unwrap();
        assert_eq!(repo.coins().current().len(), 1);

        let outcome = repo.refresh().await.unwrap();
        assert_eq!(outcome.item_count, 0);
        assert!(repo.coins().current().is_empty());
    }

    #[tokio::test]
    async fn test_network_failure_leaves_cache_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let remote = Arc::new(ScriptedRemote::new(vec![
            Ok(container(&[("T1", "D1", "u1", "2020", "th1")])),
            Err(NetworkError::timeout("timeout")),
        ]));
        let (repo, store) = repo_with(&temp_dir, remote).await;

        repo.refresh().await.unwrap();
        let before = store.load_snapshot().await.unwrap();
        let coins_before = repo.coins().current();

        let err = repo.refresh().await.unwrap_err();
        match err {
            AppError::Network(e) => {
                assert_eq!(e.kind, NetworkErrorKind::Timeout);
                assert_eq!(e.message, "timeout");
            }
            other => panic!("expected network error, got {:?}", other),
        }

        assert_eq!(store.load_snapshot().await.unwrap(), before);
        assert_eq!(repo.coins().current(), coins_before);
    }

    #[tokio::test]
    async fn test_storage_failure_propagates() {
        let temp_dir = TempDir::new().unwrap();
        let remote = Arc::new(ScriptedRemote::new(vec![Ok(container(&[(
            "T1", "D1", "u1", "2020", "th1",
        )]))]));
        let (repo, store) = repo_with(&temp_dir, remote).await;

        store.close().await;
        let err = repo.refresh().await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert!(repo.coins().current().is_empty());
    }

    #[tokio::test]
    async fn test_cache_reflects_last_successful_refresh() {
        let temp_dir = TempDir::new().unwrap();
        let remote = Arc::new(ScriptedRemote::new(vec![
            Ok(container(&[("A", "d", "ua", "2020", "t")])),
            Err(NetworkError::unreachable("offline")),
            Err(NetworkError::malformed("garbage")),
            Ok(container(&[("B", "d", "ub", "2021", "t"), ("C", "d", "uc", "2022", "t")])),
            Err(NetworkError::timeout("slow")),
        ]));
        let (repo, _store) = repo_with(&temp_dir, remote).await;

        let mut expected = Vec::new();
        for _ in 0..5 {
            if repo.refresh().await.is_ok() {
                expected = repo.coins().current();
            }
            assert_eq!(repo.coins().current(), expected);
        }
        let titles: Vec<_> = expected.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "C"]);
        assert_eq!(repo.coins().revision_id(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_land_one_payload() {
        let temp_dir = TempDir::new().unwrap();
        let first = container(&[("A1", "d", "a1", "2020", "t"), ("A2", "d", "a2", "2020", "t")]);
        let second = container(&[("B1", "d", "b1", "2021", "t")]);
        let remote = Arc::new(ScriptedRemote::new(vec![
            Ok(first.clone()),
            Ok(second.clone()),
        ]));
        let (repo, _store) = repo_with(&temp_dir, remote).await;

        let (a, b) = tokio::join!(repo.spawn_refresh(), repo.spawn_refresh());
        a.unwrap().unwrap();
        b.unwrap().unwrap();

        let coins = repo.coins().current();
        assert!(coins == first.as_domain_model() || coins == second.as_domain_model());
    }

    #[tokio::test]
    async fn test_readers_never_see_mixed_payloads() {
        let temp_dir = TempDir::new().unwrap();
        let batch = |prefix: &str| {
            let rows: Vec<(String, String)> = (0..20)
                .map(|i| (format!("{}{}", prefix, i), format!("https://x/{}{}", prefix, i)))
                .collect();
            let refs: Vec<(&str, &str, &str, &str, &str)> = rows
                .iter()
                .map(|(t, u)| (t.as_str(), "d", u.as_str(), "2020", "t"))
                .collect();
            container(&refs)
        };
        let script = (0..10)
            .map(|i| Ok(batch(if i % 2 == 0 { "A" } else { "B" })))
            .collect();
        let remote = Arc::new(ScriptedRemote::new(script));
        let (repo, _store) = repo_with(&temp_dir, remote).await;

        let mut live = repo.coins();
        let reader = tokio::spawn(async move {
            let mut seen = 0;
            // watch coalesces notifications, so stop once writes go quiet.
            while let Ok(Some(coins)) =
                tokio::time::timeout(Duration::from_millis(500), live.changed()).await
            {
                assert_eq!(coins.len(), 20);
                let prefix = &coins[0].title[..1];
                assert!(coins.iter().all(|c| c.title.starts_with(prefix)));
                seen += 1;
            }
            seen
        });

        let handles: Vec<_> = (0..10).map(|_| repo.spawn_refresh()).collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let seen = reader.await.unwrap();
        assert!(seen >= 1);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_timeout() {
        let temp_dir = TempDir::new().unwrap();
        let remote = Arc::new(ScriptedRemote::new(vec![
            Err(NetworkError::timeout("slow")),
            Err(NetworkError::unreachable("offline")),
            Ok(container(&[("T1", "D1", "u1", "2020", "th1")])),
        ]));
        let store = open_store(&temp_dir).await;
        let repo = SyncRepository::new(Arc::new(store), remote.clone())
            .with_retry(RetryPolicy::new(2, Duration::from_millis(1)));

        let outcome = repo.refresh().await.unwrap();
        assert_eq!(outcome.item_count, 1);
        assert_eq!(remote.calls(), 3);
    }

    #[tokio::test]
    async fn test_retry_skips_malformed_payload() {
        let temp_dir = TempDir::new().unwrap();
        let remote = Arc::new(ScriptedRemote::new(vec![
            Err(NetworkError::malformed("bad json")),
            Ok(container(&[("T1", "D1", "u1", "2020", "th1")])),
        ]));
        let store = open_store(&temp_dir).await;
        let repo = SyncRepository::new(Arc::new(store), remote.clone())
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1)));

        let err = repo.refresh().await.unwrap_err();
        assert!(matches!(err, AppError::Network(ref e) if e.kind == NetworkErrorKind::Malformed));
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let temp_dir = TempDir::new().unwrap();
        let remote = Arc::new(ScriptedRemote::new(vec![
            Err(NetworkError::timeout("slow")),
            Ok(container(&[("T1", "D1", "u1", "2020", "th1")])),
        ]));
        let (repo, _store) = repo_with(&temp_dir, remote.clone()).await;

        assert!(repo.refresh().await.is_err());
        assert_eq!(remote.calls(), 1);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }
}
