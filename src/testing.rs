//! Test doubles shared by unit and integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::db::{init_database, SqliteStore};
use crate::errors::NetworkError;
use crate::models::{NetworkCoin, NetworkCoinContainer};
use crate::remote::RemoteSource;

/// Build a wire payload from `(title, description, url, updated, thumbnail)` tuples.
pub fn container(items: &[(&str, &str, &str, &str, &str)]) -> NetworkCoinContainer {
    NetworkCoinContainer {
        coins: items
            .iter()
            .map(|(title, description, url, updated, thumbnail)| NetworkCoin {
                title: title.to_string(),
                description: description.to_string(),
                url: url.to_string(),
                updated: updated.to_string(),
                thumbnail: thumbnail.to_string(),
                closed_captions: Some(format!("{} captions", title)),
            })
            .collect(),
    }
}

pub async fn open_store(temp_dir: &TempDir) -> SqliteStore {
    let pool = init_database(&temp_dir.path().join("coins.sqlite"))
        .await
        .expect("Failed to init DB");
    SqliteStore::open(pool).await.expect("Failed to open store")
}

/// Remote source that replays a fixed script of responses, one per call.
pub struct ScriptedRemote {
    script: Mutex<VecDeque<Result<NetworkCoinContainer, NetworkError>>>,
    calls: AtomicUsize,
    delay: Duration,
    call_delays: Vec<Duration>,
}

impl ScriptedRemote {
    pub fn new(script: Vec<Result<NetworkCoinContainer, NetworkError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            call_delays: Vec::new(),
        }
    }

    /// Hold every response for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Hold the n-th response for `delays[n]`; later calls use the common delay.
    pub fn with_call_delays(mut self, delays: Vec<Duration>) -> Self {
        self.call_delays = delays;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSource for ScriptedRemote {
    async fn fetch_all(&self) -> Result<NetworkCoinContainer, NetworkError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(NetworkError::unreachable("script exhausted")));
        let delay = self.call_delays.get(call).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        next
    }
}
