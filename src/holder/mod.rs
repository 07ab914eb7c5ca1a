//! Presentation state holder.
//!
//! Owns the consumer-facing playlist and drives exactly one refresh when created.
//! Refresh failures are logged and published on a status channel instead of being
//! raised to playlist readers, who keep seeing the last cached playlist.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::{oneshot, watch};
use tokio::task::AbortHandle;

use crate::errors::AppError;
use crate::models::{RefreshOutcome, RefreshStatus};
use crate::sync::{LiveCoins, SyncRepository};

type RefreshReply = oneshot::Sender<Result<RefreshOutcome, AppError>>;

pub struct PlaylistHolder {
    repo: Arc<SyncRepository>,
    playlist: LiveCoins,
    status: Arc<StatusBoard>,
    refreshes: Mutex<RefreshTasks>,
}

/// Refresh tasks owned by the holder; all of them are aborted on shutdown.
#[derive(Default)]
struct RefreshTasks {
    handles: Vec<AbortHandle>,
    closed: bool,
}

impl PlaylistHolder {
    /// Create the holder and start its one automatic refresh in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(repo: Arc<SyncRepository>) -> Self {
        let holder = Self {
            playlist: repo.coins(),
            repo,
            status: Arc::new(StatusBoard::new()),
            refreshes: Mutex::new(RefreshTasks::default()),
        };
        holder.launch(None);
        holder
    }

    /// The cached playlist, forwarded unchanged from the repository.
    pub fn playlist(&self) -> LiveCoins {
        self.playlist.clone()
    }

    /// Outcome of the most recent refresh.
    pub fn status(&self) -> RefreshStatus {
        self.status.tx.borrow().clone()
    }

    #[cfg(test)]
    pub fn watch_status(&self) -> watch::Receiver<RefreshStatus> {
        self.status.tx.subscribe()
    }

    /// Run a refresh on request and wait for its outcome.
    ///
    /// The refresh and its status update run in holder-owned tasks, so dropping
    /// the returned future does not stop either of them.
    pub async fn refresh_now(&self) -> Result<RefreshOutcome, AppError> {
        let (reply, outcome) = oneshot::channel();
        if !self.launch(Some(reply)) {
            return Err(AppError::Internal(
                "Playlist holder is shut down".to_string(),
            ));
        }
        outcome.await.unwrap_or_else(|_| {
            Err(AppError::Internal(
                "Playlist refresh was cancelled".to_string(),
            ))
        })
    }

    /// Cancel every in-flight refresh and refuse new ones.
    pub fn shutdown(&self) {
        let mut tasks = lock(&self.refreshes);
        tasks.closed = true;
        if tasks.handles.iter().any(|task| !task.is_finished()) {
            tracing::info!("Cancelling in-flight playlist refresh");
        }
        for task in tasks.handles.drain(..) {
            task.abort();
        }
    }

    /// Start a refresh whose outcome is recorded on the status channel and, if
    /// `reply` is given, sent back to the requester. Returns `false` after shutdown.
    fn launch(&self, reply: Option<RefreshReply>) -> bool {
        let mut tasks = lock(&self.refreshes);
        if tasks.closed {
            return false;
        }

        let ticket = self.status.begin();
        let refresh = self.repo.spawn_refresh();
        let fetch = refresh.abort_handle();
        let status = Arc::clone(&self.status);
        let recorder = tokio::spawn(async move {
            let result = refresh.await.unwrap_or_else(|e| Err(e.into()));
            status.finish(ticket, &result);
            if let Some(reply) = reply {
                // Requester may be gone; the outcome is already recorded.
                let _ = reply.send(result);
            }
        });

        tasks.handles.retain(|task| !task.is_finished());
        // Recorder first, so an aborted fetch is never recorded as a failure.
        tasks.handles.push(recorder.abort_handle());
        tasks.handles.push(fetch);
        true
    }
}

impl Drop for PlaylistHolder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Status side channel.
///
/// Every refresh takes a ticket when it starts; an outcome is published only if
/// no later refresh has started since, so a slow refresh cannot overwrite a newer one.
struct StatusBoard {
    tx: watch::Sender<RefreshStatus>,
    latest: Mutex<u64>,
}

impl StatusBoard {
    fn new() -> Self {
        Self {
            tx: watch::channel(RefreshStatus::Running).0,
            latest: Mutex::new(0),
        }
    }

    fn begin(&self) -> u64 {
        let mut latest = lock(&self.latest);
        *latest += 1;
        self.tx.send_replace(RefreshStatus::Running);
        *latest
    }

    fn finish(&self, ticket: u64, result: &Result<RefreshOutcome, AppError>) {
        let finished_at = Utc::now().to_rfc3339();
        let next = match result {
            Ok(outcome) => RefreshStatus::Succeeded {
                item_count: outcome.item_count,
                revision_id: outcome.revision_id,
                finished_at,
            },
            Err(err) => {
                tracing::error!("Playlist refresh failed, serving cached playlist: {}", err);
                RefreshStatus::Failed {
                    code: err.error_code().to_string(),
                    message: err.message(),
                    finished_at,
                }
            }
        };

        let latest = lock(&self.latest);
        if ticket < *latest {
            tracing::debug!(
                "Refresh #{} finished after #{} started; status left unchanged",
                ticket,
                *latest
            );
            return;
        }
        self.tx.send_replace(next);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
