//! Snapshot and status models published to playlist observers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::DatabaseCoin;

/// Full contents of the offline cache at one committed revision.
///
/// Cloning is cheap; the rows are shared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    /// Revision of the `replace_all` that produced this snapshot (0 = never written)
    pub revision_id: i64,
    pub coins: Arc<Vec<DatabaseCoin>>,
}

impl StoreSnapshot {
    pub fn new(revision_id: i64, coins: Vec<DatabaseCoin>) -> Self {
        Self {
            revision_id,
            coins: Arc::new(coins),
        }
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }
}

/// Revision information for change detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub revision_id: i64,
    pub item_count: usize,
}

/// Result of a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub item_count: usize,
    pub revision_id: i64,
}

/// Last known state of the refresh side channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum RefreshStatus {
    /// A refresh is in flight
    Running,
    /// The last refresh committed a new playlist
    #[serde(rename_all = "camelCase")]
    Succeeded {
        item_count: usize,
        revision_id: i64,
        finished_at: String,
    },
    /// The last refresh failed; the cache still holds the previous playlist
    #[serde(rename_all = "camelCase")]
    Failed {
        code: String,
        message: String,
        finished_at: String,
    },
}

impl RefreshStatus {
    #[cfg(test)]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RefreshStatus::Succeeded { .. } | RefreshStatus::Failed { .. }
        )
    }
}
