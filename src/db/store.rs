//! Local store for the cached playlist.
//!
//! Writes replace the whole collection inside one transaction and are serialized by
//! a store-owned lock. Every committed write is published on a `watch` channel, so
//! observers always hold one complete snapshot.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tokio::sync::{watch, Mutex};

use crate::errors::StorageError;
use crate::models::{DatabaseCoin, RevisionInfo, StoreSnapshot};

/// Durable storage for the playlist.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Subscribe to the cached playlist.
    ///
    /// The receiver holds the current snapshot immediately and is notified after
    /// every committed `replace_all`.
    fn observe_all(&self) -> watch::Receiver<StoreSnapshot>;

    /// Replace the cached playlist with `coins` and return the committed snapshot.
    ///
    /// A write that has started runs to completion even if the returned future is
    /// dropped.
    async fn replace_all(&self, coins: Vec<DatabaseCoin>) -> Result<StoreSnapshot, StorageError>;
}

/// SQLite-backed [`LocalStore`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
    publisher: Arc<watch::Sender<StoreSnapshot>>,
}

impl SqliteStore {
    /// Open the store over an initialized pool, seeding observers with the rows
    /// already on disk.
    pub async fn open(pool: SqlitePool) -> Result<Self, StorageError> {
        let snapshot = load_snapshot(&pool).await?;
        tracing::debug!(
            "Opened offline cache at revision {} with {} coins",
            snapshot.revision_id,
            snapshot.len()
        );
        let (publisher, _) = watch::channel(snapshot);

        Ok(Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
            publisher: Arc::new(publisher),
        })
    }

    /// Latest published snapshot.
    #[cfg(test)]
    pub fn snapshot(&self) -> StoreSnapshot {
        self.publisher.borrow().clone()
    }

    /// Revision and size of the latest published snapshot.
    pub fn revision_info(&self) -> RevisionInfo {
        let snapshot = self.publisher.borrow();
        RevisionInfo {
            revision_id: snapshot.revision_id,
            item_count: snapshot.len(),
        }
    }

    /// Read the playlist straight from disk, bypassing the published snapshot.
    #[cfg(test)]
    pub async fn load_snapshot(&self) -> Result<StoreSnapshot, StorageError> {
        load_snapshot(&self.pool).await
    }

    /// Close the underlying pool. Later writes fail with a storage error.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn write_all(&self, coins: Vec<DatabaseCoin>) -> Result<StoreSnapshot, StorageError> {
        let _guard = self.write_lock.lock().await;

        let mut tx = self.pool.begin().await?;

        // Clear first so coins dropped upstream do not linger.
        sqlx::query("DELETE FROM coins").execute(&mut *tx).await?;

        for coin in &coins {
            sqlx::query(
                "INSERT OR REPLACE INTO coins (title, description, url, updated, thumbnail) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&coin.title)
            .bind(&coin.description)
            .bind(&coin.url)
            .bind(&coin.updated)
            .bind(&coin.thumbnail)
            .execute(&mut *tx)
            .await?;
        }

        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE meta SET revision_id = revision_id + 1, refreshed_at = ? WHERE id = 1")
            .bind(&now)
            .execute(&mut *tx)
            .await?;

        let revision_id: i64 = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&mut *tx)
            .await?
            .get("revision_id");

        let rows = sqlx::query(
            "SELECT title, description, url, updated, thumbnail FROM coins ORDER BY id",
        )
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let snapshot = StoreSnapshot::new(revision_id, rows.iter().map(coin_from_row).collect());
        self.publisher.send_replace(snapshot.clone());

        tracing::debug!(
            "Offline cache replaced: revision {} with {} coins",
            revision_id,
            snapshot.len()
        );
        Ok(snapshot)
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    fn observe_all(&self) -> watch::Receiver<StoreSnapshot> {
        self.publisher.subscribe()
    }

    async fn replace_all(&self, coins: Vec<DatabaseCoin>) -> Result<StoreSnapshot, StorageError> {
        // Detached so cancelling the caller cannot stop a write between commit and publish.
        let store = self.clone();
        tokio::spawn(async move { store.write_all(coins).await })
            .await
            .map_err(|e| StorageError::new(format!("Cache write task failed: {}", e)))?
    }
}

async fn load_snapshot(pool: &SqlitePool) -> Result<StoreSnapshot, StorageError> {
    let mut tx = pool.begin().await?;

    let revision_id: i64 = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
        .fetch_one(&mut *tx)
        .await?
        .get("revision_id");

    let rows =
        sqlx::query("SELECT title, description, url, updated, thumbnail FROM coins ORDER BY id")
            .fetch_all(&mut *tx)
            .await?;

    tx.commit().await?;

    Ok(StoreSnapshot::new(
        revision_id,
        rows.iter().map(coin_from_row).collect(),
    ))
}

fn coin_from_row(row: &sqlx::sqlite::SqliteRow) -> DatabaseCoin {
    DatabaseCoin {
        title: row.get("title"),
        description: row.get("description"),
        url: row.get("url"),
        updated: row.get("updated"),
        thumbnail: row.get("thumbnail"),
    }
}
