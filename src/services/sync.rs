//! Sync service
//!
//! Background reconciliation between the local store and the cloud mirror.
//! One flusher task drains the outbox (woken by local writes, with an
//! interval fallback for retries) and one listener task applies the remote
//! change feed. Remote failures are logged and retried; they never fail a
//! local operation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::{OUTBOX_FLUSH_BATCH, OUTBOX_FLUSH_INTERVAL_MS};
use crate::database::{Item, ItemRepository, OutboxEntry, OutboxOp};
use crate::error::{AppError, Result};
use crate::remote::{ChangeBatch, RemoteChange, RemoteStore};

/// Service reconciling the local store with the cloud mirror
#[derive(Clone)]
pub struct SyncService {
    repo: ItemRepository,
    remote: Arc<dyn RemoteStore>,
    outbox_wakeup: Arc<Notify>,
}

/// Running sync tasks for one signed-in user.
///
/// Cancelling (or dropping) the handle aborts both tasks: nothing further
/// is pushed or applied, though queued pushes stay in the outbox for the
/// next start.
pub struct SyncHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl SyncHandle {
    pub fn cancel(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl SyncService {
    pub fn new(repo: ItemRepository, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            repo,
            remote,
            outbox_wakeup: Arc::new(Notify::new()),
        }
    }

    /// Wakeup shared with the items service; notifying it schedules an
    /// immediate flush pass instead of waiting for the interval.
    pub fn outbox_wakeup(&self) -> Arc<Notify> {
        self.outbox_wakeup.clone()
    }

    /// Start pushing and listening for one user
    pub fn start(&self, user_id: &str) -> SyncHandle {
        tracing::info!("Starting cloud sync for user: {}", user_id);

        let flusher = tokio::spawn(self.clone().run_flusher(user_id.to_string()));
        let listener = tokio::spawn(self.clone().run_listener(user_id.to_string()));

        SyncHandle {
            tasks: vec![flusher, listener],
        }
    }

    /// Deliver queued pushes, oldest first, until the outbox is empty or a
    /// delivery fails. Returns how many pushes were delivered.
    ///
    /// A failed delivery keeps its entry queued for a later pass.
    /// Malformed entries are dropped; retrying cannot repair them and one
    /// bad row must not wedge the queue.
    pub async fn flush_outbox(&self, user_id: &str) -> Result<usize> {
        let mut pushed = 0;

        loop {
            let pending = self.repo.pending_outbox(OUTBOX_FLUSH_BATCH).await?;
            if pending.is_empty() {
                break;
            }

            for entry in pending {
                let change = match decode_entry(&entry) {
                    Ok(change) => change,
                    Err(e) => {
                        tracing::warn!(
                            "Dropping malformed queued push for item {}: {}",
                            entry.item_id,
                            e
                        );
                        self.repo.remove_outbox_entry(entry.seq).await?;
                        continue;
                    }
                };

                if let Err(e) = self.deliver(user_id, &change).await {
                    tracing::warn!(
                        "Push of item {} failed (attempt {}): {}",
                        entry.item_id,
                        entry.attempts + 1,
                        e
                    );
                    self.repo.record_outbox_attempt(entry.seq).await?;
                    return Ok(pushed);
                }

                self.repo.remove_outbox_entry(entry.seq).await?;
                pushed += 1;
            }
        }

        Ok(pushed)
    }

    async fn deliver(&self, user_id: &str, change: &RemoteChange) -> Result<()> {
        match change {
            RemoteChange::Upsert { item } => self.remote.upsert(user_id, item).await,
            RemoteChange::Delete { id } => self.remote.delete(user_id, id).await,
        }
    }

    /// Apply one change-feed batch to the local store and persist its
    /// cursor. Returns how many changes were applied (stale copies lose
    /// against the local row and are skipped).
    async fn apply_batch(&self, user_id: &str, batch: ChangeBatch) -> Result<usize> {
        let cursor = batch.cursor;
        let mut applied = 0;

        for change in batch.changes {
            match change {
                RemoteChange::Upsert { item } => {
                    if self.repo.apply_remote_upsert(&item).await? {
                        applied += 1;
                    } else {
                        tracing::debug!("Skipped stale remote copy of item {}", item.id);
                    }
                }
                RemoteChange::Delete { id } => {
                    if self.repo.apply_remote_delete(&id).await? {
                        applied += 1;
                    }
                }
            }
        }

        self.repo.set_sync_cursor(user_id, cursor).await?;

        Ok(applied)
    }

    async fn run_flusher(self, user_id: String) {
        tracing::info!("Starting outbox flusher for user: {}", user_id);

        // Deliver anything queued while offline or signed out
        self.flush_and_log(&user_id).await;

        loop {
            tokio::select! {
                _ = self.outbox_wakeup.notified() => {}
                _ = tokio::time::sleep(Duration::from_millis(OUTBOX_FLUSH_INTERVAL_MS)) => {}
            }

            self.flush_and_log(&user_id).await;
        }
    }

    async fn flush_and_log(&self, user_id: &str) {
        match self.flush_outbox(user_id).await {
            Ok(0) => {}
            Ok(pushed) => tracing::debug!("Pushed {} queued changes", pushed),
            Err(e) => tracing::warn!("Outbox flush failed: {}", e),
        }
    }

    async fn run_listener(self, user_id: String) {
        let since = match self.repo.sync_cursor(&user_id).await {
            Ok(cursor) => cursor,
            Err(e) => {
                tracing::warn!("Failed to load sync cursor for user {}: {}", user_id, e);
                0
            }
        };

        let mut feed = match self.remote.subscribe(&user_id, since).await {
            Ok(feed) => feed,
            Err(e) => {
                tracing::warn!("Remote subscription failed for user {}: {}", user_id, e);
                return;
            }
        };

        tracing::info!(
            "Listening for remote changes (user: {}, cursor: {})",
            user_id,
            since
        );

        while let Some(batch) = feed.recv().await {
            match self.apply_batch(&user_id, batch).await {
                Ok(0) => {}
                Ok(applied) => tracing::debug!("Reconciled {} remote changes", applied),
                Err(e) => tracing::warn!("Failed to apply remote changes: {}", e),
            }
        }

        tracing::debug!("Remote change feed ended for user: {}", user_id);
    }
}

/// Turn a stored outbox row back into the change it represents
fn decode_entry(entry: &OutboxEntry) -> Result<RemoteChange> {
    match entry.op {
        OutboxOp::Upsert => {
            let payload = entry.payload.as_deref().ok_or_else(|| {
                AppError::Sync(format!(
                    "queued upsert for item {} has no payload",
                    entry.item_id
                ))
            })?;
            let item: Item = serde_json::from_str(payload)?;
            Ok(RemoteChange::Upsert { item })
        }
        OutboxOp::Delete => Ok(RemoteChange::Delete {
            id: entry.item_id.clone(),
        }),
    }
}
