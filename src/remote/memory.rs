//! In-memory cloud mirror
//!
//! A process-local `RemoteStore` holding one collection per user, with an
//! append-only change log. Backs the test suite and offline development;
//! several sessions sharing one instance behave like devices sharing one
//! cloud account.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Mutex};

use super::{ChangeBatch, ChangeFeed, RemoteChange, RemoteStore};
use crate::config::{CHANGE_FEED_CHANNEL_CAPACITY, REMOTE_BROADCAST_CAPACITY};
use crate::database::Item;
use crate::error::Result;

#[derive(Default)]
pub struct MemoryRemoteStore {
    users: Arc<Mutex<HashMap<String, UserCollection>>>,
}

struct UserCollection {
    documents: HashMap<String, Item>,
    log: Vec<(i64, RemoteChange)>,
    next_cursor: i64,
    updates: broadcast::Sender<ChangeBatch>,
}

impl UserCollection {
    fn new() -> Self {
        let (updates, _) = broadcast::channel(REMOTE_BROADCAST_CAPACITY);
        Self {
            documents: HashMap::new(),
            log: Vec::new(),
            next_cursor: 1,
            updates,
        }
    }

    /// Append a change to the log and fan it out to live subscribers
    fn record(&mut self, change: RemoteChange) {
        let cursor = self.next_cursor;
        self.next_cursor += 1;
        self.log.push((cursor, change.clone()));

        let _ = self.updates.send(ChangeBatch {
            cursor,
            changes: vec![change],
        });
    }

    /// Everything recorded after `since`, as one batch at the log head
    fn replay_since(&self, since: i64) -> ChangeBatch {
        let changes = self
            .log
            .iter()
            .filter(|(cursor, _)| *cursor > since)
            .map(|(_, change)| change.clone())
            .collect();

        ChangeBatch {
            cursor: self.next_cursor - 1,
            changes,
        }
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current remote copy of an item, if any
    pub async fn item(&self, user_id: &str, item_id: &str) -> Option<Item> {
        let users = self.users.lock().await;
        users
            .get(user_id)
            .and_then(|user| user.documents.get(item_id))
            .cloned()
    }

    /// Number of documents in a user's collection
    pub async fn item_count(&self, user_id: &str) -> usize {
        let users = self.users.lock().await;
        users.get(user_id).map_or(0, |user| user.documents.len())
    }

    /// How many upserts of an item were recorded in the change log
    pub async fn recorded_upserts(&self, user_id: &str, item_id: &str) -> usize {
        let users = self.users.lock().await;
        users.get(user_id).map_or(0, |user| {
            user.log
                .iter()
                .filter(|(_, change)| {
                    matches!(change, RemoteChange::Upsert { item } if item.id == item_id)
                })
                .count()
        })
    }

    /// How many deletes of an item were recorded in the change log
    pub async fn recorded_deletes(&self, user_id: &str, item_id: &str) -> usize {
        let users = self.users.lock().await;
        users.get(user_id).map_or(0, |user| {
            user.log
                .iter()
                .filter(|(_, change)| {
                    matches!(change, RemoteChange::Delete { id } if id == item_id)
                })
                .count()
        })
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn upsert(&self, user_id: &str, item: &Item) -> Result<()> {
        let mut users = self.users.lock().await;
        let user = users
            .entry(user_id.to_string())
            .or_insert_with(UserCollection::new);

        user.documents.insert(item.id.clone(), item.clone());
        user.record(RemoteChange::Upsert { item: item.clone() });

        Ok(())
    }

    async fn delete(&self, user_id: &str, item_id: &str) -> Result<()> {
        let mut users = self.users.lock().await;
        let user = users
            .entry(user_id.to_string())
            .or_insert_with(UserCollection::new);

        user.documents.remove(item_id);
        user.record(RemoteChange::Delete {
            id: item_id.to_string(),
        });

        Ok(())
    }

    async fn subscribe(&self, user_id: &str, since: i64) -> Result<ChangeFeed> {
        let (tx, rx) = mpsc::channel(CHANGE_FEED_CHANNEL_CAPACITY);

        // Snapshot the backlog and attach to the live feed under one lock
        // so no change can fall between the two.
        let (snapshot, mut live) = {
            let mut users = self.users.lock().await;
            let user = users
                .entry(user_id.to_string())
                .or_insert_with(UserCollection::new);
            (user.replay_since(since), user.updates.subscribe())
        };

        let users = self.users.clone();
        let user_id = user_id.to_string();

        tokio::spawn(async move {
            let mut seen = snapshot.cursor;
            if tx.send(snapshot).await.is_err() {
                return;
            }

            loop {
                // Notice a dropped subscriber right away rather than on
                // the next change for this user
                let received = tokio::select! {
                    received = live.recv() => received,
                    _ = tx.closed() => break,
                };

                match received {
                    Ok(batch) => {
                        // The snapshot may already cover early broadcasts
                        if batch.cursor <= seen {
                            continue;
                        }
                        seen = batch.cursor;
                        if tx.send(batch).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "Change feed for user {} lagged by {} updates, resyncing from log",
                            user_id,
                            skipped
                        );
                        let resync = {
                            let users = users.lock().await;
                            users.get(&user_id).map(|user| user.replay_since(seen))
                        };
                        if let Some(batch) = resync {
                            seen = batch.cursor;
                            if tx.send(batch).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(rx)
    }
}
