//! Cloud mirror interface
//!
//! Defines the abstract interface to the per-user remote item collection
//! plus the wire types shared by its implementations. The mirror is
//! best-effort: callers treat every operation as retryable and the local
//! store stays authoritative.

pub mod http;
pub mod memory;

pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::database::Item;
use crate::error::Result;

/// One change in a user's remote collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RemoteChange {
    Upsert { item: Item },
    Delete { id: String },
}

impl RemoteChange {
    /// ID of the item the change concerns
    pub fn item_id(&self) -> &str {
        match self {
            RemoteChange::Upsert { item } => &item.id,
            RemoteChange::Delete { id } => id,
        }
    }
}

/// A slice of the change feed.
///
/// `cursor` identifies the last change included; resubscribing with it
/// resumes the feed without replaying the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeBatch {
    pub cursor: i64,
    #[serde(default)]
    pub changes: Vec<RemoteChange>,
}

/// Receiving half of a change-feed subscription. The feed ends when the
/// subscription is dropped or the store shuts down.
pub type ChangeFeed = mpsc::Receiver<ChangeBatch>;

/// Per-user remote item collection
///
/// Implementations must be safe to share across tasks; the flusher and
/// listener call into the same store concurrently.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Write one item document, replacing any remote copy
    async fn upsert(&self, user_id: &str, item: &Item) -> Result<()>;

    /// Remove one item document. Deleting an absent document is not an
    /// error; deletes are idempotent.
    async fn delete(&self, user_id: &str, item_id: &str) -> Result<()>;

    /// Subscribe to the user's change feed, resuming after `since`.
    /// Passing 0 replays the user's full collection first.
    async fn subscribe(&self, user_id: &str, since: i64) -> Result<ChangeFeed>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_wire_format() {
        let delete = RemoteChange::Delete {
            id: "item-9".to_string(),
        };

        let json = serde_json::to_value(&delete).unwrap();
        assert_eq!(json["type"], "delete");
        assert_eq!(json["id"], "item-9");

        let batch: ChangeBatch = serde_json::from_str(r#"{"cursor":12}"#).unwrap();
        assert_eq!(batch.cursor, 12);
        assert!(batch.changes.is_empty());
    }

    #[test]
    fn test_upsert_embeds_camel_case_item() {
        let item: Item = serde_json::from_str(
            r#"{"id":"a","name":"Keys","createdAt":1,"updatedAt":2}"#,
        )
        .unwrap();
        let change = RemoteChange::Upsert { item };

        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["type"], "upsert");
        assert_eq!(json["item"]["updatedAt"], 2);
        assert_eq!(change.item_id(), "a");
    }
}
