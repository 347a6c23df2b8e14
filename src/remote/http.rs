//! HTTP cloud mirror
//!
//! `RemoteStore` backed by a document-style REST service:
//!
//! - `PUT    {base}/users/{user}/items/{id}` writes one document
//! - `DELETE {base}/users/{user}/items/{id}` removes one document
//! - `GET    {base}/users/{user}/changes?cursor={n}&wait={s}` is the
//!   long-polled change feed; `cursor=0` replays the full collection first
//!
//! The feed poller runs until its subscription is dropped, retrying failed
//! requests after a fixed delay so transient outages only stall the feed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::mpsc;

use super::{ChangeBatch, ChangeFeed, RemoteStore};
use crate::config::{CHANGE_FEED_CHANNEL_CAPACITY, HTTP_LONG_POLL_WAIT_SECS, HTTP_RETRY_DELAY_MS};
use crate::database::Item;
use crate::error::Result;

#[derive(Clone)]
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
        }
    }

    /// Attach a bearer token sent with every request
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    fn item_url(&self, user_id: &str, item_id: &str) -> String {
        format!("{}/users/{}/items/{}", self.base_url, user_id, item_id)
    }

    fn changes_url(&self, user_id: &str, cursor: i64) -> String {
        format!(
            "{}/users/{}/changes?cursor={}&wait={}",
            self.base_url, user_id, cursor, HTTP_LONG_POLL_WAIT_SECS
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Long-poll the change feed until the subscriber goes away
    async fn poll_changes(self, user_id: String, mut cursor: i64, tx: mpsc::Sender<ChangeBatch>) {
        loop {
            let request = self.authorize(self.client.get(self.changes_url(&user_id, cursor)));

            let response = match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!("Change feed request failed for user {}: {}", user_id, e);
                    if tx.is_closed() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(HTTP_RETRY_DELAY_MS)).await;
                    continue;
                }
            };

            match response.json::<ChangeBatch>().await {
                Ok(batch) => {
                    // A long-poll round that timed out carries nothing new
                    let stale = batch.changes.is_empty() && batch.cursor <= cursor;
                    cursor = cursor.max(batch.cursor);
                    if stale {
                        continue;
                    }
                    if tx.send(batch).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Malformed change batch for user {}: {}", user_id, e);
                    if tx.is_closed() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(HTTP_RETRY_DELAY_MS)).await;
                }
            }
        }

        tracing::debug!("Change feed poller stopped for user {}", user_id);
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn upsert(&self, user_id: &str, item: &Item) -> Result<()> {
        let request = self.client.put(self.item_url(user_id, &item.id)).json(item);
        let response = self.authorize(request).send().await?;
        response.error_for_status()?;

        tracing::debug!("Pushed item {} for user {}", item.id, user_id);
        Ok(())
    }

    async fn delete(&self, user_id: &str, item_id: &str) -> Result<()> {
        let request = self.client.delete(self.item_url(user_id, item_id));
        let response = self.authorize(request).send().await?;

        // Deleting an already-missing document counts as success
        if response.status() != StatusCode::NOT_FOUND {
            response.error_for_status()?;
        }

        tracing::debug!("Pushed delete of item {} for user {}", item_id, user_id);
        Ok(())
    }

    async fn subscribe(&self, user_id: &str, since: i64) -> Result<ChangeFeed> {
        let (tx, rx) = mpsc::channel(CHANGE_FEED_CHANNEL_CAPACITY);

        let poller = self.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move { poller.poll_changes(user_id, since, tx).await });

        Ok(rx)
    }
}
