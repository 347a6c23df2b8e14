//! Items service
//!
//! High-level business logic for the item lifecycle: validation, id and
//! timestamp assignment, read-side filters, and nudging the outbox
//! flusher after every local write.

use std::sync::Arc;

use tokio::sync::Notify;
use uuid::Uuid;

use crate::database::{now_ms, CreateItemRequest, Item, ItemRepository, UpdateItemRequest};
use crate::error::{AppError, Result};
use crate::geo::{haversine_km, GeoPoint};

/// Service for managing items
#[derive(Clone)]
pub struct ItemsService {
    repo: ItemRepository,
    outbox_wakeup: Arc<Notify>,
}

impl ItemsService {
    pub fn new(repo: ItemRepository, outbox_wakeup: Arc<Notify>) -> Self {
        Self {
            repo,
            outbox_wakeup,
        }
    }

    /// Create a new item
    pub async fn create_item(&self, req: CreateItemRequest) -> Result<Item> {
        tracing::info!("Creating new item: {}", req.name);

        let now = now_ms();
        let (latitude, longitude) = coordinate_fields(req.location);

        let item = Item {
            id: Uuid::new_v4().to_string(),
            name: req.name,
            description: req.description,
            created_at: now,
            updated_at: now,
            labels: req.labels,
            image_url: req.image_url,
            audio_url: req.audio_url,
            audio_transcription: req.audio_transcription,
            latitude,
            longitude,
            location_name: req.location_name,
        };

        let stored = self.put_item(item).await?;

        tracing::info!("Item created successfully: {}", stored.id);

        Ok(stored)
    }

    /// Update an existing item.
    ///
    /// The request replaces every stored field; omitted optionals clear
    /// their stored values. Fails with `ItemNotFound` for unknown ids.
    pub async fn update_item(&self, req: UpdateItemRequest) -> Result<Item> {
        tracing::debug!("Updating item: {}", req.id);

        let existing = self
            .repo
            .get_item(&req.id)
            .await?
            .ok_or_else(|| AppError::ItemNotFound(req.id.clone()))?;

        let (latitude, longitude) = coordinate_fields(req.location);

        let item = Item {
            id: existing.id,
            name: req.name,
            description: req.description,
            created_at: existing.created_at,
            // Strictly increasing even for several edits within one millisecond
            updated_at: now_ms().max(existing.updated_at + 1),
            labels: req.labels,
            image_url: req.image_url,
            audio_url: req.audio_url,
            audio_transcription: req.audio_transcription,
            latitude,
            longitude,
            location_name: req.location_name,
        };

        self.put_item(item).await
    }

    /// Store an item exactly as given and queue a push for it.
    /// An existing row keeps its original `created_at`.
    pub async fn put_item(&self, item: Item) -> Result<Item> {
        validate_item(&item)?;

        let stored = self.repo.put_item(&item).await?;
        self.outbox_wakeup.notify_one();

        Ok(stored)
    }

    /// Get an item by ID
    pub async fn get_item(&self, id: &str) -> Result<Option<Item>> {
        self.repo.get_item(id).await
    }

    /// List all items, newest first
    pub async fn list_items(&self) -> Result<Vec<Item>> {
        self.repo.list_items().await
    }

    /// Delete an item.
    ///
    /// Unknown ids are not an error: the remote delete is still queued so
    /// a copy the mirror holds disappears everywhere.
    pub async fn delete_item(&self, id: &str) -> Result<()> {
        tracing::info!("Deleting item: {}", id);

        let existed = self.repo.delete_item(id).await?;
        self.outbox_wakeup.notify_one();

        if !existed {
            tracing::debug!("Item {} was not stored locally, queued remote delete only", id);
        }

        Ok(())
    }

    /// Search items by name or description (case-insensitive)
    pub async fn search_items(&self, query: &str) -> Result<Vec<Item>> {
        let all_items = self.list_items().await?;

        let query_lower = query.to_lowercase();

        let filtered: Vec<Item> = all_items
            .into_iter()
            .filter(|item| {
                item.name.to_lowercase().contains(&query_lower)
                    || item
                        .description
                        .as_ref()
                        .is_some_and(|d| d.to_lowercase().contains(&query_lower))
            })
            .collect();

        Ok(filtered)
    }

    /// Items carrying the given label
    pub async fn items_with_label(&self, label: &str) -> Result<Vec<Item>> {
        let all_items = self.list_items().await?;

        let filtered: Vec<Item> = all_items
            .into_iter()
            .filter(|item| item.labels.iter().any(|l| l == label))
            .collect();

        Ok(filtered)
    }

    /// Items last seen within `radius_km` of `origin`, closest first.
    /// Items without a stored location never match.
    pub async fn items_near(&self, origin: GeoPoint, radius_km: f64) -> Result<Vec<Item>> {
        let all_items = self.list_items().await?;

        let mut nearby: Vec<(f64, Item)> = all_items
            .into_iter()
            .filter_map(|item| {
                let point = item.coordinates()?;
                let distance = haversine_km(origin, point);
                (distance <= radius_km).then_some((distance, item))
            })
            .collect();

        nearby.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(nearby.into_iter().map(|(_, item)| item).collect())
    }
}

fn coordinate_fields(location: Option<GeoPoint>) -> (Option<f64>, Option<f64>) {
    match location {
        Some(point) => (Some(point.latitude), Some(point.longitude)),
        None => (None, None),
    }
}

/// Validation shared by every write path
fn validate_item(item: &Item) -> Result<()> {
    if item.name.trim().is_empty() {
        return Err(AppError::Validation(
            "item name must not be empty".to_string(),
        ));
    }

    if item.latitude.is_some() != item.longitude.is_some() {
        return Err(AppError::Validation(
            "latitude and longitude must be set together".to_string(),
        ));
    }

    Ok(())
}
