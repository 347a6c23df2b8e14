//! Database models
//!
//! Rust structs representing local-store entities. `Item` doubles as the
//! wire document pushed to the cloud mirror, so its serde names are
//! camelCase to match the remote collection schema.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use crate::geo::GeoPoint;

/// Current wall-clock time as epoch milliseconds (UTC).
/// All item and queue timestamps use this resolution.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// A tracked possession.
///
/// `created_at` is fixed at creation; `updated_at` orders concurrent copies
/// of the same item during reconciliation, newest wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub labels: Vec<String>,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
    pub audio_transcription: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_name: Option<String>,
}

impl Item {
    /// Where the item was last seen, if both coordinates are present
    pub fn coordinates(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint::new(latitude, longitude)),
            _ => None,
        }
    }
}

// Labels live in a JSON TEXT column, so the row mapping is written out
// by hand instead of derived.
impl<'r> FromRow<'r, SqliteRow> for Item {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        let labels_json: String = row.try_get("labels")?;
        let labels = serde_json::from_str(&labels_json).map_err(|e| sqlx::Error::ColumnDecode {
            index: "labels".to_string(),
            source: Box::new(e),
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            labels,
            image_url: row.try_get("image_url")?,
            audio_url: row.try_get("audio_url")?,
            audio_transcription: row.try_get("audio_transcription")?,
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
            location_name: row.try_get("location_name")?,
        })
    }
}

/// Create item request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
    pub audio_transcription: Option<String>,
    pub location: Option<GeoPoint>,
    pub location_name: Option<String>,
}

/// Update item request. Every field overwrites its stored counterpart;
/// omitted optionals clear the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
    pub audio_transcription: Option<String>,
    pub location: Option<GeoPoint>,
    pub location_name: Option<String>,
}

/// Kind of queued remote operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum OutboxOp {
    Upsert,
    Delete,
}

/// A queued push awaiting delivery to the cloud mirror.
/// `payload` holds the serialized item for upserts and is NULL for deletes.
#[derive(Debug, Clone, FromRow)]
pub struct OutboxEntry {
    pub seq: i64,
    pub item_id: String,
    pub op: OutboxOp,
    pub payload: Option<String>,
    pub queued_at: i64,
    pub attempts: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item() -> Item {
        Item {
            id: "item-1".to_string(),
            name: "Car Keys".to_string(),
            description: Some("Toyota fob".to_string()),
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
            labels: vec!["essentials".to_string(), "keys".to_string()],
            image_url: None,
            audio_url: None,
            audio_transcription: None,
            latitude: Some(51.5074),
            longitude: Some(-0.1278),
            location_name: Some("Home".to_string()),
        }
    }

    #[test]
    fn test_item_serializes_camel_case() {
        let json = serde_json::to_value(sample_item()).unwrap();

        assert_eq!(json["createdAt"], 1_700_000_000_000i64);
        assert_eq!(json["locationName"], "Home");
        assert_eq!(json["labels"][1], "keys");
        assert!(json.get("created_at").is_none());
    }

    #[test]
    fn test_item_deserializes_missing_optionals() {
        let item: Item = serde_json::from_str(
            r#"{"id":"x","name":"Wallet","createdAt":1,"updatedAt":2}"#,
        )
        .unwrap();

        assert_eq!(item.name, "Wallet");
        assert!(item.labels.is_empty());
        assert!(item.description.is_none());
        assert!(item.coordinates().is_none());
    }

    #[test]
    fn test_coordinates_require_both_fields() {
        let mut item = sample_item();
        assert!(item.coordinates().is_some());

        item.longitude = None;
        assert!(item.coordinates().is_none());
    }
}
