//! Integration tests for packrat
//!
//! These tests verify end-to-end functionality including:
//! - Local item operations through a session
//! - Outbox delivery to the cloud mirror
//! - Convergence between two sessions sharing one account

use std::sync::Arc;
use std::time::Duration;

use packrat::database::{CreateItemRequest, UpdateItemRequest};
use packrat::geo::GeoPoint;
use packrat::identity::SessionIdentity;
use packrat::remote::{MemoryRemoteStore, RemoteStore};
use packrat::services::ItemsService;
use packrat::session::{Session, SessionConfig};
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Helper to start a session over its own temp directory
async fn start_session(
    dir: &TempDir,
    remote: Arc<MemoryRemoteStore>,
    identity: Arc<SessionIdentity>,
) -> Session {
    Session::start(SessionConfig {
        data_dir: dir.path().to_path_buf(),
        remote,
        identity,
    })
    .await
    .unwrap()
}

async fn wait_until_present(items: &ItemsService, id: &str) -> bool {
    for _ in 0..500 {
        if items.get_item(id).await.unwrap().is_some() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn wait_until_absent(items: &ItemsService, id: &str) -> bool {
    for _ in 0..500 {
        if items.get_item(id).await.unwrap().is_none() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn wait_for_description(items: &ItemsService, id: &str, wanted: &str) -> bool {
    for _ in 0..500 {
        if let Some(item) = items.get_item(id).await.unwrap() {
            if item.description.as_deref() == Some(wanted) {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn wait_for_remote_count(remote: &MemoryRemoteStore, user_id: &str, count: usize) -> bool {
    for _ in 0..500 {
        if remote.item_count(user_id).await == count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_item_crud_operations() -> anyhow::Result<()> {
    init_tracing();

    let dir = TempDir::new()?;
    let remote = Arc::new(MemoryRemoteStore::new());
    // Signed out: everything below must work purely locally
    let identity = Arc::new(SessionIdentity::new());
    let session = start_session(&dir, remote.clone(), identity).await;

    // Create
    let keys = session
        .items()
        .create_item(CreateItemRequest {
            name: "Car Keys".to_string(),
            description: Some("Toyota fob".to_string()),
            labels: vec!["essentials".to_string()],
            location: Some(GeoPoint::new(51.5074, -0.1278)),
            location_name: Some("Home".to_string()),
            ..Default::default()
        })
        .await?;

    assert!(!keys.id.is_empty());
    assert_eq!(keys.created_at, keys.updated_at);

    let wallet = session
        .items()
        .create_item(CreateItemRequest {
            name: "Wallet".to_string(),
            ..Default::default()
        })
        .await?;

    // Read
    let fetched = session.items().get_item(&keys.id).await?.unwrap();
    assert_eq!(fetched, keys);

    // List is newest first
    let all = session.items().list_items().await?;
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].name, "Wallet");
    assert_eq!(all[1].name, "Car Keys");

    // Update
    let updated = session
        .items()
        .update_item(UpdateItemRequest {
            id: keys.id.clone(),
            name: "Car Keys".to_string(),
            description: Some("On the hallway hook".to_string()),
            labels: keys.labels.clone(),
            location: keys.coordinates(),
            location_name: keys.location_name.clone(),
            ..Default::default()
        })
        .await?;

    assert_eq!(updated.description.as_deref(), Some("On the hallway hook"));
    assert_eq!(updated.created_at, keys.created_at);
    assert!(updated.updated_at > keys.updated_at);

    // Delete
    session.items().delete_item(&wallet.id).await?;
    assert!(session.items().get_item(&wallet.id).await?.is_none());
    assert_eq!(session.items().list_items().await?.len(), 1);

    // Nothing reached the mirror while signed out; an explicit flush
    // delivers the queued state
    assert_eq!(remote.item_count("alice").await, 0);
    session.sync().flush_outbox("alice").await?;

    assert_eq!(remote.item_count("alice").await, 1);
    assert!(remote.item("alice", &keys.id).await.is_some());
    assert_eq!(remote.recorded_deletes("alice", &wallet.id).await, 1);

    session.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_search_and_filters() {
    init_tracing();

    let dir = TempDir::new().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    let identity = Arc::new(SessionIdentity::new());
    let session = start_session(&dir, remote, identity).await;

    let home = GeoPoint::new(51.5074, -0.1278);

    session
        .items()
        .create_item(CreateItemRequest {
            name: "Car Keys".to_string(),
            description: Some("Toyota fob".to_string()),
            labels: vec!["essentials".to_string()],
            location: Some(home),
            ..Default::default()
        })
        .await
        .unwrap();

    session
        .items()
        .create_item(CreateItemRequest {
            name: "Passport".to_string(),
            labels: vec!["travel".to_string(), "essentials".to_string()],
            // Paris, roughly 344 km from home
            location: Some(GeoPoint::new(48.8566, 2.3522)),
            ..Default::default()
        })
        .await
        .unwrap();

    // Search by name and by description
    let results = session.items().search_items("passport").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "Passport");

    let results = session.items().search_items("toyota").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "Car Keys");

    // Label filter
    let essentials = session.items().items_with_label("essentials").await.unwrap();
    assert_eq!(essentials.len(), 2);

    // Proximity filter from home
    let near_home = session.items().items_near(home, 50.0).await.unwrap();
    assert_eq!(near_home.len(), 1);
    assert_eq!(near_home[0].name, "Car Keys");

    let wider = session.items().items_near(home, 500.0).await.unwrap();
    assert_eq!(wider.len(), 2);
    assert_eq!(wider[0].name, "Car Keys");
    assert_eq!(wider[1].name, "Passport");

    session.shutdown().await;
}

#[tokio::test]
async fn test_two_sessions_converge() -> anyhow::Result<()> {
    init_tracing();

    let remote = Arc::new(MemoryRemoteStore::new());
    let identity = Arc::new(SessionIdentity::signed_in("alice"));

    let dir_a = TempDir::new()?;
    let dir_b = TempDir::new()?;
    let session_a = start_session(&dir_a, remote.clone(), identity.clone()).await;
    let session_b = start_session(&dir_b, remote.clone(), identity.clone()).await;

    // Device A records where the keys were left
    let keys = session_a
        .items()
        .create_item(CreateItemRequest {
            name: "Car Keys".to_string(),
            labels: vec!["essentials".to_string()],
            location: Some(GeoPoint::new(51.5074, -0.1278)),
            location_name: Some("Home".to_string()),
            ..Default::default()
        })
        .await?;

    // Device B sees the item appear with everything intact
    assert!(wait_until_present(session_b.items(), &keys.id).await);
    let on_b = session_b.items().get_item(&keys.id).await?.unwrap();
    assert_eq!(on_b, keys);

    // Device B moves the keys; device A finds out
    session_b
        .items()
        .update_item(UpdateItemRequest {
            id: on_b.id.clone(),
            name: on_b.name.clone(),
            description: Some("In the kitchen drawer".to_string()),
            labels: on_b.labels.clone(),
            image_url: on_b.image_url.clone(),
            audio_url: on_b.audio_url.clone(),
            audio_transcription: on_b.audio_transcription.clone(),
            location: on_b.coordinates(),
            location_name: on_b.location_name.clone(),
        })
        .await?;

    assert!(wait_for_description(session_a.items(), &keys.id, "In the kitchen drawer").await);

    // Device A deletes; the item disappears everywhere, with exactly one
    // delete reaching the mirror
    session_a.items().delete_item(&keys.id).await?;

    assert!(wait_until_absent(session_b.items(), &keys.id).await);
    assert!(remote.item("alice", &keys.id).await.is_none());
    assert_eq!(remote.recorded_deletes("alice", &keys.id).await, 1);

    session_a.shutdown().await;
    session_b.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_sign_out_stops_sync_and_sign_in_catches_up() {
    init_tracing();

    let remote = Arc::new(MemoryRemoteStore::new());
    let identity = Arc::new(SessionIdentity::signed_in("alice"));

    let dir = TempDir::new().unwrap();
    let session = start_session(&dir, remote.clone(), identity.clone()).await;

    // Seed one item so the session has an established cursor
    let keys = session
        .items()
        .create_item(CreateItemRequest {
            name: "Car Keys".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(wait_for_remote_count(&remote, "alice", 1).await);

    identity.sign_out();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // A change from another device goes unnoticed while signed out
    let mut elsewhere = keys.clone();
    elsewhere.id = "from-elsewhere".to_string();
    elsewhere.name = "Umbrella".to_string();
    remote.upsert("alice", &elsewhere).await.unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(session.items().get_item("from-elsewhere").await.unwrap().is_none());

    // Signing back in resumes the feed and catches up
    identity.sign_in("alice");
    assert!(wait_until_present(session.items(), "from-elsewhere").await);

    session.shutdown().await;
}

#[tokio::test]
async fn test_offline_edits_flush_after_sign_in() {
    init_tracing();

    let remote = Arc::new(MemoryRemoteStore::new());
    let identity = Arc::new(SessionIdentity::new());

    let dir = TempDir::new().unwrap();
    let session = start_session(&dir, remote.clone(), identity.clone()).await;

    session
        .items()
        .create_item(CreateItemRequest {
            name: "Car Keys".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    session
        .items()
        .create_item(CreateItemRequest {
            name: "Wallet".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    // No user, no pushes
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(remote.item_count("alice").await, 0);

    // The queued pushes drain once someone signs in
    identity.sign_in("alice");
    assert!(wait_for_remote_count(&remote, "alice", 2).await);

    session.shutdown().await;
}
